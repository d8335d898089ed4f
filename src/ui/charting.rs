use crate::time_series::TimeSeriesPoint;

/// Chart data in the `(x, y)` form ratatui datasets take.
pub fn to_tuples(points: &[TimeSeriesPoint]) -> Vec<(f64, f64)> {
    points.iter().copied().map(Into::into).collect()
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}
