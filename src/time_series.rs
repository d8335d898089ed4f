/// One WPM reading at a point of elapsed lesson time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub t: f64,
    pub wpm: f64,
}

impl TimeSeriesPoint {
    pub fn new(t: f64, wpm: f64) -> Self {
        Self { t, wpm }
    }
}

impl From<TimeSeriesPoint> for (f64, f64) {
    fn from(p: TimeSeriesPoint) -> Self {
        (p.t, p.wpm)
    }
}

/// X (seconds, at least 1) and Y (highest WPM, rounded) bounds for charting.
pub fn chart_bounds(points: &[TimeSeriesPoint]) -> (f64, f64) {
    let highest_wpm = points.iter().map(|p| p.wpm).fold(0.0, f64::max);
    let duration = points.last().map(|p| p.t).unwrap_or(1.0).max(1.0);

    (duration, highest_wpm.round())
}
