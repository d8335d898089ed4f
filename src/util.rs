/// Frame-rate independent exponential approach of `a` towards `b`.
pub fn exp_decay(a: f64, b: f64, decay: f64, dt: f64) -> f64 {
    b + (a - b) * (-decay * dt).exp()
}

pub fn format_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    let minutes = (secs / 60.0) as u64;
    let seconds = (secs % 60.0) as u64;

    format!("{minutes:>3}:{seconds:02}")
}

pub fn format_wpm(wpm: u32) -> String {
    format!("{:>3} WPM", wpm.min(999))
}

/// Replace control characters so raw steno output can be drawn safely.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_control() { '?' } else { c })
        .collect()
}

/// Byte offset of the `occurrence`-th (1-based) whitespace character in `s`.
pub fn nth_whitespace_offset(s: &str, occurrence: usize) -> Option<usize> {
    if occurrence == 0 {
        return None;
    }
    s.char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .nth(occurrence - 1)
        .map(|(i, _)| i)
}

/// Deterministic 32-bit string hash, stable across runs and platforms.
pub fn consistent_hash(s: &str) -> i32 {
    s.bytes().fold(17i32, |hash, b| {
        hash.wrapping_mul(31).wrapping_add(b as i32)
    })
}
