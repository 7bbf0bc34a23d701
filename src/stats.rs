/// Arithmetic mean of integer samples, truncated toward zero.
///
/// Returns 0 for an empty slice.
pub fn mean(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }

    let sum = values.iter().map(|&v| v as u128).sum::<u128>();

    (sum / values.len() as u128) as u64
}

/// Mean absolute difference between temporally consecutive samples,
/// truncated toward zero.
///
/// Order matters: `[a, b, c]` yields `mean(|b - a|, |c - b|)`. Fewer than
/// two samples have no jitter.
pub fn jitter(values: &[u64]) -> u64 {
    if values.len() < 2 {
        return 0;
    }

    let differences: Vec<u64> = values.windows(2).map(|pair| pair[0].abs_diff(pair[1])).collect();

    mean(&differences)
}

/// Round to the given number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);

    (value * factor).round() / factor
}
