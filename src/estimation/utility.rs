/// Computes the weighted arithmetic mean of `(value, weight)` pairs.
/// Returns `None` for empty input or when the weights sum to zero.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> Option<f64> {
    let weight_sum: f64 = pairs.iter().map(|(_, w)| w).sum();
    if pairs.is_empty() || weight_sum <= 0.0 {
        return None;
    }
    let total: f64 = pairs.iter().map(|(v, w)| v * w).sum();
    Some(total / weight_sum)
}

/// Clamps a value into the closed unit interval. NaN maps to 0.0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
