/// Root mean square of `samples`, normalised so full scale is `1.0`.
///
/// An empty batch measures `0.0`. The result is clamped to `1.0`, which
/// `i16::MIN` would otherwise overshoot slightly.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples
        .iter()
        .map(|&sample| {
            let sample = f64::from(sample);
            sample * sample
        })
        .sum::<f64>()
        / samples.len() as f64;
    (energy.sqrt() / f64::from(i16::MAX)).min(1.0)
}
