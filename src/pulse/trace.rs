//! Normalised pulse trace for live display while measuring.

use super::sampler::SampleBuffer;

/// Guard against a zero value range
const RANGE_EPSILON: f64 = 1e-6;

/// Most recent `width` samples scaled into `[0, 1]` (0 = minimum, 1 = maximum)
///
/// Fewer than two samples produce an empty trace.
pub fn pulse_trace(buffer: &SampleBuffer, width: usize) -> Vec<f32> {
    let skip = buffer.len().saturating_sub(width);
    let values: Vec<f64> = buffer.iter().skip(skip).map(|s| s.value).collect();
    if values.len() < 2 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min + RANGE_EPSILON;

    values
        .iter()
        .map(|v| ((v - min) / range) as f32)
        .collect()
}
