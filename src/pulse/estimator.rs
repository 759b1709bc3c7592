//! Heart-rate estimation from a sampled intensity series.
//!
//! Two strategies share the same windowing and early exits:
//! - [`EstimatorMethod::Spectral`]: detrend, FFT, strongest bin inside the BPM band
//! - [`EstimatorMethod::PeakInterval`]: smooth, find local maxima, average spacing
//!
//! Both are deterministic for a given series.

use rustfft::{num_complex::Complex, FftPlanner};

use super::sampler::Sample;
use crate::params::PulseParams;

/// Bins weaker than this are treated as silence (flat input)
const MIN_PEAK_MAGNITUDE: f64 = 1e-6;

/// Outcome of an estimation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpmStatus {
    Ok,
    /// Too few samples or too short a span
    InsufficientData,
    /// No usable periodicity inside the band
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpmEstimate {
    /// Beats per minute, present only with [`BpmStatus::Ok`]
    pub bpm: Option<u32>,
    pub status: BpmStatus,
}

impl BpmEstimate {
    pub fn ok(bpm: u32) -> Self {
        Self {
            bpm: Some(bpm),
            status: BpmStatus::Ok,
        }
    }

    pub fn insufficient_data() -> Self {
        Self {
            bpm: None,
            status: BpmStatus::InsufficientData,
        }
    }

    pub fn out_of_range() -> Self {
        Self {
            bpm: None,
            status: BpmStatus::OutOfRange,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == BpmStatus::Ok
    }
}

/// BPM attached to a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseReading {
    /// Estimated from the camera signal
    Measured(u32),
    /// Measurement skipped or undetermined; carries the default BPM
    Fallback(u32),
}

impl PulseReading {
    /// Resolve an estimate, falling back to the configured default
    pub fn from_estimate(estimate: &BpmEstimate, params: &PulseParams) -> Self {
        match estimate.bpm {
            Some(bpm) if estimate.is_ok() => Self::Measured(bpm),
            _ => Self::Fallback(params.default_bpm),
        }
    }

    pub fn fallback(params: &PulseParams) -> Self {
        Self::Fallback(params.default_bpm)
    }

    pub fn bpm(&self) -> u32 {
        match *self {
            Self::Measured(bpm) | Self::Fallback(bpm) => bpm,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Self::Measured(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorMethod {
    #[default]
    Spectral,
    PeakInterval,
}

/// Stateless BPM estimator
#[derive(Debug, Clone)]
pub struct BpmEstimator {
    params: PulseParams,
    method: EstimatorMethod,
}

impl BpmEstimator {
    pub fn new(params: PulseParams, method: EstimatorMethod) -> Self {
        Self { params, method }
    }

    pub fn method(&self) -> EstimatorMethod {
        self.method
    }

    /// Estimate BPM over the trailing `window_secs` of the series
    ///
    /// The series must be ordered by timestamp. Non-finite values are ignored.
    pub fn estimate(&self, series: &[Sample], window_secs: f64) -> BpmEstimate {
        let min_samples = self.params.min_samples;
        if series.len() < min_samples {
            return BpmEstimate::insufficient_data();
        }

        let Some(latest) = series.last().map(|s| s.timestamp_ms) else {
            return BpmEstimate::insufficient_data();
        };
        let window_ms = (window_secs.max(0.0) * 1000.0) as u64;
        let start = series.partition_point(|s| latest.saturating_sub(s.timestamp_ms) >= window_ms);
        let windowed: Vec<&Sample> = series[start..]
            .iter()
            .filter(|s| s.value.is_finite())
            .collect();
        if windowed.len() < min_samples {
            return BpmEstimate::insufficient_data();
        }

        let span_ms = match (windowed.first(), windowed.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => return BpmEstimate::insufficient_data(),
        };
        if span_ms < self.params.min_span_ms {
            return BpmEstimate::insufficient_data();
        }

        let values: Vec<f64> = windowed.iter().map(|s| s.value).collect();
        let raw_bpm = match self.method {
            EstimatorMethod::Spectral => self.spectral_bpm(&values, span_ms),
            EstimatorMethod::PeakInterval => self.peak_interval_bpm(&values, window_secs),
        };

        match raw_bpm {
            Some(bpm) => {
                let bpm = self.params.clamp_to_band(bpm.round() as u32);
                log::debug!(
                    "Estimated {} BPM from {} samples over {} ms ({:?})",
                    bpm,
                    values.len(),
                    span_ms,
                    self.method
                );
                BpmEstimate::ok(bpm)
            }
            None => BpmEstimate::out_of_range(),
        }
    }

    /// Strongest in-band frequency of the detrended series
    fn spectral_bpm(&self, values: &[f64], span_ms: u64) -> Option<f64> {
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;

        let mut spectrum: Vec<Complex<f64>> =
            values.iter().map(|v| Complex::new(v - mean, 0.0)).collect();
        let fft = FftPlanner::new().plan_fft_forward(n);
        fft.process(&mut spectrum);

        // Bin spacing follows the measured span, not the nominal sample rate
        let resolution_hz = 1000.0 / span_ms as f64;

        let mut best: Option<(f64, f64)> = None;
        for (bin, value) in spectrum.iter().enumerate().take(n.div_ceil(2)).skip(1) {
            let bpm = bin as f64 * resolution_hz * 60.0;
            if !self.params.in_band(bpm) {
                continue;
            }
            let magnitude = value.norm();
            if magnitude > MIN_PEAK_MAGNITUDE && best.map_or(true, |(m, _)| magnitude > m) {
                best = Some((magnitude, bpm));
            }
        }

        best.map(|(_, bpm)| bpm)
    }

    /// Mean distance between local maxima of the smoothed series
    fn peak_interval_bpm(&self, values: &[f64], window_secs: f64) -> Option<f64> {
        let smoothed = moving_average(values, self.params.smoothing_radius);

        let diffs: Vec<f64> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
        let peaks: Vec<usize> = (1..diffs.len())
            .filter(|&i| diffs[i - 1] > 0.0 && diffs[i] <= 0.0)
            .collect();

        let (first, last) = match (peaks.first(), peaks.last()) {
            (Some(&first), Some(&last)) if peaks.len() >= 2 => (first, last),
            _ => return None,
        };

        let avg_interval = (last - first) as f64 / (peaks.len() - 1) as f64;
        let fps = values.len() as f64 / window_secs;
        let bpm = 60.0 * fps / avg_interval;

        let (lo, hi) = self.params.sanity_band;
        (bpm.is_finite() && bpm >= lo && bpm <= hi).then_some(bpm)
    }
}

/// Centered moving average; edge samples without a full window are dropped
fn moving_average(values: &[f64], radius: usize) -> Vec<f64> {
    let width = 2 * radius + 1;
    values
        .windows(width)
        .map(|window| window.iter().sum::<f64>() / width as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// `count` samples every `step_ms`, oscillating at `bpm`
    fn sine_series(count: usize, step_ms: u64, bpm: f64, amplitude: f64, mean: f64) -> Vec<Sample> {
        let freq_hz = bpm / 60.0;
        (0..count)
            .map(|i| {
                let t_ms = i as u64 * step_ms;
                let t_s = t_ms as f64 / 1000.0;
                Sample {
                    value: mean + amplitude * (2.0 * PI * freq_hz * t_s).sin(),
                    timestamp_ms: t_ms,
                }
            })
            .collect()
    }

    fn spectral() -> BpmEstimator {
        BpmEstimator::new(PulseParams::default(), EstimatorMethod::Spectral)
    }

    fn peak_interval() -> BpmEstimator {
        BpmEstimator::new(PulseParams::default(), EstimatorMethod::PeakInterval)
    }

    #[test]
    fn test_75_bpm_scenario() {
        // 200 samples over 8 s, 1.25 Hz, amplitude 10 around 128
        let series = sine_series(200, 40, 75.0, 10.0, 128.0);
        assert_eq!(spectral().estimate(&series, 8.0), BpmEstimate::ok(75));
    }

    #[test]
    fn test_known_frequencies_within_tolerance() {
        // Frequencies that complete a whole number of cycles in the window
        for cycles in 8..=13u32 {
            let bpm = cycles as f64 * 60.0 / 8.0;
            let series = sine_series(200, 40, bpm, 5.0, 120.0);
            let estimate = spectral().estimate(&series, 8.0);
            let got = estimate.bpm.expect("estimate for in-band sine") as i64;
            let expected = bpm.round() as i64;
            assert!(
                (got - expected).abs() <= 2,
                "expected {} got {} for {} cycles",
                expected,
                got,
                cycles
            );
        }
    }

    #[test]
    fn test_off_bin_frequencies_over_long_window() {
        // 16 s at 25 fps halves the bin spacing, enough for ±2 BPM anywhere
        for bpm in [61.0, 64.0, 71.0, 78.0, 83.0, 91.0, 97.0] {
            let series = sine_series(400, 40, bpm, 5.0, 120.0);
            let estimate = spectral().estimate(&series, 16.0);
            let got = estimate.bpm.expect("estimate for in-band sine") as i64;
            assert!(
                (got - bpm as i64).abs() <= 2,
                "expected {} got {}",
                bpm,
                got
            );
        }
    }

    #[test]
    fn test_too_few_samples_is_insufficient() {
        let series = sine_series(29, 300, 75.0, 10.0, 128.0);
        assert_eq!(
            spectral().estimate(&series, 8.0).status,
            BpmStatus::InsufficientData
        );
        assert_eq!(
            peak_interval().estimate(&series, 8.0).status,
            BpmStatus::InsufficientData
        );
        assert_eq!(spectral().estimate(&[], 8.0).status, BpmStatus::InsufficientData);
    }

    #[test]
    fn test_window_drops_old_samples() {
        // 40 samples, but only the last 20 fall inside an 8 s window
        let series = sine_series(40, 400, 75.0, 10.0, 128.0);
        assert_eq!(
            spectral().estimate(&series, 8.0).status,
            BpmStatus::InsufficientData
        );
    }

    #[test]
    fn test_short_span_is_insufficient() {
        // Plenty of samples but only ~3 s of signal
        let series = sine_series(100, 30, 75.0, 10.0, 128.0);
        assert_eq!(
            spectral().estimate(&series, 8.0),
            BpmEstimate::insufficient_data()
        );
    }

    #[test]
    fn test_flat_series_has_no_peak() {
        let series: Vec<Sample> = (0..200)
            .map(|i| Sample {
                value: 128.0,
                timestamp_ms: i * 40,
            })
            .collect();
        assert_eq!(spectral().estimate(&series, 8.0), BpmEstimate::out_of_range());
        assert_eq!(
            peak_interval().estimate(&series, 8.0),
            BpmEstimate::out_of_range()
        );
    }

    #[test]
    fn test_spectral_result_stays_in_band() {
        // 150 BPM is outside the band; the best in-band bin still reports in band
        let series = sine_series(200, 40, 150.0, 10.0, 128.0);
        let estimate = spectral().estimate(&series, 8.0);
        if let Some(bpm) = estimate.bpm {
            assert!((60..=100).contains(&bpm));
        }
    }

    #[test]
    fn test_deterministic() {
        let series = sine_series(240, 33, 70.0, 3.0, 90.0);
        let first = spectral().estimate(&series, 8.0);
        for _ in 0..5 {
            assert_eq!(spectral().estimate(&series, 8.0), first);
        }
    }

    #[test]
    fn test_peak_interval_75_bpm() {
        let series = sine_series(200, 40, 75.0, 10.0, 128.0);
        let estimate = peak_interval().estimate(&series, 8.0);
        let bpm = estimate.bpm.expect("peak interval estimate") as i64;
        assert!((bpm - 75).abs() <= 2, "got {}", bpm);
    }

    #[test]
    fn test_peak_interval_clamps_into_band() {
        // 45 BPM passes the sanity band and clamps to the lower edge
        let series = sine_series(200, 40, 45.0, 10.0, 128.0);
        assert_eq!(peak_interval().estimate(&series, 8.0), BpmEstimate::ok(60));
    }

    /// `count` samples every 40 ms: 100 at rest, 110 on every `period`-th sample
    fn spike_series(count: usize, period: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample {
                value: if i % period == 1 { 110.0 } else { 100.0 },
                timestamp_ms: i as u64 * 40,
            })
            .collect()
    }

    fn unsmoothed_peak_interval() -> BpmEstimator {
        let params = PulseParams {
            smoothing_radius: 0,
            ..PulseParams::default()
        };
        BpmEstimator::new(params, EstimatorMethod::PeakInterval)
    }

    #[test]
    fn test_peak_interval_rejects_too_fast() {
        // A spike every 5 samples at 25 fps is 300 BPM
        let series = spike_series(200, 5);
        assert_eq!(
            unsmoothed_peak_interval().estimate(&series, 8.0),
            BpmEstimate::out_of_range()
        );
    }

    #[test]
    fn test_peak_interval_rejects_too_slow() {
        // A spike every 100 samples at 25 fps is 15 BPM
        let series = spike_series(200, 100);
        assert_eq!(
            unsmoothed_peak_interval().estimate(&series, 8.0),
            BpmEstimate::out_of_range()
        );
    }

    #[test]
    fn test_reading_falls_back_to_default() {
        let params = PulseParams::default();
        assert_eq!(
            PulseReading::from_estimate(&BpmEstimate::insufficient_data(), &params),
            PulseReading::Fallback(80)
        );
        assert_eq!(
            PulseReading::from_estimate(&BpmEstimate::out_of_range(), &params).bpm(),
            80
        );
        let measured = PulseReading::from_estimate(&BpmEstimate::ok(60), &params);
        assert_eq!(measured, PulseReading::Measured(60));
        assert!(measured.is_measured());
    }

    #[test]
    fn test_moving_average_full_windows() {
        let smoothed = moving_average(&[0.0, 3.0, 6.0, 9.0], 1);
        assert_eq!(smoothed, vec![3.0, 6.0]);
        assert!(moving_average(&[1.0, 2.0], 4).is_empty());
    }
}
