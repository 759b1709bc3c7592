//! Pulse measurement configuration.

use crate::error::ConfigError;

/// Scalar extracted from each sampled pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleChannel {
    /// Perceptual luma (0.299 R + 0.587 G + 0.114 B)
    #[default]
    Luma,
    /// Mean of the red channel only
    Red,
}

/// Pulse sampling and estimation parameters
#[derive(Debug, Clone)]
pub struct PulseParams {
    /// Ring buffer capacity (samples, oldest evicted first)
    pub ring_capacity: usize,

    /// Side length of the centered sampling square (pixels)
    pub roi_size_px: u32,

    /// Channel reduced to one scalar per frame
    pub channel: SampleChannel,

    /// Wall-clock duration of one measurement (milliseconds)
    pub measurement_ms: u64,

    /// Trailing analysis window (seconds)
    pub window_secs: f64,

    /// Minimum samples before and after windowing
    pub min_samples: usize,

    /// Minimum time span of the windowed series (milliseconds)
    pub min_span_ms: u64,

    /// Reported BPM band (inclusive)
    pub bpm_band: (u32, u32),

    /// Peak-interval results outside this band are rejected (BPM)
    pub sanity_band: (f64, f64),

    /// Centered moving-average half width for peak detection (samples)
    pub smoothing_radius: usize,

    /// BPM used whenever no estimate could be produced
    pub default_bpm: u32,

    /// Number of recent samples drawn in the pulse trace
    pub trace_width: usize,
}

impl Default for PulseParams {
    fn default() -> Self {
        Self {
            ring_capacity: 512,
            roi_size_px: 100,
            channel: SampleChannel::Luma,
            measurement_ms: 8000,
            window_secs: 8.0,
            min_samples: 30,
            min_span_ms: 5000,
            bpm_band: (60, 100),
            sanity_band: (20.0, 220.0),
            smoothing_radius: 4,
            default_bpm: 80,
            trace_width: 256,
        }
    }
}

impl PulseParams {
    /// Whether a BPM lies inside the reported band
    pub fn in_band(&self, bpm: f64) -> bool {
        bpm >= self.bpm_band.0 as f64 && bpm <= self.bpm_band.1 as f64
    }

    /// Clamp a BPM into the reported band
    pub fn clamp_to_band(&self, bpm: u32) -> u32 {
        bpm.clamp(self.bpm_band.0, self.bpm_band.1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_capacity < self.min_samples || self.ring_capacity == 0 {
            return Err(ConfigError::InvalidRange {
                name: "ring capacity",
                min: self.min_samples as f64,
                max: self.ring_capacity as f64,
            });
        }
        if self.roi_size_px == 0 {
            return Err(ConfigError::NotPositive {
                name: "roi size",
                value: 0.0,
            });
        }
        if !(self.window_secs > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "window",
                value: self.window_secs,
            });
        }
        if self.bpm_band.0 == 0 || self.bpm_band.0 >= self.bpm_band.1 {
            return Err(ConfigError::InvalidRange {
                name: "bpm band",
                min: self.bpm_band.0 as f64,
                max: self.bpm_band.1 as f64,
            });
        }
        if self.sanity_band.0 >= self.sanity_band.1 {
            return Err(ConfigError::InvalidRange {
                name: "sanity band",
                min: self.sanity_band.0,
                max: self.sanity_band.1,
            });
        }
        if !self.in_band(self.default_bpm as f64) {
            return Err(ConfigError::DefaultOutsideBand(self.default_bpm));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert_eq!(PulseParams::default().validate(), Ok(()));
    }

    #[test]
    fn test_default_bpm_must_be_in_band() {
        let params = PulseParams {
            default_bpm: 120,
            ..PulseParams::default()
        };
        assert_eq!(params.validate(), Err(ConfigError::DefaultOutsideBand(120)));
    }

    #[test]
    fn test_window_must_be_positive() {
        for window_secs in [0.0, -1.0, f64::NAN] {
            let params = PulseParams {
                window_secs,
                ..PulseParams::default()
            };
            assert!(matches!(
                params.validate(),
                Err(ConfigError::NotPositive { name: "window", .. })
            ));
        }
    }

    #[test]
    fn test_band_helpers() {
        let params = PulseParams::default();
        assert!(params.in_band(60.0));
        assert!(params.in_band(100.0));
        assert!(!params.in_band(100.5));
        assert_eq!(params.clamp_to_band(45), 60);
        assert_eq!(params.clamp_to_band(130), 100);
        assert_eq!(params.clamp_to_band(72), 72);
    }
}
