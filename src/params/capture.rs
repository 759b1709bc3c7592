//! Capture, exposure and persistence configuration.

use crate::error::ConfigError;

/// Encoding used when a photo is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoEncoding {
    /// JPEG with quality 1-100
    Jpeg { quality: u8 },
    /// Lossless PNG
    Png,
}

impl PhotoEncoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpg",
            Self::Png => "png",
        }
    }
}

/// Capture compositor and shot parameters
#[derive(Debug, Clone)]
pub struct CaptureParams {
    /// Accumulated frames at the lowest BPM of the band
    /// Drops linearly to 1 frame at the highest BPM
    pub max_exposure_frames: u32,

    /// Geolocation request budget (milliseconds)
    pub location_timeout_ms: u64,

    /// Persisted image encoding
    pub encoding: PhotoEncoding,

    /// Frame pacing of the cooperative loop (frames per second)
    pub tick_rate_hz: u32,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            max_exposure_frames: 24,
            location_timeout_ms: 6000,
            encoding: PhotoEncoding::Jpeg { quality: 90 },
            tick_rate_hz: 30,
        }
    }
}

impl CaptureParams {
    /// Duration of one loop tick (milliseconds)
    pub fn tick_interval_ms(&self) -> u64 {
        (1000 / self.tick_rate_hz.max(1)) as u64
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_exposure_frames == 0 {
            return Err(ConfigError::NotPositive {
                name: "max exposure frames",
                value: 0.0,
            });
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::NotPositive {
                name: "tick rate",
                value: 0.0,
            });
        }
        if let PhotoEncoding::Jpeg { quality } = self.encoding {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::InvalidRange {
                    name: "jpeg quality",
                    min: 1.0,
                    max: quality as f64,
                });
            }
        }
        Ok(())
    }
}
