//! Simulated aperture range and filter constants.

use crate::error::ConfigError;

/// Aperture model parameters
#[derive(Debug, Clone)]
pub struct ApertureParams {
    /// Widest simulated aperture (F-stop, maximum blur)
    pub f_min: f64,

    /// Narrowest simulated aperture (F-stop, no blur)
    pub f_max: f64,

    /// Blur radius at `f_min` (pixels, gaussian standard deviation)
    pub max_blur_px: f64,

    /// Brightness multiplier at `f_max`
    pub base_brightness: f64,

    /// Brightness multiplier at `f_min`
    pub max_brightness: f64,

    /// Pinch scale range of the aperture indicator (dimensionless)
    /// Smallest scale maps to `f_max`, largest to `f_min`
    pub scale_range: (f64, f64),

    /// Indicator diameter at scale 1.0 (pixels)
    pub indicator_base_px: f64,
}

impl Default for ApertureParams {
    fn default() -> Self {
        Self {
            f_min: 2.0,
            f_max: 22.0,
            max_blur_px: 15.0,
            base_brightness: 0.8,
            max_brightness: 1.5,
            scale_range: (0.25, 4.0),
            indicator_base_px: 150.0,
        }
    }
}

impl ApertureParams {
    /// Fraction of the way from `f_max` (0.0) to `f_min` (1.0), clamped
    pub fn openness(&self, f_number: f64) -> f64 {
        let f = f_number.clamp(self.f_min, self.f_max);
        (self.f_max - f) / (self.f_max - self.f_min)
    }

    /// Validate configuration (ranges must be non-empty, brightness must not invert)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.f_min > 0.0 && self.f_min < self.f_max) {
            return Err(ConfigError::InvalidRange {
                name: "f-number",
                min: self.f_min,
                max: self.f_max,
            });
        }
        if !(self.scale_range.0 > 0.0 && self.scale_range.0 < self.scale_range.1) {
            return Err(ConfigError::InvalidRange {
                name: "pinch scale",
                min: self.scale_range.0,
                max: self.scale_range.1,
            });
        }
        if self.base_brightness > self.max_brightness {
            return Err(ConfigError::InvalidRange {
                name: "brightness",
                min: self.base_brightness,
                max: self.max_brightness,
            });
        }
        if self.max_blur_px < 0.0 {
            return Err(ConfigError::NotPositive {
                name: "max blur",
                value: self.max_blur_px,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(ApertureParams::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let params = ApertureParams {
            f_min: 22.0,
            f_max: 2.0,
            ..ApertureParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidRange { name: "f-number", .. })
        ));
    }

    #[test]
    fn test_openness_clamps() {
        let params = ApertureParams::default();
        assert_eq!(params.openness(1.0), 1.0);
        assert_eq!(params.openness(2.0), 1.0);
        assert_eq!(params.openness(22.0), 0.0);
        assert_eq!(params.openness(40.0), 0.0);
        assert_eq!(params.openness(12.0), 0.5);
    }
}
