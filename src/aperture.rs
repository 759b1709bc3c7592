//! Simulated aperture: F-number to blur/brightness mapping.
//!
//! A small F-number (wide aperture) gives strong blur and a bright image,
//! a large F-number gives a sharp and slightly darker one. Both outputs move
//! linearly between the range endpoints and inputs outside the range clamp.

use std::fmt;

use crate::params::ApertureParams;

/// Rendering parameters derived from an F-number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Gaussian blur standard deviation (pixels)
    pub blur_radius_px: f64,
    /// Per-channel RGB multiplier
    pub brightness: f64,
}

impl FilterParams {
    /// Filter that leaves a frame untouched
    pub const IDENTITY: Self = Self {
        blur_radius_px: 0.0,
        brightness: 1.0,
    };
}

/// CSS-style filter descriptor, e.g. `blur(15.0px) brightness(1.50)`
impl fmt::Display for FilterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blur({:.1}px) brightness({:.2})",
            self.blur_radius_px, self.brightness
        )
    }
}

/// Map an F-number to filter parameters
pub fn filter_params(f_number: f64, params: &ApertureParams) -> FilterParams {
    let openness = params.openness(f_number);
    FilterParams {
        blur_radius_px: (openness * params.max_blur_px).max(0.0),
        brightness: params.base_brightness
            + openness * (params.max_brightness - params.base_brightness),
    }
}

/// User-chosen F-number, always inside the configured range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureSetting {
    f_number: f64,
}

impl ApertureSetting {
    /// Create a setting, clamping into `[f_min, f_max]`
    pub fn new(f_number: f64, params: &ApertureParams) -> Self {
        let f_number = if f_number.is_nan() {
            params.f_max
        } else {
            f_number.clamp(params.f_min, params.f_max)
        };
        Self { f_number }
    }

    /// Narrowest aperture, the state before the user touches anything
    pub fn narrowest(params: &ApertureParams) -> Self {
        Self {
            f_number: params.f_max,
        }
    }

    /// Convert a pinch scale of the aperture indicator into a setting
    ///
    /// The smallest scale maps to `f_max` and the largest to `f_min`.
    pub fn from_pinch_scale(scale: f64, params: &ApertureParams) -> Self {
        let (lo, hi) = params.scale_range;
        let scale = scale.clamp(lo, hi);
        let f = (hi - scale) / (hi - lo) * (params.f_max - params.f_min) + params.f_min;
        Self::new(f, params)
    }

    /// Inverse of [`ApertureSetting::from_pinch_scale`]
    pub fn pinch_scale(&self, params: &ApertureParams) -> f64 {
        let (lo, hi) = params.scale_range;
        hi - (self.f_number - params.f_min) / (params.f_max - params.f_min) * (hi - lo)
    }

    /// Diameter of the on-screen aperture indicator (pixels)
    pub fn indicator_size_px(&self, params: &ApertureParams) -> f64 {
        params.indicator_base_px * self.pinch_scale(params)
    }

    pub fn f_number(&self) -> f64 {
        self.f_number
    }

    /// F-number as shown to the user (whole stops)
    pub fn display_value(&self) -> u32 {
        self.f_number.round() as u32
    }

    pub fn filter(&self, params: &ApertureParams) -> FilterParams {
        filter_params(self.f_number, params)
    }
}
