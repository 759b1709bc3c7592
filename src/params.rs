//! Parameter definitions with physical units and documented semantics.
//!
//! All magic numbers of the camera are extracted here with:
//! - Units (F-stops, pixels, milliseconds, BPM)
//! - Documented ranges and meanings
//! - Validation where a bad value would break the pipeline

mod aperture;
mod capture;
mod pulse;

// Re-export all types
pub use aperture::ApertureParams;
pub use capture::{CaptureParams, PhotoEncoding};
pub use pulse::{PulseParams, SampleChannel};
