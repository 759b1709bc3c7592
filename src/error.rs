//! Error types for every collaborator boundary and the session taxonomy.
//!
//! Low-level failures (camera, location, storage) carry their own enums.
//! The session converts them into [`SessionError`] before they reach callers.

use thiserror::Error;

use crate::camera::FacingMode;

/// Parameter validation failures.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} range is empty or inverted: [{min}, {max}]")]
    InvalidRange {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{name} must be > 0, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("default BPM {0} is outside the target band")]
    DefaultOutsideBand(u32),
}

/// Camera acquisition failures.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no camera facing {0}")]
    NotFound(FacingMode),
    #[error("camera device is busy")]
    Busy,
    #[error("no decodable frames in {0}")]
    NoFrames(String),
    #[error("failed to read frame source: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// Geolocation failures. Always degraded to "no location" by the session.
#[derive(Debug, Error, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable")]
    Unavailable,
    #[error("location request timed out after {0} ms")]
    Timeout(u64),
}

/// Photo store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("album I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("album index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
    #[error("failed to encode photo: {0}")]
    Encode(#[from] image::ImageError),
    #[error("photo {0} not found")]
    NotFound(u64),
}

/// Failures the session reports to its caller.
///
/// Insufficient pulse signal is absent on purpose: it resolves to the default BPM.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[source] CameraError),
    #[error("storage failure: {0}")]
    StorageFailure(#[source] StoreError),
}

impl From<CameraError> for SessionError {
    fn from(err: CameraError) -> Self {
        Self::DeviceUnavailable(err)
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::StorageFailure(err)
    }
}
