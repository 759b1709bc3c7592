//! Best-effort geolocation for tagging shots.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LocationError;

/// WGS84 coordinates (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// `Lat:35.68124 Lon:139.76712`
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lat:{:.5} Lon:{:.5}", self.lat, self.lon)
    }
}

/// Position provider
pub trait Geolocator {
    /// Current position, giving up after `timeout`
    fn current_position(&mut self, timeout: Duration) -> Result<Position, LocationError>;
}

impl<G: Geolocator + ?Sized> Geolocator for Box<G> {
    fn current_position(&mut self, timeout: Duration) -> Result<Position, LocationError> {
        (**self).current_position(timeout)
    }
}

/// Always unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

impl Geolocator for NoLocation {
    fn current_position(&mut self, _timeout: Duration) -> Result<Position, LocationError> {
        Err(LocationError::Unavailable)
    }
}

/// Always reports the same position
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Position);

impl Geolocator for FixedLocation {
    fn current_position(&mut self, _timeout: Duration) -> Result<Position, LocationError> {
        Ok(self.0)
    }
}

/// Query a geolocator, degrading every failure to `None`
pub fn locate(geolocator: &mut dyn Geolocator, timeout: Duration) -> Option<Position> {
    match geolocator.current_position(timeout) {
        Ok(position) => Some(position),
        Err(err) => {
            log::warn!("No location for this shot: {}", err);
            None
        }
    }
}
