//! Kokoro Camera - a heart-rate camera
//!
//! Pick an aperture, let the camera read your pulse through a fingertip on
//! the lens, then shoot: the slower the heart, the longer the simulated
//! exposure.

pub mod album;
pub mod aperture;
pub mod camera;
pub mod cli;
pub mod compositor;
pub mod error;
pub mod location;
pub mod params;
pub mod pulse;
pub mod scheduler;
pub mod session;
pub mod surface;
