//! Camera-based pulse measurement.
//!
//! A [`SignalSampler`] reduces each frame to one intensity sample and keeps
//! a bounded history; a [`BpmEstimator`] turns that history into a heart rate.

mod estimator;
mod sampler;
mod trace;

pub use estimator::{BpmEstimate, BpmEstimator, BpmStatus, EstimatorMethod, PulseReading};
pub use sampler::{region_mean, Sample, SampleBuffer, SignalSampler};
pub use trace::pulse_trace;
