//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::camera::{FacingMode, SyntheticScene};
use crate::location::Position;
use crate::params::{PhotoEncoding, SampleChannel};
use crate::pulse::EstimatorMethod;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FacingArg {
    /// Rear camera
    Environment,
    /// Selfie camera (mirrored)
    User,
}

impl From<FacingArg> for FacingMode {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::Environment => FacingMode::Environment,
            FacingArg::User => FacingMode::User,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    /// Dominant frequency of the spectrum
    Spectral,
    /// Mean spacing of smoothed peaks
    Peak,
}

impl From<MethodArg> for EstimatorMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Spectral => EstimatorMethod::Spectral,
            MethodArg::Peak => EstimatorMethod::PeakInterval,
        }
    }
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "kokoro-camera")]
#[command(about = "Heart-rate camera: aperture, pulse, shutter", long_about = None)]
pub struct Args {
    /// Aperture F-number (2 = wide open, 22 = narrowest)
    #[arg(long, value_name = "F", conflicts_with = "pinch")]
    pub f_number: Option<f64>,

    /// Aperture as a pinch scale of the indicator (0.25 to 4.0)
    #[arg(long, value_name = "SCALE")]
    pub pinch: Option<f64>,

    /// Skip pulse measurement and shoot with the default BPM
    #[arg(long)]
    pub skip_pulse: bool,

    /// BPM estimator
    #[arg(long, value_enum, default_value = "spectral")]
    pub method: MethodArg,

    /// Sample the red channel instead of luma
    #[arg(long)]
    pub red_channel: bool,

    /// Camera facing
    #[arg(long, value_enum, default_value = "environment")]
    pub facing: FacingArg,

    /// Replay PNG/JPEG frames from this directory instead of the synthetic camera
    #[arg(long, value_name = "DIR")]
    pub frames_dir: Option<PathBuf>,

    /// Pulse of the synthetic camera (beats per minute)
    #[arg(long, value_name = "BPM", default_value = "72")]
    pub synthetic_bpm: f64,

    /// Number of shots to take
    #[arg(long, value_name = "N", default_value = "1")]
    pub shots: u32,

    /// Album directory
    #[arg(long, value_name = "DIR", default_value = "album")]
    pub album_dir: PathBuf,

    /// Store shots as PNG instead of JPEG
    #[arg(long)]
    pub png: bool,

    /// Latitude to tag shots with (requires --lon)
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude to tag shots with (requires --lat)
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// List the album and exit
    #[arg(long)]
    pub list: bool,

    /// Delete a photo from the album and exit
    #[arg(long, value_name = "ID")]
    pub delete: Option<u64>,

    /// Pace ticks at the frame rate instead of simulating time
    #[arg(long)]
    pub realtime: bool,

    /// Write preview frames and shots as PNG to this directory
    #[arg(long, value_name = "DIR")]
    pub record_preview: Option<PathBuf>,
}

impl Args {
    /// Session configuration with the command-line overrides applied
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            method: self.method.into(),
            ..SessionConfig::default()
        };
        if self.red_channel {
            config.pulse.channel = SampleChannel::Red;
        }
        if self.png {
            config.capture.encoding = PhotoEncoding::Png;
        }
        config
    }

    pub fn facing(&self) -> FacingMode {
        self.facing.into()
    }

    pub fn position(&self) -> Option<Position> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Position { lat, lon }),
            _ => None,
        }
    }

    pub fn synthetic_scene(&self) -> SyntheticScene {
        SyntheticScene {
            bpm: self.synthetic_bpm,
            ..SyntheticScene::default()
        }
    }
}
