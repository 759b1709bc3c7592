//! Camera sources and the exclusive stream handle.
//!
//! A [`Camera`] hands out at most one live [`FrameStream`]. [`CameraHandle`]
//! owns that stream and always releases it before acquiring another.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use image::{Rgba, RgbaImage};
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::error::CameraError;

/// Which way the camera looks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera
    #[default]
    Environment,
    /// Selfie camera; frames are mirrored for display
    User,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Environment => Self::User,
            Self::User => Self::Environment,
        }
    }

    /// Whether frames must be flipped horizontally to match the preview
    pub fn is_mirrored(self) -> bool {
        self == Self::User
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A live sequence of frames
pub trait FrameStream {
    /// Next frame, or `None` while the stream has no decodable frame yet
    fn next_frame(&mut self) -> Option<RgbaImage>;

    fn facing(&self) -> FacingMode;
}

/// A capture device
pub trait Camera {
    type Stream: FrameStream;

    /// Open a stream; fails while another stream is still held
    fn acquire(&mut self, facing: FacingMode) -> Result<Self::Stream, CameraError>;

    /// Return a stream to the device
    fn release(&mut self, stream: Self::Stream);
}

/// Holds the single active stream of a camera
pub struct CameraHandle<C: Camera> {
    camera: C,
    active: Option<C::Stream>,
}

impl<C: Camera> CameraHandle<C> {
    pub fn new(camera: C) -> Self {
        Self {
            camera,
            active: None,
        }
    }

    /// Release any current stream, then acquire a new one
    pub fn acquire(&mut self, facing: FacingMode) -> Result<(), CameraError> {
        self.release();
        let stream = self.camera.acquire(facing)?;
        log::info!("Camera acquired ({})", facing);
        self.active = Some(stream);
        Ok(())
    }

    pub fn release(&mut self) {
        if let Some(stream) = self.active.take() {
            log::debug!("Camera released ({})", stream.facing());
            self.camera.release(stream);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn facing(&self) -> Option<FacingMode> {
        self.active.as_ref().map(|s| s.facing())
    }

    /// Pull the next frame of the active stream, if any
    pub fn next_frame(&mut self) -> Option<RgbaImage> {
        self.active.as_mut().and_then(|s| s.next_frame())
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }
}

impl<C: Camera> Drop for CameraHandle<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Procedural fingertip-on-lens scene
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// Frame size (pixels)
    pub width: u32,
    pub height: u32,

    /// Nominal frame rate (frames per second)
    pub fps: f64,

    /// Simulated pulse rate (beats per minute)
    pub bpm: f64,

    /// Mean colour of the scene (RGB)
    pub base_rgb: [u8; 3],

    /// Pulse brightness swing (intensity units, ±)
    pub pulse_amplitude: f64,

    /// Perlin grain strength (intensity units, ±)
    pub grain: f64,

    /// Left-to-right brightness ramp (intensity units across the frame)
    pub gradient: f64,

    /// Frames emitted before the stream becomes decodable
    pub warmup_frames: u32,

    /// Perlin noise seed
    pub noise_seed: u32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 30.0,
            bpm: 72.0,
            base_rgb: [180, 40, 30],
            pulse_amplitude: 6.0,
            grain: 2.0,
            gradient: 20.0,
            warmup_frames: 2,
            noise_seed: 42,
        }
    }
}

/// Deterministic camera rendering a [`SyntheticScene`]
pub struct SyntheticCamera {
    scene: SyntheticScene,
    facings: Vec<FacingMode>,
    live_streams: usize,
    acquisitions: usize,
}

impl SyntheticCamera {
    pub fn new(scene: SyntheticScene) -> Self {
        Self {
            scene,
            facings: vec![FacingMode::Environment, FacingMode::User],
            live_streams: 0,
            acquisitions: 0,
        }
    }

    /// Restrict the camera to the given facings
    pub fn with_facings(mut self, facings: &[FacingMode]) -> Self {
        self.facings = facings.to_vec();
        self
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }

    /// Streams currently held by callers
    pub fn live_streams(&self) -> usize {
        self.live_streams
    }

    /// Total successful acquisitions
    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }
}

impl Camera for SyntheticCamera {
    type Stream = SyntheticStream;

    fn acquire(&mut self, facing: FacingMode) -> Result<Self::Stream, CameraError> {
        if !self.facings.contains(&facing) {
            return Err(CameraError::NotFound(facing));
        }
        if self.live_streams > 0 {
            return Err(CameraError::Busy);
        }
        self.live_streams += 1;
        self.acquisitions += 1;
        Ok(SyntheticStream {
            scene: self.scene.clone(),
            perlin: Perlin::new(self.scene.noise_seed),
            facing,
            frame_index: 0,
        })
    }

    fn release(&mut self, _stream: Self::Stream) {
        self.live_streams = self.live_streams.saturating_sub(1);
    }
}

pub struct SyntheticStream {
    scene: SyntheticScene,
    perlin: Perlin,
    facing: FacingMode,
    frame_index: u64,
}

impl SyntheticStream {
    /// Render the scene at `time_s`
    fn render(&self, time_s: f64) -> RgbaImage {
        let s = &self.scene;
        let pulse =
            s.pulse_amplitude * (2.0 * std::f64::consts::PI * s.bpm / 60.0 * time_s).sin();
        let width = s.width.max(1) as f64;

        RgbaImage::from_fn(s.width, s.height, |x, y| {
            let grain = self
                .perlin
                .get([x as f64 * 0.07, y as f64 * 0.07, time_s * 3.0])
                * s.grain;
            let ramp = (x as f64 / width - 0.5) * s.gradient;
            let offset = pulse + grain + ramp;
            let channel = |base: u8| (base as f64 + offset).round().clamp(0.0, 255.0) as u8;
            Rgba([
                channel(s.base_rgb[0]),
                channel(s.base_rgb[1]),
                channel(s.base_rgb[2]),
                255,
            ])
        })
    }
}

impl FrameStream for SyntheticStream {
    fn next_frame(&mut self) -> Option<RgbaImage> {
        let index = self.frame_index;
        self.frame_index += 1;
        if index < self.scene.warmup_frames as u64 {
            return None;
        }
        let time_s = index as f64 / self.scene.fps;
        Some(self.render(time_s))
    }

    fn facing(&self) -> FacingMode {
        self.facing
    }
}

/// Camera replaying a directory of still images in name order, looping
pub struct ImageSequenceCamera {
    frames: Rc<[RgbaImage]>,
    live_streams: usize,
}

impl ImageSequenceCamera {
    /// Decode every PNG/JPEG in `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, CameraError> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg")
                    })
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let frames = paths
            .iter()
            .map(|path| -> Result<RgbaImage, CameraError> { Ok(image::open(path)?.to_rgba8()) })
            .collect::<Result<Vec<_>, _>>()?;
        if frames.is_empty() {
            return Err(CameraError::NoFrames(dir.display().to_string()));
        }

        log::info!("Loaded {} frames from {}", frames.len(), dir.display());
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: Vec<RgbaImage>) -> Self {
        Self {
            frames: frames.into(),
            live_streams: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Camera for ImageSequenceCamera {
    type Stream = ImageSequenceStream;

    fn acquire(&mut self, facing: FacingMode) -> Result<Self::Stream, CameraError> {
        if self.live_streams > 0 {
            return Err(CameraError::Busy);
        }
        self.live_streams += 1;
        Ok(ImageSequenceStream {
            frames: Rc::clone(&self.frames),
            facing,
            position: 0,
        })
    }

    fn release(&mut self, _stream: Self::Stream) {
        self.live_streams = self.live_streams.saturating_sub(1);
    }
}

pub struct ImageSequenceStream {
    frames: Rc<[RgbaImage]>,
    facing: FacingMode,
    position: usize,
}

impl FrameStream for ImageSequenceStream {
    fn next_frame(&mut self) -> Option<RgbaImage> {
        if self.frames.is_empty() {
            return None;
        }
        let frame = self.frames[self.position % self.frames.len()].clone();
        self.position += 1;
        Some(frame)
    }

    fn facing(&self) -> FacingMode {
        self.facing
    }
}
