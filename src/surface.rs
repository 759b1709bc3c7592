//! Rendering surfaces: where preview frames, shots and the pulse trace go.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;

/// Sink for everything the session wants to show
pub trait Surface {
    /// One live preview frame, already filtered and mirrored
    fn present_preview(&mut self, frame: &RgbaImage);

    /// A finished shot
    fn present_capture(&mut self, photo: &RgbaImage);

    /// Normalized pulse trace in [0, 1], oldest sample first
    fn present_trace(&mut self, trace: &[f32]);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn present_preview(&mut self, _frame: &RgbaImage) {}

    fn present_capture(&mut self, _photo: &RgbaImage) {}

    fn present_trace(&mut self, _trace: &[f32]) {}
}

/// Writes previews and shots to PNG files
///
/// Previews land in `<dir>/frames/frame_00000.png`, shots in
/// `<dir>/capture_00000.png`. The latest trace is kept in memory.
pub struct RecordingSurface {
    dir: PathBuf,
    previews: usize,
    captures: usize,
    last_trace: Vec<f32>,
}

impl RecordingSurface {
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("frames"))?;
        Ok(Self {
            dir,
            previews: 0,
            captures: 0,
            last_trace: Vec::new(),
        })
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.dir.join("frames")
    }

    pub fn previews_written(&self) -> usize {
        self.previews
    }

    pub fn captures_written(&self) -> usize {
        self.captures
    }

    pub fn last_trace(&self) -> &[f32] {
        &self.last_trace
    }

    fn save(path: &Path, image: &RgbaImage) {
        if let Err(e) = image::save_buffer(
            path,
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        ) {
            log::warn!("Failed to save {}: {}", path.display(), e);
        }
    }
}

impl Surface for RecordingSurface {
    fn present_preview(&mut self, frame: &RgbaImage) {
        let path = self
            .frames_dir()
            .join(format!("frame_{:05}.png", self.previews));
        Self::save(&path, frame);
        self.previews += 1;
    }

    fn present_capture(&mut self, photo: &RgbaImage) {
        let path = self.dir.join(format!("capture_{:05}.png", self.captures));
        Self::save(&path, photo);
        self.captures += 1;
    }

    fn present_trace(&mut self, trace: &[f32]) {
        self.last_trace.clear();
        self.last_trace.extend_from_slice(trace);
    }
}

/// Render a normalized trace as a one-line bar graph, at most `width` chars
pub fn sparkline(trace: &[f32], width: usize) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    if trace.is_empty() || width == 0 {
        return String::new();
    }

    let step = trace.len().div_ceil(width);
    trace
        .chunks(step)
        .map(|chunk| {
            let mean = chunk.iter().sum::<f32>() / chunk.len() as f32;
            let level = (mean.clamp(0.0, 1.0) * (BARS.len() - 1) as f32).round() as usize;
            BARS[level]
        })
        .collect()
}
