//! Capture compositing: aperture filter, mirroring and motion accumulation.
//!
//! A shot is a pseudo-exposure. The lower the pulse, the more live frames are
//! averaged into the result, which smears anything that moved. Preview frames
//! and captured frames go through the same [`render_frame`] so they never
//! disagree on mirroring or filtering.

use glam::{Vec3, Vec4};
use image::{imageops, Rgba, RgbaImage};

use crate::aperture::{ApertureSetting, FilterParams};
use crate::camera::{FacingMode, FrameStream};
use crate::params::{ApertureParams, CaptureParams, PulseParams};
use crate::pulse::PulseReading;

/// Extra polls allowed per wanted frame when draining a stream
const POLLS_PER_FRAME: usize = 4;

/// Apply blur, brightness and (for the selfie camera) a horizontal flip
pub fn render_frame(frame: &RgbaImage, filter: &FilterParams, facing: FacingMode) -> RgbaImage {
    let mut out = if filter.blur_radius_px > 0.0 {
        imageops::blur(frame, filter.blur_radius_px as f32)
    } else {
        frame.clone()
    };

    if filter.brightness != 1.0 {
        let gain = filter.brightness as f32;
        for px in out.pixels_mut() {
            let rgb = (Vec3::new(px[0] as f32, px[1] as f32, px[2] as f32) * gain)
                .round()
                .clamp(Vec3::ZERO, Vec3::splat(255.0));
            *px = Rgba([rgb.x as u8, rgb.y as u8, rgb.z as u8, px[3]]);
        }
    }

    if facing.is_mirrored() {
        imageops::flip_horizontal_in_place(&mut out);
    }
    out
}

/// Number of frames averaged for a shot
///
/// Linear from `max_exposure_frames` at the bottom of the BPM band down to a
/// single frame at the top. A fallback reading always gives a single frame.
pub fn exposure_frames(
    reading: &PulseReading,
    pulse: &PulseParams,
    capture: &CaptureParams,
) -> u32 {
    let bpm = match *reading {
        PulseReading::Measured(bpm) => bpm,
        PulseReading::Fallback(_) => return 1,
    };
    if !pulse.in_band(bpm as f64) {
        return 1;
    }

    let (lo, hi) = pulse.bpm_band;
    let t = (bpm - lo) as f64 / (hi - lo) as f64;
    let max = capture.max_exposure_frames as f64;
    (max - t * (max - 1.0)).round().max(1.0) as u32
}

/// Running multi-frame exposure, advanced one frame per tick
pub struct Exposure {
    filter: FilterParams,
    facing: FacingMode,
    target_frames: u32,
    accumulated: u32,
    size: Option<(u32, u32)>,
    sums: Vec<Vec4>,
}

impl Exposure {
    pub fn new(filter: FilterParams, facing: FacingMode, target_frames: u32) -> Self {
        Self {
            filter,
            facing,
            target_frames: target_frames.max(1),
            accumulated: 0,
            size: None,
            sums: Vec::new(),
        }
    }

    /// Fold one live frame into the exposure; returns whether it is complete
    ///
    /// Frames of a different size than the first are resized to match.
    pub fn accumulate(&mut self, frame: &RgbaImage) -> bool {
        if self.is_complete() {
            return true;
        }
        if frame.width() == 0 || frame.height() == 0 {
            return false;
        }

        let rendered = render_frame(frame, &self.filter, self.facing);
        let (width, height) = *self.size.get_or_insert(rendered.dimensions());
        if self.sums.is_empty() {
            self.sums = vec![Vec4::ZERO; (width * height) as usize];
        }
        let rendered = if rendered.dimensions() != (width, height) {
            imageops::resize(&rendered, width, height, imageops::FilterType::Triangle)
        } else {
            rendered
        };

        for (sum, px) in self.sums.iter_mut().zip(rendered.pixels()) {
            *sum += Vec4::new(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
        }
        self.accumulated += 1;
        log::trace!(
            "Exposure frame {}/{}",
            self.accumulated,
            self.target_frames
        );
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.accumulated >= self.target_frames
    }

    /// (accumulated, target) frame counts
    pub fn progress(&self) -> (u32, u32) {
        (self.accumulated, self.target_frames)
    }

    /// Equal-weight average of every accumulated frame
    ///
    /// Returns `None` if no frame was accumulated.
    pub fn finish(self) -> Option<RgbaImage> {
        let (width, height) = self.size?;
        if self.accumulated == 0 {
            return None;
        }
        let scale = 1.0 / self.accumulated as f32;
        let mut out = RgbaImage::new(width, height);
        for (px, sum) in out.pixels_mut().zip(&self.sums) {
            let v = (*sum * scale).round().clamp(Vec4::ZERO, Vec4::splat(255.0));
            *px = Rgba([v.x as u8, v.y as u8, v.z as u8, v.w as u8]);
        }
        Some(out)
    }
}

/// Combines aperture and pulse into preview frames and captured shots
#[derive(Debug, Clone)]
pub struct Compositor {
    aperture: ApertureParams,
    pulse: PulseParams,
    capture: CaptureParams,
}

impl Compositor {
    pub fn new(aperture: ApertureParams, pulse: PulseParams, capture: CaptureParams) -> Self {
        Self {
            aperture,
            pulse,
            capture,
        }
    }

    /// Live preview of one frame, identical to a single-frame capture
    pub fn preview(
        &self,
        frame: &RgbaImage,
        aperture: &ApertureSetting,
        facing: FacingMode,
    ) -> RgbaImage {
        render_frame(frame, &aperture.filter(&self.aperture), facing)
    }

    pub fn exposure_frames(&self, reading: &PulseReading) -> u32 {
        exposure_frames(reading, &self.pulse, &self.capture)
    }

    /// Start a tick-driven exposure for a shot
    pub fn begin(
        &self,
        aperture: &ApertureSetting,
        reading: &PulseReading,
        facing: FacingMode,
    ) -> Exposure {
        let frames = self.exposure_frames(reading);
        log::debug!(
            "Exposure of {} frames at F{:.1}, {} BPM",
            frames,
            aperture.f_number(),
            reading.bpm()
        );
        Exposure::new(aperture.filter(&self.aperture), facing, frames)
    }

    /// Drain a stream until the exposure completes
    ///
    /// Blocking convenience for callers without a frame loop. Gives up after a
    /// bounded number of empty polls and returns whatever was accumulated.
    pub fn composite<S: FrameStream>(
        &self,
        stream: &mut S,
        aperture: &ApertureSetting,
        reading: &PulseReading,
    ) -> Option<RgbaImage> {
        let mut exposure = self.begin(aperture, reading, stream.facing());
        let max_polls = exposure.progress().1 as usize * POLLS_PER_FRAME + POLLS_PER_FRAME;
        for _ in 0..max_polls {
            if let Some(frame) = stream.next_frame() {
                if exposure.accumulate(&frame) {
                    break;
                }
            }
        }
        exposure.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, ImageSequenceCamera, SyntheticCamera, SyntheticScene};

    fn compositor() -> Compositor {
        Compositor::new(
            ApertureParams::default(),
            PulseParams::default(),
            CaptureParams::default(),
        )
    }

    /// Left half dark, right half bright
    fn split_frame() -> RgbaImage {
        RgbaImage::from_fn(16, 8, |x, _| {
            if x < 8 {
                Rgba([10, 20, 30, 255])
            } else {
                Rgba([200, 150, 100, 255])
            }
        })
    }

    #[test]
    fn test_exposure_frames_across_band() {
        let pulse = PulseParams::default();
        let capture = CaptureParams::default();

        assert_eq!(exposure_frames(&PulseReading::Measured(60), &pulse, &capture), 24);
        assert_eq!(exposure_frames(&PulseReading::Measured(100), &pulse, &capture), 1);
        assert_eq!(exposure_frames(&PulseReading::Measured(80), &pulse, &capture), 13);
        assert_eq!(exposure_frames(&PulseReading::Measured(130), &pulse, &capture), 1);
        assert_eq!(exposure_frames(&PulseReading::Fallback(80), &pulse, &capture), 1);

        let mut prev = u32::MAX;
        for bpm in 60..=100 {
            let frames = exposure_frames(&PulseReading::Measured(bpm), &pulse, &capture);
            assert!(frames <= prev);
            prev = frames;
        }
    }

    #[test]
    fn test_fallback_composite_equals_single_filtered_frame() {
        let params = ApertureParams::default();
        let aperture = ApertureSetting::new(8.0, &params);
        let frame = split_frame();

        let mut camera = ImageSequenceCamera::from_frames(vec![frame.clone()]);
        let mut stream = camera.acquire(FacingMode::Environment).unwrap();
        let shot = compositor()
            .composite(&mut stream, &aperture, &PulseReading::Fallback(80))
            .unwrap();

        let direct = render_frame(&frame, &aperture.filter(&params), FacingMode::Environment);
        assert_eq!(shot, direct);
    }

    #[test]
    fn test_accumulation_is_equal_weight_average() {
        let filter = FilterParams::IDENTITY;
        let mut exposure = Exposure::new(filter, FacingMode::Environment, 2);

        assert!(!exposure.accumulate(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))));
        assert!(exposure.accumulate(&RgbaImage::from_pixel(4, 4, Rgba([255, 100, 51, 255]))));
        // Extra frames after completion are ignored
        assert!(exposure.accumulate(&RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]))));
        assert_eq!(exposure.progress(), (2, 2));

        let out = exposure.finish().unwrap();
        assert_eq!(out.get_pixel(1, 1), &Rgba([128, 50, 26, 255]));
    }

    #[test]
    fn test_empty_exposure_has_no_image() {
        let mut exposure = Exposure::new(FilterParams::IDENTITY, FacingMode::User, 3);
        assert!(!exposure.accumulate(&RgbaImage::new(0, 0)));
        assert!(exposure.finish().is_none());
    }

    #[test]
    fn test_mismatched_frame_size_resized() {
        let mut exposure = Exposure::new(FilterParams::IDENTITY, FacingMode::Environment, 2);
        exposure.accumulate(&RgbaImage::from_pixel(8, 8, Rgba([100, 100, 100, 255])));
        exposure.accumulate(&RgbaImage::from_pixel(16, 16, Rgba([100, 100, 100, 255])));
        let out = exposure.finish().unwrap();
        assert_eq!(out.dimensions(), (8, 8));
        assert_eq!(out.get_pixel(3, 3)[0], 100);
    }

    #[test]
    fn test_user_facing_is_mirrored_in_preview_and_capture() {
        let params = ApertureParams::default();
        let aperture = ApertureSetting::new(22.0, &params);
        let frame = split_frame();
        let compositor = compositor();

        let preview = compositor.preview(&frame, &aperture, FacingMode::User);

        let mut camera = ImageSequenceCamera::from_frames(vec![frame.clone()]);
        let mut stream = camera.acquire(FacingMode::User).unwrap();
        let shot = compositor
            .composite(&mut stream, &aperture, &PulseReading::Fallback(80))
            .unwrap();

        assert_eq!(preview, shot);
        // Bright half moved to the left; F22 darkens by 0.8
        assert_eq!(shot.get_pixel(0, 0), &Rgba([160, 120, 80, 255]));
        assert_eq!(shot.get_pixel(15, 0), &Rgba([8, 16, 24, 255]));
    }

    #[test]
    fn test_environment_facing_not_mirrored() {
        let out = render_frame(&split_frame(), &FilterParams::IDENTITY, FacingMode::Environment);
        assert_eq!(out, split_frame());
    }

    #[test]
    fn test_wide_aperture_blurs_and_brightens() {
        let params = ApertureParams::default();
        let frame = split_frame();
        let filter = ApertureSetting::new(2.0, &params).filter(&params);
        let out = render_frame(&frame, &filter, FacingMode::Environment);

        // The hard edge is softened
        let left = out.get_pixel(6, 4)[0] as i32;
        let right = out.get_pixel(9, 4)[0] as i32;
        assert!((right - left) < 190, "edge not blurred: {} vs {}", left, right);

        // Mean brightness goes up
        let mean_in: f64 = frame.pixels().map(|p| p[1] as f64).sum::<f64>() / 128.0;
        let mean_out: f64 = out.pixels().map(|p| p[1] as f64).sum::<f64>() / 128.0;
        assert!(mean_out > mean_in);
    }

    #[test]
    fn test_low_bpm_accumulates_many_frames() {
        let scene = SyntheticScene {
            width: 32,
            height: 24,
            warmup_frames: 3,
            ..SyntheticScene::default()
        };
        let mut camera = SyntheticCamera::new(scene);
        let mut stream = camera.acquire(FacingMode::Environment).unwrap();
        let compositor = compositor();
        let aperture = ApertureSetting::new(22.0, &ApertureParams::default());

        let mut exposure =
            compositor.begin(&aperture, &PulseReading::Measured(60), FacingMode::Environment);
        let mut ticks = 0;
        while !exposure.is_complete() {
            if let Some(frame) = stream.next_frame() {
                exposure.accumulate(&frame);
            }
            ticks += 1;
        }
        assert_eq!(exposure.progress(), (24, 24));
        assert_eq!(ticks, 27);
        assert_eq!(exposure.finish().unwrap().dimensions(), (32, 24));
    }
}
