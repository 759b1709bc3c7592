//! Frame-to-scalar sampling and the bounded sample ring buffer.

use std::collections::VecDeque;

use glam::Vec3;
use image::RgbaImage;

use crate::params::{PulseParams, SampleChannel};

/// Rec.601 luma weights
const LUMA_WEIGHTS: Vec3 = Vec3::new(0.299, 0.587, 0.114);

/// One reduced frame: mean intensity of the sampling region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Mean channel intensity (0-255)
    pub value: f64,
    /// Wall-clock time of the frame (milliseconds)
    pub timestamp_ms: u64,
}

/// Fixed-capacity FIFO of samples for one measurement
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    ///
    /// Non-finite or negative values and timestamps older than the newest
    /// sample are rejected. Returns whether the sample was stored.
    pub fn push(&mut self, sample: Sample) -> bool {
        if !sample.value.is_finite() || sample.value < 0.0 {
            return false;
        }
        if let Some(last) = self.samples.back() {
            if sample.timestamp_ms < last.timestamp_ms {
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Consume the buffer into an ordered series
    pub fn into_series(self) -> Vec<Sample> {
        self.samples.into()
    }
}

/// Mean channel intensity over a centered square of the frame
///
/// Returns `None` while the frame has no known size yet.
pub fn region_mean(frame: &RgbaImage, roi_size_px: u32, channel: SampleChannel) -> Option<f64> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let side = roi_size_px.min(width).min(height).max(1);
    let x0 = (width - side) / 2;
    let y0 = (height - side) / 2;
    let raw = frame.as_raw();

    let mut sum = 0.0f64;
    for y in y0..y0 + side {
        let start = ((y * width + x0) * 4) as usize;
        let row: &[[u8; 4]] = bytemuck::cast_slice(&raw[start..start + side as usize * 4]);
        for px in row {
            sum += match channel {
                SampleChannel::Luma => {
                    LUMA_WEIGHTS.dot(Vec3::new(px[0] as f32, px[1] as f32, px[2] as f32)) as f64
                }
                SampleChannel::Red => px[0] as f64,
            };
        }
    }

    let mean = sum / (side as f64 * side as f64);
    mean.is_finite().then_some(mean)
}

/// Owns the ring buffer for the duration of one measurement
pub struct SignalSampler {
    buffer: SampleBuffer,
    roi_size_px: u32,
    channel: SampleChannel,
}

impl SignalSampler {
    pub fn new(params: &PulseParams) -> Self {
        Self {
            buffer: SampleBuffer::with_capacity(params.ring_capacity),
            roi_size_px: params.roi_size_px,
            channel: params.channel,
        }
    }

    /// Reduce a frame to one sample and append it
    ///
    /// Skipped (returns `None`) when the frame is not decodable yet; the
    /// caller simply tries again on the next tick.
    pub fn sample(&mut self, frame: &RgbaImage, now_ms: u64) -> Option<Sample> {
        let value = region_mean(frame, self.roi_size_px, self.channel)?;
        let sample = Sample {
            value,
            timestamp_ms: now_ms,
        };
        self.buffer.push(sample).then_some(sample)
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// End the measurement, handing the samples over
    pub fn into_buffer(self) -> SampleBuffer {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgba;

    fn sample(value: f64, timestamp_ms: u64) -> Sample {
        Sample {
            value,
            timestamp_ms,
        }
    }

    #[test]
    fn test_ring_buffer_fifo_eviction() {
        let capacity = 512;
        let mut buffer = SampleBuffer::with_capacity(capacity);
        for i in 0..=capacity as u64 {
            assert!(buffer.push(sample(i as f64, i)));
            assert!(buffer.len() <= capacity);
        }

        assert_eq!(buffer.len(), capacity);
        // Oldest gone, newest present
        assert!(buffer.iter().all(|s| s.timestamp_ms != 0));
        assert_eq!(buffer.iter().next().map(|s| s.timestamp_ms), Some(1));
        assert_eq!(buffer.latest().map(|s| s.timestamp_ms), Some(capacity as u64));
    }

    #[test]
    fn test_ring_buffer_rejects_bad_samples() {
        let mut buffer = SampleBuffer::with_capacity(8);
        assert!(!buffer.push(sample(f64::NAN, 0)));
        assert!(!buffer.push(sample(f64::INFINITY, 0)));
        assert!(!buffer.push(sample(-1.0, 0)));
        assert!(buffer.push(sample(10.0, 100)));
        // Going back in time is refused, equal timestamps are fine
        assert!(!buffer.push(sample(10.0, 99)));
        assert!(buffer.push(sample(11.0, 100)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_region_mean_luma_and_red() {
        let frame = RgbaImage::from_pixel(320, 240, Rgba([200, 100, 50, 255]));

        let luma = region_mean(&frame, 100, SampleChannel::Luma).unwrap();
        assert_relative_eq!(luma, 0.299 * 200.0 + 0.587 * 100.0 + 0.114 * 50.0, epsilon = 1e-3);

        let red = region_mean(&frame, 100, SampleChannel::Red).unwrap();
        assert_relative_eq!(red, 200.0);
    }

    #[test]
    fn test_region_mean_uses_center_only() {
        // Bright border, dark center
        let mut frame = RgbaImage::from_pixel(300, 300, Rgba([255, 255, 255, 255]));
        for y in 100..200 {
            for x in 100..200 {
                frame.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        assert_relative_eq!(region_mean(&frame, 100, SampleChannel::Red).unwrap(), 0.0);
    }

    #[test]
    fn test_region_clipped_to_small_frame() {
        let frame = RgbaImage::from_pixel(40, 20, Rgba([90, 0, 0, 255]));
        assert_relative_eq!(region_mean(&frame, 100, SampleChannel::Red).unwrap(), 90.0);
    }

    #[test]
    fn test_undecodable_frame_is_skipped() {
        let mut sampler = SignalSampler::new(&PulseParams::default());
        let empty = RgbaImage::new(0, 0);
        assert!(sampler.sample(&empty, 0).is_none());
        assert!(sampler.buffer().is_empty());

        let frame = RgbaImage::from_pixel(64, 64, Rgba([10, 10, 10, 255]));
        assert!(sampler.sample(&frame, 33).is_some());
        assert_eq!(sampler.into_buffer().len(), 1);
    }
}
