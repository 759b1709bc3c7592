//! Session orchestrator.
//!
//! Screens run in a fixed order: Initial -> ApertureSetup -> PulseMeasurement
//! -> Capture. Pulse measurement may be repeated or skipped; Capture loops on
//! itself. All work happens in [`Session::process_event`], one event at a
//! time, with [`SessionEvent::Tick`] advancing sampling and exposures by one
//! frame.
//!
//! The camera is held by at most one stream: measurement and capture each
//! acquire their own, and the handle releases the old one first.

use std::ops::ControlFlow;
use std::time::Duration;

use chrono::Utc;

use crate::album::{CapturedPhoto, PhotoId, PhotoStore};
use crate::aperture::ApertureSetting;
use crate::camera::{Camera, CameraHandle, FacingMode};
use crate::compositor::{Compositor, Exposure};
use crate::error::{ConfigError, SessionError};
use crate::location::{locate, Geolocator};
use crate::params::{ApertureParams, CaptureParams, PulseParams};
use crate::pulse::{
    pulse_trace, BpmEstimate, BpmEstimator, EstimatorMethod, PulseReading, SignalSampler,
};
use crate::scheduler::{Clock, FrameLoop};
use crate::surface::Surface;

/// Everything a session is configured with
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub aperture: ApertureParams,
    pub pulse: PulseParams,
    pub capture: CaptureParams,
    pub method: EstimatorMethod,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aperture.validate()?;
        self.pulse.validate()?;
        self.capture.validate()
    }
}

/// Progress inside the pulse measurement screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurePhase {
    /// No measurement running (camera failed, or waiting for a retry)
    Idle,
    /// Sampling; the clock starts on the first tick
    Measuring { started_at_ms: Option<u64> },
    /// A reading is available
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initial,
    ApertureSetup,
    PulseMeasurement(MeasurePhase),
    Capture,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// Leave the title screen
    Start,
    /// Set the F-number directly
    SetAperture(f64),
    /// Pinch gesture on the aperture indicator (scale factor)
    Pinch(f64),
    /// Accept the aperture and start measuring
    DecideAperture,
    /// Run the measurement again
    MeasureAgain,
    /// Skip measuring and use the default BPM
    SkipMeasurement,
    /// Accept the measured BPM
    ConfirmPulse,
    /// One display frame at the given clock time (ms)
    Tick(u64),
    Shutter,
    ToggleFacing,
    /// Back to the title screen with a fresh context
    Reset,
}

/// State shared across screens, rebuilt on reset
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub aperture: ApertureSetting,
    pub reading: Option<PulseReading>,
    pub last_estimate: Option<BpmEstimate>,
    pub facing: FacingMode,
    /// Every shot of this session, persisted or not
    pub photos: Vec<CapturedPhoto>,
    pub last_saved: Option<PhotoId>,
}

impl SessionContext {
    pub fn new(params: &ApertureParams) -> Self {
        Self {
            aperture: ApertureSetting::narrowest(params),
            reading: None,
            last_estimate: None,
            facing: FacingMode::default(),
            photos: Vec::new(),
            last_saved: None,
        }
    }
}

pub struct Session<C: Camera, G: Geolocator, S: PhotoStore, V: Surface> {
    state: SessionState,
    context: SessionContext,
    config: SessionConfig,
    compositor: Compositor,
    estimator: BpmEstimator,
    camera: CameraHandle<C>,
    geolocator: G,
    store: S,
    surface: V,
    sampler: Option<SignalSampler>,
    exposure: Option<Exposure>,
}

impl<C: Camera, G: Geolocator, S: PhotoStore, V: Surface> Session<C, G, S, V> {
    /// Build a session in the Initial state
    ///
    /// Fails if `config` does not validate; the band and range clamps
    /// further down rely on it.
    pub fn new(
        config: SessionConfig,
        camera: C,
        geolocator: G,
        store: S,
        surface: V,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let compositor = Compositor::new(
            config.aperture.clone(),
            config.pulse.clone(),
            config.capture.clone(),
        );
        let estimator = BpmEstimator::new(config.pulse.clone(), config.method);
        Ok(Self {
            state: SessionState::Initial,
            context: SessionContext::new(&config.aperture),
            config,
            compositor,
            estimator,
            camera: CameraHandle::new(camera),
            geolocator,
            store,
            surface,
            sampler: None,
            exposure: None,
        })
    }

    /// Handle one event
    ///
    /// Events that make no sense in the current state are logged and
    /// ignored. Errors never leave the session in a broken state: the
    /// transition still happens and the caller decides what to tell the user.
    pub fn process_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        use SessionState::*;

        match (self.state, event) {
            (_, SessionEvent::Reset) => {
                self.reset();
                Ok(())
            }

            // From Initial
            (Initial, SessionEvent::Start) => {
                log::info!("Starting session, entering ApertureSetup");
                self.state = ApertureSetup;
                Ok(())
            }

            // From ApertureSetup
            (ApertureSetup, SessionEvent::SetAperture(f_number)) => {
                self.context.aperture = ApertureSetting::new(f_number, &self.config.aperture);
                log::debug!("Aperture set to F{}", self.context.aperture.display_value());
                Ok(())
            }
            (ApertureSetup, SessionEvent::Pinch(scale)) => {
                let aperture = ApertureSetting::from_pinch_scale(scale, &self.config.aperture);
                log::debug!(
                    "Pinch {:.2}: F{}, indicator {:.0}px",
                    scale,
                    aperture.display_value(),
                    aperture.indicator_size_px(&self.config.aperture)
                );
                self.context.aperture = aperture;
                Ok(())
            }
            (ApertureSetup, SessionEvent::DecideAperture) => {
                log::info!(
                    "Aperture F{} decided, entering PulseMeasurement",
                    self.context.aperture.display_value()
                );
                self.state = PulseMeasurement(MeasurePhase::Idle);
                self.start_measurement()
            }

            // From PulseMeasurement
            (PulseMeasurement(MeasurePhase::Measuring { .. }), SessionEvent::MeasureAgain) => {
                log::warn!("Measurement already running, ignoring restart");
                Ok(())
            }
            (PulseMeasurement(_), SessionEvent::MeasureAgain) => self.start_measurement(),
            (
                PulseMeasurement(MeasurePhase::Measuring { started_at_ms }),
                SessionEvent::Tick(now_ms),
            ) => {
                self.measure_tick(started_at_ms, now_ms);
                Ok(())
            }
            (PulseMeasurement(_), SessionEvent::SkipMeasurement) => {
                self.sampler = None;
                let reading = PulseReading::fallback(&self.config.pulse);
                log::info!(
                    "Measurement skipped, using {} BPM, entering Capture",
                    reading.bpm()
                );
                self.context.reading = Some(reading);
                self.enter_capture()
            }
            (PulseMeasurement(MeasurePhase::Done), SessionEvent::ConfirmPulse) => {
                log::info!("Pulse confirmed, entering Capture");
                self.enter_capture()
            }

            // From Capture
            (Capture, SessionEvent::Tick(_)) => self.capture_tick(),
            (Capture, SessionEvent::Shutter) => {
                self.press_shutter();
                Ok(())
            }
            (Capture, SessionEvent::ToggleFacing) => {
                self.context.facing = self.context.facing.toggled();
                if self.exposure.take().is_some() {
                    log::warn!("Camera switched mid-exposure, shot dropped");
                }
                log::info!("Switching camera to {}", self.context.facing);
                self.camera.acquire(self.context.facing)?;
                Ok(())
            }

            // Nothing is scheduled in the remaining states
            (_, SessionEvent::Tick(_)) => Ok(()),

            // Invalid transitions
            (state, event) => {
                log::warn!("Ignoring {:?} in {:?}", event, state);
                Ok(())
            }
        }
    }

    /// Feed clock ticks from `frames` until `done` holds or a tick fails
    ///
    /// Runs at least one tick. Returns the number of ticks run.
    pub fn run_until<K, F>(
        &mut self,
        frames: &mut FrameLoop<K>,
        mut done: F,
    ) -> Result<u64, SessionError>
    where
        K: Clock,
        F: FnMut(&Self) -> bool,
    {
        let mut failure = None;
        let ticks = frames.run(|now_ms| {
            if let Err(err) = self.process_event(SessionEvent::Tick(now_ms)) {
                failure = Some(err);
                return ControlFlow::Break(());
            }
            if done(self) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(ticks),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraHandle<C> {
        &self.camera
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn surface(&self) -> &V {
        &self.surface
    }

    /// Whether a shot is still accumulating frames
    pub fn is_exposing(&self) -> bool {
        self.exposure.is_some()
    }

    /// Start a fresh measurement on a newly acquired stream
    ///
    /// Any previous sample buffer is dropped, never reused.
    fn start_measurement(&mut self) -> Result<(), SessionError> {
        self.sampler = None;
        if let Err(err) = self.camera.acquire(self.context.facing) {
            log::warn!("Camera unavailable for pulse measurement: {}", err);
            self.state = SessionState::PulseMeasurement(MeasurePhase::Idle);
            return Err(err.into());
        }

        self.sampler = Some(SignalSampler::new(&self.config.pulse));
        self.context.reading = None;
        self.context.last_estimate = None;
        self.state = SessionState::PulseMeasurement(MeasurePhase::Measuring {
            started_at_ms: None,
        });
        log::info!(
            "Measuring pulse for {} ms",
            self.config.pulse.measurement_ms
        );
        Ok(())
    }

    fn measure_tick(&mut self, started_at_ms: Option<u64>, now_ms: u64) {
        let started_at_ms = started_at_ms.unwrap_or(now_ms);
        self.state = SessionState::PulseMeasurement(MeasurePhase::Measuring {
            started_at_ms: Some(started_at_ms),
        });

        let frame = self.camera.next_frame();
        if let (Some(sampler), Some(frame)) = (self.sampler.as_mut(), frame) {
            if let Some(sample) = sampler.sample(&frame, now_ms) {
                log::trace!("Sample {:.2} at {} ms", sample.value, sample.timestamp_ms);
            }
            let trace = pulse_trace(sampler.buffer(), self.config.pulse.trace_width);
            self.surface.present_trace(&trace);
        }

        if now_ms.saturating_sub(started_at_ms) >= self.config.pulse.measurement_ms {
            self.finish_measurement();
        }
    }

    fn finish_measurement(&mut self) {
        let Some(sampler) = self.sampler.take() else {
            return;
        };
        let series = sampler.into_buffer().into_series();
        let estimate = self
            .estimator
            .estimate(&series, self.config.pulse.window_secs);
        let reading = PulseReading::from_estimate(&estimate, &self.config.pulse);

        match reading {
            PulseReading::Measured(bpm) => {
                log::info!("Measured {} BPM from {} samples", bpm, series.len())
            }
            PulseReading::Fallback(bpm) => log::warn!(
                "No pulse found in {} samples ({:?}), using {} BPM",
                series.len(),
                estimate.status,
                bpm
            ),
        }

        self.context.last_estimate = Some(estimate);
        self.context.reading = Some(reading);
        self.state = SessionState::PulseMeasurement(MeasurePhase::Done);
    }

    /// Switch to Capture on a new stream
    ///
    /// The state changes even when the camera cannot be acquired; toggling
    /// the facing retries.
    fn enter_capture(&mut self) -> Result<(), SessionError> {
        self.camera.release();
        self.exposure = None;
        self.state = SessionState::Capture;
        self.camera.acquire(self.context.facing)?;
        Ok(())
    }

    fn press_shutter(&mut self) {
        if self.exposure.is_some() {
            log::debug!("Shutter ignored, exposure in progress");
            return;
        }
        if !self.camera.is_active() {
            log::warn!("Shutter ignored, no camera");
            return;
        }

        let reading = self
            .context
            .reading
            .unwrap_or_else(|| PulseReading::fallback(&self.config.pulse));
        self.exposure = Some(self.compositor.begin(
            &self.context.aperture,
            &reading,
            self.context.facing,
        ));
    }

    fn capture_tick(&mut self) -> Result<(), SessionError> {
        let Some(frame) = self.camera.next_frame() else {
            return Ok(());
        };

        let preview = self
            .compositor
            .preview(&frame, &self.context.aperture, self.context.facing);
        self.surface.present_preview(&preview);

        let complete = match self.exposure.as_mut() {
            Some(exposure) => exposure.accumulate(&frame),
            None => false,
        };
        if complete {
            if let Some(exposure) = self.exposure.take() {
                return self.finish_shot(exposure);
            }
        }
        Ok(())
    }

    /// Turn a finished exposure into a photo, keep it, then persist it
    fn finish_shot(&mut self, exposure: Exposure) -> Result<(), SessionError> {
        let Some(image) = exposure.finish() else {
            log::warn!("Exposure produced no image");
            return Ok(());
        };

        let timeout = Duration::from_millis(self.config.capture.location_timeout_ms);
        let location = locate(&mut self.geolocator, timeout);
        let reading = self
            .context
            .reading
            .unwrap_or_else(|| PulseReading::fallback(&self.config.pulse));
        let photo = CapturedPhoto {
            image,
            f_number: self.context.aperture.f_number(),
            bpm: reading.bpm(),
            taken_at: Utc::now(),
            location,
        };

        self.surface.present_capture(&photo.image);
        self.context.photos.push(photo.clone());
        match self.store.append(&photo) {
            Ok(id) => {
                log::info!("Shot {} saved ({})", id, photo.comment());
                self.context.last_saved = Some(id);
                Ok(())
            }
            Err(err) => {
                log::warn!("Shot kept in memory only: {}", err);
                Err(err.into())
            }
        }
    }

    fn reset(&mut self) {
        log::info!("Resetting session, returning to Initial");
        self.camera.release();
        self.sampler = None;
        self.exposure = None;
        self.context = SessionContext::new(&self.config.aperture);
        self.state = SessionState::Initial;
    }
}
