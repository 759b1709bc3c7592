//! Kokoro Camera - headless session runner
//!
//! Walks one session end to end: set the aperture, measure the pulse (or
//! skip it), take the shots and store them in an album directory.

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;

use kokoro_camera::album::{DirectoryAlbum, PhotoStore};
use kokoro_camera::camera::{Camera, ImageSequenceCamera, SyntheticCamera};
use kokoro_camera::cli::Args;
use kokoro_camera::error::SessionError;
use kokoro_camera::location::{FixedLocation, Geolocator, NoLocation};
use kokoro_camera::pulse::PulseReading;
use kokoro_camera::scheduler::{Clock, FrameLoop, ManualClock, SystemClock};
use kokoro_camera::session::{MeasurePhase, Session, SessionConfig, SessionEvent, SessionState};
use kokoro_camera::surface::{sparkline, RecordingSurface, Surface};

/// Ten minutes of frames at 30 fps
const MAX_TICKS: u64 = 30 * 60 * 10;

/// Width of the printed pulse trace (characters)
const TRACE_CHARS: usize = 64;

/// Keeps the latest pulse trace; optionally records frames to disk
struct DemoSurface {
    recorder: Option<RecordingSurface>,
    trace: Vec<f32>,
}

impl Surface for DemoSurface {
    fn present_preview(&mut self, frame: &RgbaImage) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.present_preview(frame);
        }
    }

    fn present_capture(&mut self, photo: &RgbaImage) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.present_capture(photo);
        }
    }

    fn present_trace(&mut self, trace: &[f32]) {
        self.trace.clear();
        self.trace.extend_from_slice(trace);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Kokoro Camera");
    println!("=============\n");

    let config = args.session_config();
    config.validate()?;

    let mut album = DirectoryAlbum::open(&args.album_dir, config.capture.encoding)
        .with_context(|| format!("Failed to open album {}", args.album_dir.display()))?;

    if args.list {
        return list_album(&album);
    }
    if let Some(id) = args.delete {
        album.delete(id)?;
        println!("Deleted photo {}", id);
        return Ok(());
    }

    match &args.frames_dir {
        Some(dir) => {
            let camera = ImageSequenceCamera::from_dir(dir)?;
            println!(
                "Camera: {} recorded frames from {}",
                camera.frame_count(),
                dir.display()
            );
            run_session(&args, config, camera, album)
        }
        None => {
            println!("Camera: synthetic ({} BPM)", args.synthetic_bpm);
            let camera = SyntheticCamera::new(args.synthetic_scene());
            run_session(&args, config, camera, album)
        }
    }
}

fn list_album(album: &DirectoryAlbum) -> Result<()> {
    let photos = album.list_all()?;
    if photos.is_empty() {
        println!("Album {} is empty", album.root().display());
        return Ok(());
    }

    println!("{} photos in {}", photos.len(), album.root().display());
    for stored in &photos {
        let photo = &stored.photo;
        let location = photo
            .location
            .map(|p| p.to_string())
            .unwrap_or_else(|| "no location".to_string());
        println!(
            "  #{:<4} {}  {:<12} {}x{}  {}",
            stored.id,
            photo.taken_at.format("%Y-%m-%d %H:%M:%S"),
            photo.comment(),
            photo.image.width(),
            photo.image.height(),
            location
        );
    }
    Ok(())
}

/// Print a degraded step and carry on
fn report(result: Result<(), SessionError>) {
    if let Err(err) = result {
        eprintln!("Warning: {}", err);
    }
}

fn run_session<C: Camera>(
    args: &Args,
    config: SessionConfig,
    camera: C,
    album: DirectoryAlbum,
) -> Result<()> {
    let tick_ms = config.capture.tick_interval_ms();
    let clock: Box<dyn Clock> = if args.realtime {
        Box::new(SystemClock::new(tick_ms))
    } else {
        Box::new(ManualClock::new(tick_ms))
    };
    let geolocator: Box<dyn Geolocator> = match args.position() {
        Some(position) => Box::new(FixedLocation(position)),
        None => Box::new(NoLocation),
    };
    let recorder = args
        .record_preview
        .as_ref()
        .map(RecordingSurface::new)
        .transpose()?;
    let surface = DemoSurface {
        recorder,
        trace: Vec::new(),
    };

    let mut frames = FrameLoop::new(clock).with_max_ticks(MAX_TICKS);
    let mut session = Session::new(config, camera, geolocator, album, surface)?;

    // Aperture
    session.process_event(SessionEvent::Start)?;
    if let Some(f_number) = args.f_number {
        session.process_event(SessionEvent::SetAperture(f_number))?;
    } else if let Some(scale) = args.pinch {
        session.process_event(SessionEvent::Pinch(scale))?;
    }
    let aperture = session.context().aperture;
    println!(
        "Aperture: F{} ({})",
        aperture.display_value(),
        aperture.filter(&session.config().aperture)
    );

    // Pulse
    report(session.process_event(SessionEvent::DecideAperture));
    let measuring = |s: &SessionState| {
        matches!(
            s,
            SessionState::PulseMeasurement(MeasurePhase::Measuring { .. })
        )
    };
    if !args.skip_pulse && measuring(&session.state()) {
        println!(
            "Measuring pulse for {:.1} s...",
            session.config().pulse.measurement_ms as f64 / 1000.0
        );
        session.run_until(&mut frames, |s| !measuring(&s.state()))?;
        println!("  {}", sparkline(&session.surface().trace, TRACE_CHARS));
    }

    if session.state() == SessionState::PulseMeasurement(MeasurePhase::Done) {
        report(session.process_event(SessionEvent::ConfirmPulse));
    } else {
        report(session.process_event(SessionEvent::SkipMeasurement));
    }
    match session.context().reading {
        Some(PulseReading::Measured(bpm)) => println!("Pulse: {} BPM", bpm),
        Some(PulseReading::Fallback(bpm)) => println!("Pulse: not measured, using {} BPM", bpm),
        None => {}
    }

    // Capture
    if session.context().facing != args.facing() {
        report(session.process_event(SessionEvent::ToggleFacing));
    }
    for shot in 1..=args.shots {
        session.process_event(SessionEvent::Shutter)?;
        if !session.is_exposing() {
            eprintln!("Warning: shot {} skipped, no camera", shot);
            break;
        }
        report(session.run_until(&mut frames, |s| !s.is_exposing()).map(|_| ()));
    }

    let context = session.context();
    println!("\nTook {} shot(s):", context.photos.len());
    for photo in &context.photos {
        println!(
            "  {}  {}",
            photo.comment(),
            photo
                .location
                .map(|p| p.to_string())
                .unwrap_or_else(|| "no location".to_string())
        );
    }
    println!("Album: {}", session.store().root().display());
    if let Some(recorder) = &session.surface().recorder {
        println!(
            "Recorded {} preview frames to {}",
            recorder.previews_written(),
            recorder.frames_dir().display()
        );
    }
    Ok(())
}
