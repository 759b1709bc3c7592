//! Cooperative frame loop.
//!
//! Everything runs on one thread. Each tick the loop hands the current time
//! to a step function, then waits for the next frame. Cancelling means the
//! step returns [`ControlFlow::Break`] and no further tick is scheduled; a
//! step that is already running is never interrupted.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

/// Time source for the frame loop (milliseconds since the clock started)
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Block (or pretend to) until the next frame is due
    fn wait_next_frame(&mut self);
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn wait_next_frame(&mut self) {
        (**self).wait_next_frame()
    }
}

/// Wall clock paced at a fixed frame interval
pub struct SystemClock {
    start: Instant,
    interval: Duration,
    next_frame: Instant,
}

impl SystemClock {
    pub fn new(interval_ms: u64) -> Self {
        let start = Instant::now();
        let interval = Duration::from_millis(interval_ms.max(1));
        Self {
            start,
            interval,
            next_frame: start + interval,
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn wait_next_frame(&mut self) {
        let now = Instant::now();
        if self.next_frame > now {
            std::thread::sleep(self.next_frame - now);
            self.next_frame += self.interval;
        } else {
            // Fell behind; drop the missed frames instead of bursting
            self.next_frame = now + self.interval;
        }
    }
}

/// Simulated clock that jumps a fixed step per frame
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: u64,
    step_ms: u64,
}

impl ManualClock {
    pub fn new(step_ms: u64) -> Self {
        Self { now_ms: 0, step_ms }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn wait_next_frame(&mut self) {
        self.now_ms += self.step_ms;
    }
}

/// Drives a step function once per frame until it breaks
pub struct FrameLoop<C: Clock> {
    clock: C,
    ticks: u64,
    max_ticks: Option<u64>,
}

impl<C: Clock> FrameLoop<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            ticks: 0,
            max_ticks: None,
        }
    }

    /// Stop scheduling after this many ticks in total
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Run `step` once per frame; returns the number of ticks run by this call
    ///
    /// `step` receives the clock time of its tick.
    pub fn run<F>(&mut self, mut step: F) -> u64
    where
        F: FnMut(u64) -> ControlFlow<()>,
    {
        let first = self.ticks;
        loop {
            if let Some(max) = self.max_ticks {
                if self.ticks >= max {
                    log::warn!("Frame loop stopped at tick limit {}", max);
                    break;
                }
            }

            let now = self.clock.now_ms();
            self.ticks += 1;
            if step(now).is_break() {
                break;
            }
            self.clock.wait_next_frame();
        }
        self.ticks - first
    }

    /// Total ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}
