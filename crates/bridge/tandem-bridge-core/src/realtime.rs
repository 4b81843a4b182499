//! Wall-clock sources, tick scheduling and the catch-up policy used while the
//! bridge runs in real time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Default upper bound on frames executed for a single host tick.
pub const DEFAULT_MAX_CATCH_UP_FRAMES: u32 = 8;

/// Number of frames a real-time tick should execute.
///
/// `round(elapsed / frame)`, at least 1, at most `cap`. Non-finite or negative
/// elapsed time counts as a single frame.
pub fn catch_up_frames(elapsed_ms: f64, frame_ms: f64, cap: u32) -> u32 {
    let cap = cap.max(1);
    if !(elapsed_ms.is_finite() && frame_ms.is_finite() && frame_ms > 0.0) {
        return 1;
    }
    let frames = (elapsed_ms / frame_ms).round();
    if frames <= 1.0 {
        1
    } else if frames >= f64::from(cap) {
        cap
    } else {
        frames as u32
    }
}

/// Source of wall-clock time in milliseconds.
pub trait WallClock {
    fn now_ms(&self) -> f64;
}

/// [`WallClock`] backed by [`Instant`], measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven [`WallClock`] for tests and offline hosts.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Deferred unit of loop work.
pub type TickFn = Box<dyn FnOnce()>;

/// Yielding mechanism used to schedule the next real-time tick.
///
/// `delay_ms` is the wall time until the next frame is due. Implementations
/// must not run `tick` before the host has had a chance to run other work,
/// and timer-backed ones should wait out `delay_ms`.
pub trait TickScheduler {
    fn schedule_tick(&self, delay_ms: f64, tick: TickFn);
}

/// [`TickScheduler`] that queues ticks until the host pumps them.
#[derive(Default)]
pub struct ManualTicker {
    pending: RefCell<VecDeque<TickFn>>,
    last_delay_ms: Cell<Option<f64>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Delay requested by the most recent `schedule_tick`.
    pub fn last_delay_ms(&self) -> Option<f64> {
        self.last_delay_ms.get()
    }

    /// Run the oldest pending tick. Returns `false` when none was queued.
    pub fn run_next(&self) -> bool {
        let next = self.pending.borrow_mut().pop_front();
        match next {
            Some(tick) => {
                tick();
                true
            }
            None => false,
        }
    }

    /// Run up to `max` ticks, including ones scheduled along the way.
    pub fn run_for(&self, max: usize) -> usize {
        let mut ran = 0;
        while ran < max && self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl fmt::Debug for ManualTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTicker")
            .field("pending", &self.pending())
            .finish()
    }
}

impl TickScheduler for ManualTicker {
    fn schedule_tick(&self, delay_ms: f64, tick: TickFn) {
        self.last_delay_ms.set(Some(delay_ms));
        self.pending.borrow_mut().push_back(tick);
    }
}

/// [`WallClock`] on tokio's clock, so a paused test runtime controls it.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

#[cfg(feature = "tokio")]
impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(feature = "tokio")]
impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tokio")]
impl WallClock for TokioClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// [`TickScheduler`] that sleeps on the tokio timer until the next frame is due.
///
/// Ticks are spawned with [`tokio::task::spawn_local`], so the bridge must be
/// started from inside a [`tokio::task::LocalSet`].
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTicker;

#[cfg(feature = "tokio")]
impl TickScheduler for TokioTicker {
    fn schedule_tick(&self, delay_ms: f64, tick: TickFn) {
        let delay = if delay_ms.is_finite() && delay_ms > 0.0 {
            std::time::Duration::from_secs_f64(delay_ms / 1000.0)
        } else {
            std::time::Duration::ZERO
        };
        tokio::task::spawn_local(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            tick();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn catch_up_rounds_and_clamps() {
        let frame = 1000.0 / 60.0;
        assert_eq!(catch_up_frames(0.0, frame, 8), 1);
        assert_eq!(catch_up_frames(frame * 0.4, frame, 8), 1);
        assert_eq!(catch_up_frames(frame * 2.6, frame, 8), 3);
        assert_eq!(catch_up_frames(frame * 20.0, frame, 8), 8);
        assert_eq!(catch_up_frames(-50.0, frame, 8), 1);
        assert_eq!(catch_up_frames(f64::NAN, frame, 8), 1);
        assert_eq!(catch_up_frames(frame * 5.0, frame, 0), 1);
    }

    #[test]
    fn manual_ticker_runs_in_fifo_order() {
        let ticker = ManualTicker::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let o = order.clone();
            ticker.schedule_tick(0.0, Box::new(move || o.borrow_mut().push(i)));
        }
        assert_eq!(ticker.run_for(10), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(!ticker.run_next());
    }

    #[test]
    fn manual_ticker_remembers_requested_delay() {
        let ticker = ManualTicker::new();
        assert_eq!(ticker.last_delay_ms(), None);
        ticker.schedule_tick(12.5, Box::new(|| {}));
        assert_eq!(ticker.last_delay_ms(), Some(12.5));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(5.0);
        clock.advance(10.0);
        assert_eq!(clock.now_ms(), 15.0);
        clock.set(1.0);
        assert_eq!(clock.now_ms(), 1.0);
    }
}
