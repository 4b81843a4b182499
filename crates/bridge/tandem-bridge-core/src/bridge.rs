//! The bridge: one virtual clock driving every subscriber in a fixed order.
//!
//! Frame order (per simulated frame):
//!   advance clock -> BeforeUpdate hooks -> queued frame callbacks
//!   -> Update hooks -> attached ticker -> AfterUpdate hooks
//!
//! Entry points:
//! - `step(n)`: synchronous, deterministic; ignores run/pause state.
//! - `render_frames(count, progress)`: export path; awaits `progress` after
//!   every frame before starting the next one.
//! - `start()/stop()/pause()/resume()`: real-time loop with bounded catch-up.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::callbacks::{CallbackId, CallbackQueue, FrameCallback};
use crate::clock::{FrameInfo, VirtualClock};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::hooks::{HookHandle, HookPipeline, HookSet};
use crate::host::{FrameHost, Interception};
use crate::realtime::{catch_up_frames, ManualTicker, SystemClock, TickScheduler, WallClock};

/// A renderer-owned ticker the bridge can drive in place of its own loop.
pub trait ExternalTicker {
    /// Advance by `normalized_delta` frames of the baseline rate.
    fn update(&self, normalized_delta: f64) -> anyhow::Result<()>;
    /// Halt the ticker's own real-time loop.
    fn stop(&self) {}
    /// Resume the ticker's own real-time loop.
    fn start(&self) {}
}

/// Per-frame continuation awaited by [`Bridge::render_frames`].
#[allow(async_fn_in_trait)]
pub trait FrameProgress {
    /// Called after frame `index` (1-based) has been fully rendered.
    async fn on_frame(&mut self, index: u32, frame: FrameInfo) -> anyhow::Result<()>;
}

/// Adapts a closure returning a future into a [`FrameProgress`].
pub struct ProgressFn<F>(pub F);

impl<F, Fut> FrameProgress for ProgressFn<F>
where
    F: FnMut(u32, FrameInfo) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    async fn on_frame(&mut self, index: u32, frame: FrameInfo) -> anyhow::Result<()> {
        (self.0)(index, frame).await
    }
}

/// Progress sink that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl FrameProgress for NoProgress {
    async fn on_frame(&mut self, _index: u32, _frame: FrameInfo) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Host services the bridge depends on.
#[derive(Clone)]
pub struct BridgeEnv {
    /// Host whose frame primitive gets intercepted.
    pub host: Rc<FrameHost>,
    /// Wall clock for the real-time catch-up policy.
    pub wall: Rc<dyn WallClock>,
    /// Yielding mechanism between real-time ticks.
    pub ticker: Rc<dyn TickScheduler>,
}

impl BridgeEnv {
    pub fn new(host: Rc<FrameHost>, wall: Rc<dyn WallClock>, ticker: Rc<dyn TickScheduler>) -> Self {
        Self { host, wall, ticker }
    }

    /// Environment without a real host: a native queue nobody pumps, the
    /// system clock, and a manual ticker. Suited to export and tests that
    /// only call `step`/`render_frames`.
    pub fn offline() -> Self {
        let (host, _native) = FrameHost::with_native_queue();
        Self::offline_with_host(host)
    }

    /// Like [`offline`](Self::offline) but intercepting an existing host.
    pub fn offline_with_host(host: Rc<FrameHost>) -> Self {
        Self {
            host,
            wall: Rc::new(SystemClock::new()),
            ticker: Rc::new(ManualTicker::new()),
        }
    }
}

impl fmt::Debug for BridgeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeEnv").field("host", &self.host).finish()
    }
}

struct AttachedTicker {
    ticker: Rc<dyn ExternalTicker>,
    auto_stop: bool,
}

struct BridgeInner {
    config: BridgeConfig,
    clock: RefCell<VirtualClock>,
    queue: Rc<CallbackQueue>,
    hooks: HookPipeline,
    attached: RefCell<Option<AttachedTicker>>,
    host: Rc<FrameHost>,
    interception: RefCell<Option<Interception>>,
    wall: Rc<dyn WallClock>,
    ticker: Rc<dyn TickScheduler>,
    running: Cell<bool>,
    paused: Cell<bool>,
    /// Bumped on every `start`; ticks from older loops exit on sight.
    generation: Cell<u64>,
    last_real_ms: Cell<Option<f64>>,
}

/// Virtual master clock and scheduler.
///
/// `Bridge` is a cheap handle; clones share one timeline. The host frame
/// primitive stays intercepted until [`destroy`](Self::destroy) is called or
/// the last handle is dropped.
#[derive(Clone)]
pub struct Bridge {
    inner: Rc<BridgeInner>,
}

impl Bridge {
    /// Build a bridge and take over `env.host`'s frame primitive.
    pub fn new(config: BridgeConfig, env: BridgeEnv) -> Self {
        let queue = Rc::new(CallbackQueue::new());
        let interception = env.host.intercept(queue.clone());
        let bridge = Self {
            inner: Rc::new(BridgeInner {
                clock: RefCell::new(VirtualClock::new(config.fps)),
                queue,
                hooks: HookPipeline::new(),
                attached: RefCell::new(None),
                host: env.host,
                interception: RefCell::new(Some(interception)),
                wall: env.wall,
                ticker: env.ticker,
                running: Cell::new(false),
                paused: Cell::new(true),
                generation: Cell::new(0),
                last_real_ms: Cell::new(None),
                config,
            }),
        };
        if bridge.inner.config.auto_start {
            bridge.start();
        }
        bridge
    }

    /// Bridge over [`BridgeEnv::offline`].
    pub fn offline(config: BridgeConfig) -> Self {
        Self::new(config, BridgeEnv::offline())
    }

    /// Change the frame rate for later steps. Malformed input clamps to 1.
    pub fn set_frame_rate(&self, fps: f64) -> f64 {
        self.inner.clock.borrow_mut().set_frame_rate(fps)
    }

    pub fn fps(&self) -> f64 {
        self.inner.clock.borrow().fps()
    }

    /// Current simulation time in milliseconds.
    pub fn time(&self) -> f64 {
        self.inner.clock.borrow().now()
    }

    pub fn now(&self) -> f64 {
        self.time()
    }

    pub fn frame(&self) -> u64 {
        self.inner.clock.borrow().frame()
    }

    pub fn frame_duration(&self) -> f64 {
        self.inner.clock.borrow().frame_duration()
    }

    /// Frame duration relative to the configured baseline rate.
    pub fn normalized_delta(&self) -> f64 {
        self.inner
            .clock
            .borrow()
            .normalized_delta(self.inner.config.normalized_baseline_fps)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn subscribe(
        &self,
        set: HookSet,
        hook: impl FnMut(FrameInfo) -> anyhow::Result<()> + 'static,
    ) -> HookHandle {
        self.inner.hooks.subscribe(set, hook)
    }

    /// Subscribe by set name (`onBeforeUpdate`, `onUpdate`, `onAfterUpdate`).
    pub fn subscribe_by_name(
        &self,
        name: &str,
        hook: impl FnMut(FrameInfo) -> anyhow::Result<()> + 'static,
    ) -> Result<HookHandle, BridgeError> {
        let set: HookSet = name.parse()?;
        Ok(self.subscribe(set, hook))
    }

    pub fn on_before_update(
        &self,
        hook: impl FnMut(FrameInfo) -> anyhow::Result<()> + 'static,
    ) -> HookHandle {
        self.subscribe(HookSet::BeforeUpdate, hook)
    }

    pub fn on_update(
        &self,
        hook: impl FnMut(FrameInfo) -> anyhow::Result<()> + 'static,
    ) -> HookHandle {
        self.subscribe(HookSet::Update, hook)
    }

    pub fn on_after_update(
        &self,
        hook: impl FnMut(FrameInfo) -> anyhow::Result<()> + 'static,
    ) -> HookHandle {
        self.subscribe(HookSet::AfterUpdate, hook)
    }

    pub fn unsubscribe(&self, handle: HookHandle) -> bool {
        self.inner.hooks.unsubscribe(handle)
    }

    pub fn subscriber_count(&self, set: HookSet) -> usize {
        self.inner.hooks.len(set)
    }

    /// Schedule a one-shot callback on the bridge's queue directly.
    pub fn request_frame(
        &self,
        callback: impl FnOnce(f64) -> anyhow::Result<()> + 'static,
    ) -> CallbackId {
        let boxed: FrameCallback = Box::new(callback);
        self.inner.queue.schedule(boxed)
    }

    pub fn cancel_frame(&self, id: CallbackId) -> bool {
        self.inner.queue.cancel(id)
    }

    pub fn pending_callbacks(&self) -> usize {
        self.inner.queue.len()
    }

    /// The host this bridge intercepts.
    pub fn host(&self) -> &Rc<FrameHost> {
        &self.inner.host
    }

    /// True until [`destroy`](Self::destroy) hands the host primitive back.
    pub fn is_intercepting(&self) -> bool {
        self.inner.interception.borrow().is_some()
    }

    /// Drive `ticker` after the Update hooks of every frame.
    ///
    /// With `auto_stop` the ticker's own loop is stopped now and restarted on
    /// [`detach_ticker`](Self::detach_ticker).
    pub fn attach_ticker(
        &self,
        ticker: Rc<dyn ExternalTicker>,
        auto_stop: bool,
    ) -> Result<(), BridgeError> {
        let mut slot = self.inner.attached.borrow_mut();
        if slot.is_some() {
            return Err(BridgeError::TickerAlreadyAttached);
        }
        if auto_stop {
            ticker.stop();
        }
        *slot = Some(AttachedTicker { ticker, auto_stop });
        Ok(())
    }

    /// Detach the current ticker. Returns `false` when none was attached.
    pub fn detach_ticker(&self) -> bool {
        let attached = self.inner.attached.borrow_mut().take();
        match attached {
            Some(AttachedTicker { ticker, auto_stop }) => {
                if auto_stop {
                    ticker.start();
                }
                true
            }
            None => false,
        }
    }

    /// Start the real-time loop. No-op while already running.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.running.get() {
            return;
        }
        inner.running.set(true);
        inner.paused.set(false);
        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);
        inner.last_real_ms.set(Some(inner.wall.now_ms()));
        log::debug!("bridge loop started (generation {generation})");
        self.loop_tick(generation);
    }

    pub fn stop(&self) {
        if self.inner.running.replace(false) {
            log::debug!("bridge loop stopped at frame {}", self.frame());
        }
        self.inner.paused.set(true);
    }

    pub fn pause(&self) {
        self.inner.paused.set(true);
    }

    /// Resume real-time stepping, starting the loop if needed. Wall time spent
    /// paused is not caught up.
    pub fn resume(&self) {
        if !self.inner.running.get() {
            self.start();
            return;
        }
        self.inner.last_real_ms.set(Some(self.inner.wall.now_ms()));
        self.inner.paused.set(false);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.get()
    }

    /// One host-driven tick: execute as many frames as the elapsed wall time
    /// calls for, bounded by `max_catch_up_frames`. Does nothing unless running
    /// and not paused. Returns the number of frames executed.
    pub fn tick(&self) -> u32 {
        let inner = &self.inner;
        if !inner.running.get() || inner.paused.get() {
            return 0;
        }
        let now = inner.wall.now_ms();
        let elapsed = now - inner.last_real_ms.get().unwrap_or(now);
        inner.last_real_ms.set(Some(now));

        let frames = catch_up_frames(
            elapsed,
            self.frame_duration(),
            inner.config.max_catch_up_frames,
        );
        self.step(frames);
        frames
    }

    fn loop_tick(&self, generation: u64) {
        if !self.is_current_loop(generation) {
            return;
        }
        self.tick();
        if self.is_current_loop(generation) {
            let weak: Weak<BridgeInner> = Rc::downgrade(&self.inner);
            let delay_ms = self.next_tick_delay();
            self.inner.ticker.schedule_tick(delay_ms, Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Bridge { inner }.loop_tick(generation);
                }
            }));
        }
    }

    /// Wall time until the next frame is due; a full frame while paused.
    fn next_tick_delay(&self) -> f64 {
        let inner = &self.inner;
        let frame = self.frame_duration();
        match inner.last_real_ms.get() {
            Some(last) if !inner.paused.get() => {
                (frame - (inner.wall.now_ms() - last)).clamp(0.0, frame)
            }
            _ => frame,
        }
    }

    fn is_current_loop(&self, generation: u64) -> bool {
        self.inner.running.get() && self.inner.generation.get() == generation
    }

    /// Execute exactly `frames` simulated frames, whatever the loop state.
    /// Returns the last frame's info (or the current state for `frames == 0`).
    pub fn step(&self, frames: u32) -> FrameInfo {
        let mut last = self.current_frame();
        for _ in 0..frames {
            last = self.render_frame();
        }
        last
    }

    /// Execute `count` frames, awaiting `progress` after each one before the
    /// next frame starts. Simulated time advances by exactly
    /// `count * frame_duration` no matter how long `progress` takes.
    ///
    /// A progress failure stops the pass; frames already rendered stay rendered.
    pub async fn render_frames<P: FrameProgress>(
        &self,
        count: u32,
        progress: &mut P,
    ) -> Result<u32, BridgeError> {
        for index in 1..=count {
            let info = self.render_frame();
            progress
                .on_frame(index, info)
                .await
                .map_err(|err| BridgeError::progress(index, err))?;
        }
        Ok(count)
    }

    /// Frame index, time and frame duration as of the last completed step.
    pub fn current_frame(&self) -> FrameInfo {
        let clock = self.inner.clock.borrow();
        FrameInfo {
            frame: clock.frame(),
            time_ms: clock.now(),
            delta_ms: clock.frame_duration(),
        }
    }

    fn render_frame(&self) -> FrameInfo {
        let inner = &self.inner;
        let info = inner.clock.borrow_mut().advance();

        inner.hooks.run(HookSet::BeforeUpdate, info);

        // Library callbacks queued through the host primitive (one-shot).
        inner.queue.drain(info.time_ms);

        inner.hooks.run(HookSet::Update, info);

        let attached = inner
            .attached
            .borrow()
            .as_ref()
            .map(|a| Rc::clone(&a.ticker));
        if let Some(ticker) = attached {
            if let Err(err) = ticker.update(self.normalized_delta()) {
                log::error!("attached ticker failed at frame {}: {err:#}", info.frame);
            }
        }

        inner.hooks.run(HookSet::AfterUpdate, info);
        info
    }

    /// Stop the loop, give the host its original frame primitive back and
    /// drop every subscription, queued callback and attached ticker.
    pub fn destroy(&self) {
        self.stop();
        let interception = self.inner.interception.borrow_mut().take();
        if let Some(mut interception) = interception {
            interception.release();
        }
        self.inner.hooks.clear();
        self.inner.queue.clear();
        self.detach_ticker();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("frame", &self.frame())
            .field("time_ms", &self.time())
            .field("fps", &self.fps())
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("hooks", &self.inner.hooks)
            .field("queue", &self.inner.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ManualClock;

    struct FlagTicker {
        updates: RefCell<Vec<f64>>,
        running: Cell<bool>,
    }

    impl ExternalTicker for FlagTicker {
        fn update(&self, normalized_delta: f64) -> anyhow::Result<()> {
            self.updates.borrow_mut().push(normalized_delta);
            Ok(())
        }
        fn stop(&self) {
            self.running.set(false);
        }
        fn start(&self) {
            self.running.set(true);
        }
    }

    #[test]
    fn step_zero_reports_current_state() {
        let bridge = Bridge::offline(BridgeConfig::default());
        let info = bridge.step(0);
        assert_eq!(info.frame, 0);
        assert_eq!(info.time_ms, 0.0);
    }

    #[test]
    fn attached_ticker_is_stopped_driven_and_restarted() {
        let bridge = Bridge::offline(BridgeConfig::with_fps(30.0));
        let ticker = Rc::new(FlagTicker {
            updates: RefCell::new(Vec::new()),
            running: Cell::new(true),
        });
        bridge.attach_ticker(ticker.clone(), true).expect("attach");
        assert!(!ticker.running.get());
        assert!(matches!(
            bridge.attach_ticker(ticker.clone(), false),
            Err(BridgeError::TickerAlreadyAttached)
        ));

        bridge.step(2);
        assert_eq!(ticker.updates.borrow().len(), 2);
        assert!((ticker.updates.borrow()[0] - 2.0).abs() < 1e-9);

        assert!(bridge.detach_ticker());
        assert!(ticker.running.get());
        assert!(!bridge.detach_ticker());
    }

    #[test]
    fn pause_keeps_timeline_and_resume_does_not_catch_up_pause() {
        let wall = Rc::new(ManualClock::new(0.0));
        let ticker = Rc::new(ManualTicker::new());
        let (host, _native) = FrameHost::with_native_queue();
        let bridge = Bridge::new(
            BridgeConfig::default(),
            BridgeEnv::new(host, wall.clone(), ticker.clone()),
        );
        bridge.start();
        assert_eq!(bridge.frame(), 1);

        bridge.pause();
        wall.advance(1000.0);
        ticker.run_next();
        assert_eq!(bridge.frame(), 1, "paused ticks must not step");
        assert!(bridge.is_running());

        bridge.resume();
        wall.advance(bridge.frame_duration());
        ticker.run_next();
        assert_eq!(bridge.frame(), 2);
    }

    #[test]
    fn stale_tick_from_previous_loop_exits() {
        let wall = Rc::new(ManualClock::new(0.0));
        let ticker = Rc::new(ManualTicker::new());
        let (host, _native) = FrameHost::with_native_queue();
        let bridge = Bridge::new(
            BridgeConfig::default(),
            BridgeEnv::new(host, wall, ticker.clone()),
        );
        bridge.start();
        bridge.stop();
        bridge.start();
        assert_eq!(ticker.pending(), 2);
        ticker.run_for(2);
        assert_eq!(ticker.pending(), 1, "only the live loop reschedules");
    }

    #[test]
    fn auto_start_runs_first_tick() {
        let config = BridgeConfig {
            auto_start: true,
            ..BridgeConfig::default()
        };
        let bridge = Bridge::offline(config);
        assert!(bridge.is_running());
        assert_eq!(bridge.frame(), 1);
    }
}
