//! Render coordination on top of a [`Bridge`].
//!
//! Per frame, driven by two bridge hooks:
//! - `BeforeUpdate`: fallback replay of logged tertiary events for `(prev, t]`
//! - `Update`: scene render -> stage tick -> sprite updaters -> tertiary drive,
//!   then mark `t` as synced
//!
//! Renderer faults are logged, kept in a bounded error log for
//! [`RenderCoordinator::audit`] and never abort the frame. Lifecycle notes
//! (controllability, fallback switches, exports) go to an activity log that
//! the audit tails.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tandem_bridge::{Bridge, BridgeConfig, BridgeEnv, ExternalTicker, FrameInfo, HookHandle};

use crate::audio::{AudioAnalyser, AudioBeat, AudioReactiveOptions, AudioReactor};
use crate::color::parse_color;
use crate::config::{EngineConfig, Viewport, SKIP_TERTIARY_ENV};
use crate::controllability::Controllability;
use crate::diagnostics::{ActivityLog, AuditReport, ErrorLog, AUDIT_LOG_ENTRIES};
use crate::effects::{EffectHandle, EffectKind, EffectOptions, EffectRegistry};
use crate::error::EngineError;
use crate::events::{BurstOptions, TertiaryEvent};
use crate::export::{ExportSummary, FrameSink, SinkProgress};
use crate::renderers::{
    EmitterOptions, MeshOptions, Renderers, SceneRenderer, SpriteStage, TertiaryModule,
    DEFAULT_MESH_COLOR,
};
use crate::replay::FallbackReplayer;

/// Per-frame 2D updater; receives the normalized delta.
pub type SpriteUpdaterFn = dyn FnMut(f64) -> anyhow::Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdaterId(u64);

type SharedUpdater = Rc<RefCell<Box<SpriteUpdaterFn>>>;

struct CoordinatorState {
    replayer: FallbackReplayer,
    effects: EffectRegistry,
    rng: StdRng,
    viewport: Viewport,
    errors: ErrorLog,
    activity: ActivityLog,
    updaters: IndexMap<u64, SharedUpdater>,
    next_updater: u64,
    audio: Option<HookHandle>,
}

/// Everything the bridge hooks need; shared between the hooks and the
/// coordinator handle.
struct Shared {
    scene: Rc<dyn SceneRenderer>,
    stage: Rc<dyn SpriteStage>,
    stage_ticker: Option<Rc<dyn ExternalTicker>>,
    tertiary: Option<Rc<dyn TertiaryModule>>,
    controllability: Controllability,
    headless: bool,
    baseline_fps: f64,
    placement_jitter: f64,
    state: RefCell<CoordinatorState>,
}

impl Shared {
    fn record_error(&self, context: &str, at: &FrameInfo, err: &anyhow::Error) {
        let mut state = self.state.borrow_mut();
        state.errors.record(context, at.frame, at.time_ms, err);
        state.activity.keep(
            log::Level::Error,
            at.frame,
            at.time_ms,
            format!("{context} failed: {err:#}"),
        );
    }

    fn note(&self, level: log::Level, at: &FrameInfo, message: String) {
        self.state
            .borrow_mut()
            .activity
            .note(level, at.frame, at.time_ms, message);
    }

    fn before_update(&self, info: &FrameInfo) {
        let due = self.state.borrow_mut().replayer.take_due(info.time_ms);
        for event in due {
            log::debug!(
                "replaying tertiary event from {} ms at frame {}",
                event.time_ms,
                info.frame
            );
            let options = event.options.emitter_options();
            // Failures land in the error log.
            let _ = self.spawn_sprite(info, event.x, event.y, &options, "replay.spawn");
        }
    }

    fn update(&self, info: &FrameInfo) {
        if let Err(err) = self.scene.render(info) {
            self.record_error("scene.render", info, &err);
        }

        let delta = info.normalized_delta(self.baseline_fps);
        if let Some(ticker) = &self.stage_ticker {
            if let Err(err) = ticker.update(delta) {
                self.record_error("stage.tick", info, &err);
            }
        }

        let updaters: Vec<SharedUpdater> = self.state.borrow().updaters.values().cloned().collect();
        for updater in updaters {
            let Ok(mut body) = updater.try_borrow_mut() else {
                continue;
            };
            if let Err(err) = (*body)(delta) {
                self.record_error("sprite.updater", info, &err);
            }
        }

        if let Some(drive) = self.controllability.drive_fn() {
            if let Err(err) = drive(info.time_ms) {
                self.record_error("tertiary.drive", info, &err);
            }
        }

        self.state.borrow_mut().replayer.mark_synced(info.time_ms);
    }

    fn spawn_sprite(
        &self,
        at: &FrameInfo,
        x: f64,
        y: f64,
        options: &EmitterOptions,
        context: &'static str,
    ) -> Result<EffectHandle, EngineError> {
        match self.stage.spawn_emitter(x, y, options) {
            Ok(node) => Ok(self.state.borrow_mut().effects.insert(EffectKind::Sprite, node)),
            Err(err) => {
                self.record_error(context, at, &err);
                Err(EngineError::renderer(context, err))
            }
        }
    }

    fn tertiary_burst(
        &self,
        at: &FrameInfo,
        x: f64,
        y: f64,
        options: BurstOptions,
    ) -> Result<Option<EffectHandle>, EngineError> {
        let Some(module) = &self.tertiary else {
            let fallback = self.state.borrow().replayer.is_enabled();
            if self.headless || fallback {
                self.note(
                    log::Level::Info,
                    at,
                    format!("tertiary engine unavailable; spawning substitute emitter at ({x}, {y})"),
                );
                let handle =
                    self.spawn_sprite(at, x, y, &options.emitter_options(), "tertiary.substitute")?;
                return Ok(Some(handle));
            }
            self.note(
                log::Level::Warn,
                at,
                "tertiary burst dropped: engine not loaded and fallback disabled".to_string(),
            );
            return Ok(None);
        };

        let node = match module.burst(x, y, &options) {
            Ok(node) => node,
            Err(err) => {
                self.record_error("tertiary.burst", at, &err);
                return Err(EngineError::renderer("tertiary.burst", err));
            }
        };
        let mut state = self.state.borrow_mut();
        state.replayer.record(TertiaryEvent {
            time_ms: at.time_ms,
            x,
            y,
            options,
        });
        Ok(Some(state.effects.insert(EffectKind::Tertiary, node)))
    }

    /// Random point around the viewport centre, unless given.
    fn place(&self, x: Option<f64>, y: Option<f64>) -> (f64, f64) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let (cx, cy) = state.viewport.center();
        let jitter = self.placement_jitter;
        let x = x.unwrap_or_else(|| cx + (state.rng.gen::<f64>() - 0.5) * jitter);
        let y = y.unwrap_or_else(|| cy + (state.rng.gen::<f64>() - 0.5) * jitter);
        (x, y)
    }
}

/// Drives a 3D scene, a 2D stage and an optional tertiary engine from one
/// bridge, and reconstructs tertiary effects when that engine cannot be
/// driven deterministically.
pub struct RenderCoordinator {
    bridge: Bridge,
    shared: Rc<Shared>,
    hooks: RefCell<Vec<HookHandle>>,
    destroyed: Cell<bool>,
}

impl RenderCoordinator {
    /// Build a bridge over `env`, load the tertiary module once and install
    /// the frame hooks.
    ///
    /// Fails with [`EngineError::NonConformingRenderer`] when the stage has no
    /// ticker and `config.require_stage_ticker` is set.
    pub fn new(
        config: EngineConfig,
        env: BridgeEnv,
        renderers: Renderers,
    ) -> Result<Self, EngineError> {
        let Renderers {
            scene,
            stage,
            loader,
            headless,
        } = renderers;

        let stage_ticker = stage.ticker();
        if stage_ticker.is_none() && config.require_stage_ticker {
            return Err(EngineError::NonConformingRenderer {
                renderer: "sprite stage",
                reason: "no ticker to drive in lockstep",
            });
        }

        let mut errors = ErrorLog::new(config.error_log_capacity);
        let mut activity = ActivityLog::new(config.activity_log_capacity);
        let tertiary = if config.skip_tertiary {
            activity.note(
                log::Level::Info,
                0,
                0.0,
                format!("tertiary engine skipped ({SKIP_TERTIARY_ENV})"),
            );
            None
        } else {
            match loader.map(|l| l.load()) {
                None => None,
                Some(Ok(module)) => module,
                Some(Err(err)) => {
                    activity.note(
                        log::Level::Warn,
                        0,
                        0.0,
                        format!("tertiary engine failed to load; continuing without it: {err:#}"),
                    );
                    errors.record("tertiary.load", 0, 0.0, &err);
                    None
                }
            }
        };

        let controllability = Controllability::detect(tertiary.as_deref());
        let decision = match &controllability {
            Controllability::Controlled { entry_point, .. } => {
                format!("tertiary engine controlled via {entry_point}")
            }
            Controllability::Uncontrolled => format!(
                "tertiary engine not controllable (loaded: {}); fallback replay available",
                tertiary.is_some()
            ),
        };
        activity.note(log::Level::Info, 0, 0.0, decision);

        let bridge = Bridge::new(
            BridgeConfig {
                auto_start: false,
                ..config.bridge.clone()
            },
            env,
        );
        if let Some(ticker) = &stage_ticker {
            ticker.stop();
        }

        let shared = Rc::new(Shared {
            scene,
            stage,
            stage_ticker,
            tertiary,
            controllability,
            headless: headless || config.skip_tertiary,
            baseline_fps: config.bridge.normalized_baseline_fps,
            placement_jitter: config.placement_jitter,
            state: RefCell::new(CoordinatorState {
                replayer: FallbackReplayer::new(config.event_log_capacity),
                effects: EffectRegistry::default(),
                rng: StdRng::seed_from_u64(config.seed),
                viewport: config.viewport.clamped(),
                errors,
                activity,
                updaters: IndexMap::new(),
                next_updater: 0,
                audio: None,
            }),
        });

        let before = Rc::clone(&shared);
        let replay_hook = bridge.on_before_update(move |info| {
            before.before_update(&info);
            Ok(())
        });
        let frame = Rc::clone(&shared);
        let render_hook = bridge.on_update(move |info| {
            frame.update(&info);
            Ok(())
        });

        let coordinator = Self {
            bridge,
            shared,
            hooks: RefCell::new(vec![replay_hook, render_hook]),
            destroyed: Cell::new(false),
        };
        if config.bridge.auto_start {
            coordinator.bridge.start();
        }
        Ok(coordinator)
    }

    /// Coordinator over no-op renderers and an offline bridge.
    pub fn headless(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(config, BridgeEnv::offline(), Renderers::headless())
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn controllability(&self) -> &Controllability {
        &self.shared.controllability
    }

    pub fn is_controlled(&self) -> bool {
        self.shared.controllability.is_controlled()
    }

    pub fn is_headless(&self) -> bool {
        self.shared.headless
    }

    pub fn has_tertiary(&self) -> bool {
        self.shared.tertiary.is_some()
    }

    pub fn enable_fallback(&self, enabled: bool) {
        let changed = self.shared.state.borrow_mut().replayer.set_enabled(enabled);
        if changed {
            let state = if enabled { "enabled" } else { "disabled" };
            self.note(log::Level::Info, format!("fallback replay {state}"));
        }
    }

    pub fn fallback_enabled(&self) -> bool {
        self.shared.state.borrow().replayer.is_enabled()
    }

    /// Log a tertiary event without triggering the tertiary engine.
    pub fn record_event(&self, event: TertiaryEvent) {
        self.shared.state.borrow_mut().replayer.record(event);
    }

    pub fn record_event_at(&self, time_ms: f64, x: f64, y: f64, options: BurstOptions) {
        self.record_event(TertiaryEvent {
            time_ms,
            x,
            y,
            options,
        });
    }

    pub fn event_log_len(&self) -> usize {
        self.shared.state.borrow().replayer.log().len()
    }

    pub fn logged_events(&self) -> Vec<TertiaryEvent> {
        self.shared
            .state
            .borrow()
            .replayer
            .log()
            .iter()
            .cloned()
            .collect()
    }

    /// Add a mesh at a random position near the scene origin.
    pub fn add_scene_mesh(&self, color: Option<u32>) -> Result<EffectHandle, EngineError> {
        let position = {
            let mut state = self.shared.state.borrow_mut();
            let mut axis = || (state.rng.gen::<f64>() - 0.5) * 1.5;
            [axis(), axis(), axis()]
        };
        let options = MeshOptions {
            color: color.unwrap_or(DEFAULT_MESH_COLOR),
            position,
        };
        match self.shared.scene.add_mesh(&options) {
            Ok(node) => Ok(self
                .shared
                .state
                .borrow_mut()
                .effects
                .insert(EffectKind::Scene, node)),
            Err(err) => {
                self.shared
                    .record_error("scene.add_mesh", &self.bridge.current_frame(), &err);
                Err(EngineError::renderer("scene.add_mesh", err))
            }
        }
    }

    pub fn add_sprite_emitter(
        &self,
        x: f64,
        y: f64,
        options: EmitterOptions,
    ) -> Result<EffectHandle, EngineError> {
        self.shared.spawn_sprite(
            &self.bridge.current_frame(),
            x,
            y,
            &options,
            "stage.spawn_emitter",
        )
    }

    /// Trigger a tertiary burst at the current simulation time.
    ///
    /// With the engine loaded, the burst plays live and is logged for later
    /// replay. Without it, a substitute emitter is spawned when headless or in
    /// fallback mode; otherwise the burst is dropped and `Ok(None)` returned.
    pub fn add_tertiary_burst(
        &self,
        x: f64,
        y: f64,
        options: BurstOptions,
    ) -> Result<Option<EffectHandle>, EngineError> {
        self.shared
            .tertiary_burst(&self.bridge.current_frame(), x, y, options)
    }

    /// Add `n` effects of `kind`; returns the live count of that kind.
    pub fn add_effect(
        &self,
        kind: EffectKind,
        n: usize,
        options: &EffectOptions,
    ) -> Result<usize, EngineError> {
        for _ in 0..n {
            match kind {
                EffectKind::Scene => {
                    self.add_scene_mesh(options.color.as_ref().and_then(|c| c.to_rgb()))?;
                }
                EffectKind::Sprite => {
                    let (x, y) = self.shared.place(options.x, options.y);
                    let emitter = EmitterOptions {
                        color: parse_color(options.color.as_ref()),
                        ..EmitterOptions::default()
                    };
                    self.add_sprite_emitter(x, y, emitter)?;
                }
                EffectKind::Tertiary => {
                    let (x, y) = self.shared.place(options.x, options.y);
                    self.add_tertiary_burst(x, y, options.burst.clone())?;
                }
            }
        }
        Ok(self.effect_count(kind))
    }

    /// Remove the `n` most recent effects of `kind`; returns the live count.
    pub fn remove_effect(&self, kind: EffectKind, n: usize) -> usize {
        let at = self.bridge.current_frame();
        for _ in 0..n {
            let Some(handle) = self.shared.state.borrow_mut().effects.pop(kind) else {
                break;
            };
            let (context, result) = match kind {
                EffectKind::Scene => ("scene.remove_mesh", self.shared.scene.remove_mesh(handle.node)),
                EffectKind::Sprite => (
                    "stage.remove_emitter",
                    self.shared.stage.remove_emitter(handle.node),
                ),
                EffectKind::Tertiary => match &self.shared.tertiary {
                    Some(module) => ("tertiary.stop", module.stop(handle.node)),
                    None => ("tertiary.stop", Ok(())),
                },
            };
            if let Err(err) = result {
                self.shared.record_error(context, &at, &err);
            }
        }
        self.effect_count(kind)
    }

    /// Remove every effect of `kind`, or of all kinds. Resetting everything
    /// also clears the event log.
    pub fn reset_effects(&self, kind: Option<EffectKind>) {
        let kinds: Vec<EffectKind> = match kind {
            Some(kind) => vec![kind],
            None => EffectKind::ALL.to_vec(),
        };
        for kind in kinds {
            self.remove_effect(kind, self.effect_count(kind));
        }
        if kind.is_none() {
            self.shared.state.borrow_mut().replayer.clear();
        }
    }

    pub fn effect_count(&self, kind: EffectKind) -> usize {
        self.shared.state.borrow().effects.count(kind)
    }

    pub fn add_sprite_updater(
        &self,
        updater: impl FnMut(f64) -> anyhow::Result<()> + 'static,
    ) -> UpdaterId {
        let mut state = self.shared.state.borrow_mut();
        state.next_updater += 1;
        let id = state.next_updater;
        let boxed: Box<SpriteUpdaterFn> = Box::new(updater);
        state.updaters.insert(id, Rc::new(RefCell::new(boxed)));
        UpdaterId(id)
    }

    pub fn remove_sprite_updater(&self, id: UpdaterId) -> bool {
        self.shared
            .state
            .borrow_mut()
            .updaters
            .shift_remove(&id.0)
            .is_some()
    }

    /// Resize both renderers. Dimensions are clamped to at least 1.
    pub fn resize(&self, viewport: Viewport) -> Viewport {
        let viewport = viewport.clamped();
        let at = self.bridge.current_frame();
        if let Err(err) = self.shared.scene.resize(viewport) {
            self.shared.record_error("scene.resize", &at, &err);
        }
        if let Err(err) = self.shared.stage.resize(viewport) {
            self.shared.record_error("stage.resize", &at, &err);
        }
        self.shared.state.borrow_mut().viewport = viewport;
        viewport
    }

    pub fn viewport(&self) -> Viewport {
        self.shared.state.borrow().viewport
    }

    pub fn audit(&self) -> AuditReport {
        let state = self.shared.state.borrow();
        let log = state.replayer.log();
        AuditReport {
            counts: state.effects.counts(),
            controlled: self.is_controlled(),
            entry_point: self.shared.controllability.entry_point().map(str::to_string),
            fallback_enabled: state.replayer.is_enabled(),
            headless: self.shared.headless,
            event_log_len: log.len(),
            events_dropped: log.dropped(),
            frame: self.bridge.frame(),
            time_ms: self.bridge.time(),
            errors: state.errors.recent(),
            logs: state.activity.recent(AUDIT_LOG_ENTRIES),
        }
    }

    /// Record an activity note stamped with the current frame.
    fn note(&self, level: log::Level, message: String) {
        self.shared.note(level, &self.bridge.current_frame(), message);
    }

    /// Render `frames` frames deterministically into `sink`.
    ///
    /// A live real-time loop is stopped for the pass and restarted afterwards,
    /// so only the export advances the clock. Fallback replay is forced on
    /// when the tertiary engine is not controllable. Both are restored on
    /// success and on failure.
    pub async fn export_video<S: FrameSink>(
        &self,
        frames: u32,
        sink: &mut S,
    ) -> Result<ExportSummary, EngineError> {
        let live = self.bridge.is_running() && !self.bridge.is_paused();
        if live {
            self.bridge.stop();
        }
        let prior = self.fallback_enabled();
        if !self.is_controlled() {
            self.enable_fallback(true);
        }
        let fallback_used = self.fallback_enabled();
        let start_ms = self.bridge.time();
        self.note(
            log::Level::Info,
            format!("export started: {frames} frames at {} fps", self.bridge.fps()),
        );

        let rendered = {
            let mut progress = SinkProgress {
                sink: &mut *sink,
                fallback_active: fallback_used,
            };
            self.bridge.render_frames(frames, &mut progress).await
        };
        let end_ms = self.bridge.time();
        self.enable_fallback(prior);
        if live {
            self.bridge.start();
        }
        let rendered = rendered.map_err(|err| {
            self.note(log::Level::Error, format!("export aborted: {err}"));
            EngineError::Export(err)
        })?;

        sink.finalize()
            .await
            .map_err(|err| EngineError::Finalize(err.into()))?;

        let summary = ExportSummary {
            frames: rendered,
            duration_ms: end_ms - start_ms,
            fallback_used,
        };
        self.note(
            log::Level::Info,
            format!(
                "export finished: {} frames, {:.3} ms simulated",
                summary.frames, summary.duration_ms
            ),
        );
        Ok(summary)
    }

    /// Fire a tertiary burst at the viewport centre on every audio beat.
    ///
    /// `on_beat` sees each beat before the burst is triggered.
    pub fn connect_audio(
        &self,
        analyser: Rc<dyn AudioAnalyser>,
        options: AudioReactiveOptions,
        mut on_beat: impl FnMut(AudioBeat) + 'static,
    ) -> Result<(), EngineError> {
        if self.shared.state.borrow().audio.is_some() {
            return Err(EngineError::AudioAlreadyConnected);
        }
        let mut reactor = AudioReactor::new(analyser, options);
        let shared = Rc::clone(&self.shared);
        let handle = self.bridge.on_update(move |info| {
            if let Some(beat) = reactor.sample(info.time_ms) {
                on_beat(beat);
                let (x, y) = shared.state.borrow().viewport.center();
                // Failures land in the error log.
                let _ = shared.tertiary_burst(&info, x, y, BurstOptions::default());
            }
            Ok(())
        });
        self.shared.state.borrow_mut().audio = Some(handle);
        Ok(())
    }

    /// Returns `false` when nothing was connected.
    pub fn disconnect_audio(&self) -> bool {
        let handle = self.shared.state.borrow_mut().audio.take();
        match handle {
            Some(handle) => self.bridge.unsubscribe(handle),
            None => false,
        }
    }

    /// Unhook from the bridge, hand the stage its own ticker back and destroy
    /// the bridge. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        for handle in self.hooks.borrow_mut().drain(..) {
            self.bridge.unsubscribe(handle);
        }
        self.disconnect_audio();
        if let Some(ticker) = &self.shared.stage_ticker {
            ticker.start();
        }
        self.note(log::Level::Info, "render coordinator destroyed".to_string());
        self.bridge.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RenderCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCoordinator")
            .field("bridge", &self.bridge)
            .field("controllability", &self.shared.controllability)
            .field("headless", &self.shared.headless)
            .field("fallback", &self.fallback_enabled())
            .finish()
    }
}
