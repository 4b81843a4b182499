//! Shared stand-ins and data fixtures for tandem integration tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use tandem_bridge::{BridgeEnv, ExternalTicker, FrameInfo};
use tandem_engine::{
    BurstOptions, CapturedFrame, DriveFn, EmitterOptions, EngineConfig, EngineError, FrameSink,
    MeshOptions, ModuleLoader, NodeId, RenderCoordinator, Renderers, SceneRenderer, SpriteStage,
    TertiaryEvent, TertiaryModule, Viewport,
};

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    timelines: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let path = fixtures_root().join(rel);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

/// A scripted run: frame rate, length and the tertiary events logged up front.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeline {
    pub fps: f64,
    pub frames: u32,
    pub events: Vec<TertiaryEvent>,
}

pub mod timelines {
    use super::*;

    pub fn keys() -> Vec<String> {
        let mut keys: Vec<String> = MANIFEST.timelines.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn load(name: &str) -> Result<Timeline> {
        let rel = MANIFEST
            .timelines
            .get(name)
            .ok_or_else(|| anyhow!("unknown timeline fixture '{name}'"))?;
        load_json(rel)
    }
}

/// Ordered record of renderer calls shared by all stand-ins of one rig.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Entries whose name (the part before `@`) equals `name`.
    pub fn count(&self, name: &str) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.split('@').next() == Some(name))
            .count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug, Default)]
pub struct RecordingScene {
    log: CallLog,
    next: Cell<u64>,
    pub fail_render: Cell<bool>,
    pub meshes: RefCell<Vec<(NodeId, MeshOptions)>>,
    pub removed: RefCell<Vec<NodeId>>,
    pub viewport: Cell<Option<Viewport>>,
}

impl RecordingScene {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

impl SceneRenderer for RecordingScene {
    fn render(&self, frame: &FrameInfo) -> anyhow::Result<()> {
        self.log.push(format!("scene.render@{}", frame.frame));
        if self.fail_render.get() {
            anyhow::bail!("scene lost its context");
        }
        Ok(())
    }

    fn add_mesh(&self, options: &MeshOptions) -> anyhow::Result<NodeId> {
        self.next.set(self.next.get() + 1);
        let node = NodeId(self.next.get());
        self.meshes.borrow_mut().push((node, *options));
        Ok(node)
    }

    fn remove_mesh(&self, node: NodeId) -> anyhow::Result<()> {
        self.removed.borrow_mut().push(node);
        Ok(())
    }

    fn resize(&self, viewport: Viewport) -> anyhow::Result<()> {
        self.viewport.set(Some(viewport));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingTicker {
    log: CallLog,
    pub running: Cell<bool>,
    pub deltas: RefCell<Vec<f64>>,
}

impl RecordingTicker {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            running: Cell::new(true),
            deltas: RefCell::new(Vec::new()),
        }
    }
}

impl ExternalTicker for RecordingTicker {
    fn update(&self, normalized_delta: f64) -> anyhow::Result<()> {
        self.log.push("stage.tick");
        self.deltas.borrow_mut().push(normalized_delta);
        Ok(())
    }

    fn stop(&self) {
        self.running.set(false);
    }

    fn start(&self) {
        self.running.set(true);
    }
}

/// One substitute emitter spawn as seen by the stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spawn {
    pub node: NodeId,
    pub x: f64,
    pub y: f64,
    pub color: u32,
}

#[derive(Debug, Default)]
pub struct RecordingStage {
    log: CallLog,
    next: Cell<u64>,
    ticker: Option<Rc<RecordingTicker>>,
    pub spawns: RefCell<Vec<Spawn>>,
    pub removed: RefCell<Vec<NodeId>>,
    pub viewport: Cell<Option<Viewport>>,
}

impl RecordingStage {
    pub fn new(log: CallLog, ticker: Rc<RecordingTicker>) -> Self {
        Self {
            log,
            ticker: Some(ticker),
            ..Self::default()
        }
    }

    /// A stage that exposes no ticker.
    pub fn without_ticker(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

impl SpriteStage for RecordingStage {
    fn ticker(&self) -> Option<Rc<dyn ExternalTicker>> {
        self.ticker
            .as_ref()
            .map(|t| Rc::clone(t) as Rc<dyn ExternalTicker>)
    }

    fn spawn_emitter(&self, x: f64, y: f64, options: &EmitterOptions) -> anyhow::Result<NodeId> {
        self.log.push("stage.spawn");
        self.next.set(self.next.get() + 1);
        let node = NodeId(self.next.get());
        self.spawns.borrow_mut().push(Spawn {
            node,
            x,
            y,
            color: options.color,
        });
        Ok(node)
    }

    fn remove_emitter(&self, node: NodeId) -> anyhow::Result<()> {
        self.removed.borrow_mut().push(node);
        Ok(())
    }

    fn resize(&self, viewport: Viewport) -> anyhow::Result<()> {
        self.viewport.set(Some(viewport));
        Ok(())
    }
}

/// Tertiary module stand-in exporting a chosen set of entry points.
#[derive(Debug, Default)]
pub struct ScriptedModule {
    log: CallLog,
    exports: Vec<&'static str>,
    next: Cell<u64>,
    pub drives: Rc<RefCell<Vec<(&'static str, f64)>>>,
    pub bursts: RefCell<Vec<(f64, f64, BurstOptions)>>,
    pub stopped: RefCell<Vec<NodeId>>,
}

impl ScriptedModule {
    pub fn new(log: CallLog, exports: &[&'static str]) -> Self {
        Self {
            log,
            exports: exports.to_vec(),
            ..Self::default()
        }
    }

    /// Module with neither known entry point.
    pub fn opaque(log: CallLog) -> Self {
        Self::new(log, &[])
    }
}

impl TertiaryModule for ScriptedModule {
    fn entry_point(&self, name: &str) -> Option<DriveFn> {
        let name = *self.exports.iter().find(|e| **e == name)?;
        let drives = Rc::clone(&self.drives);
        let log = self.log.clone();
        let drive: DriveFn = Rc::new(move |t: f64| {
            log.push("tertiary.drive");
            drives.borrow_mut().push((name, t));
            Ok(())
        });
        Some(drive)
    }

    fn burst(&self, x: f64, y: f64, options: &BurstOptions) -> anyhow::Result<NodeId> {
        self.log.push("tertiary.burst");
        self.next.set(self.next.get() + 1);
        self.bursts.borrow_mut().push((x, y, options.clone()));
        Ok(NodeId(self.next.get()))
    }

    fn stop(&self, node: NodeId) -> anyhow::Result<()> {
        self.stopped.borrow_mut().push(node);
        Ok(())
    }
}

/// Loader returning a fixed module (or none).
pub struct StaticLoader(pub Option<Rc<ScriptedModule>>);

impl ModuleLoader for StaticLoader {
    fn load(&self) -> anyhow::Result<Option<Rc<dyn TertiaryModule>>> {
        Ok(self
            .0
            .as_ref()
            .map(|m| Rc::clone(m) as Rc<dyn TertiaryModule>))
    }
}

/// Loader that always fails, like a module that cannot be imported here.
pub struct FailingLoader;

impl ModuleLoader for FailingLoader {
    fn load(&self) -> anyhow::Result<Option<Rc<dyn TertiaryModule>>> {
        Err(anyhow!("module requires a browser environment"))
    }
}

/// Frame sink keeping every captured frame in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<CapturedFrame>,
    pub finalized: bool,
    /// Reject the capture with this 1-based index.
    pub fail_at: Option<u32>,
}

impl FrameSink for RecordingSink {
    async fn capture(&mut self, frame: CapturedFrame) -> anyhow::Result<()> {
        if self.fail_at == Some(frame.index) {
            anyhow::bail!("encoder rejected frame {}", frame.index);
        }
        self.frames.push(frame);
        Ok(())
    }

    async fn finalize(&mut self) -> anyhow::Result<()> {
        self.finalized = true;
        Ok(())
    }
}

/// Which tertiary module a [`Rig`] is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TertiarySetup {
    /// Exports the given entry points.
    Exports(&'static [&'static str]),
    /// Loads, but exports neither known entry point.
    Opaque,
    /// Loader succeeds but finds nothing.
    Missing,
    /// Loader errors out.
    Failing,
}

/// A coordinator over recording stand-ins.
pub struct Rig {
    pub coordinator: RenderCoordinator,
    pub log: CallLog,
    pub scene: Rc<RecordingScene>,
    pub stage: Rc<RecordingStage>,
    pub ticker: Rc<RecordingTicker>,
    pub module: Option<Rc<ScriptedModule>>,
}

impl Rig {
    pub fn new(config: EngineConfig, tertiary: TertiarySetup) -> Result<Self, EngineError> {
        Self::with_env(config, tertiary, BridgeEnv::offline())
    }

    pub fn with_env(
        config: EngineConfig,
        tertiary: TertiarySetup,
        env: BridgeEnv,
    ) -> Result<Self, EngineError> {
        let log = CallLog::default();
        let scene = Rc::new(RecordingScene::new(log.clone()));
        let ticker = Rc::new(RecordingTicker::new(log.clone()));
        let stage = Rc::new(RecordingStage::new(log.clone(), ticker.clone()));

        let scripted = |module: ScriptedModule| {
            let module = Rc::new(module);
            let renderers = Renderers::new(scene.clone(), stage.clone())
                .with_loader(StaticLoader(Some(module.clone())));
            (Some(module), renderers)
        };
        let (module, renderers) = match tertiary {
            TertiarySetup::Exports(exports) => scripted(ScriptedModule::new(log.clone(), exports)),
            TertiarySetup::Opaque => scripted(ScriptedModule::opaque(log.clone())),
            TertiarySetup::Missing => (
                None,
                Renderers::new(scene.clone(), stage.clone()).with_loader(StaticLoader(None)),
            ),
            TertiarySetup::Failing => (
                None,
                Renderers::new(scene.clone(), stage.clone()).with_loader(FailingLoader),
            ),
        };

        let coordinator = RenderCoordinator::new(config, env, renderers)?;
        Ok(Self {
            coordinator,
            log,
            scene,
            stage,
            ticker,
            module,
        })
    }

    pub fn spawns(&self) -> Vec<Spawn> {
        self.stage.spawns.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_timelines() {
        let keys = timelines::keys();
        assert!(keys.contains(&"single-event-500ms".to_string()));
        for key in keys {
            let tl = timelines::load(&key).expect("timeline loads");
            assert!(tl.fps > 0.0);
            assert!(!tl.events.is_empty());
        }
    }

    #[test]
    fn unknown_timeline_is_an_error() {
        assert!(timelines::load("nope").is_err());
    }
}
