//! Collaborator contracts for the three renderers, plus headless stand-ins.
//!
//! The coordinator never draws anything itself. It only calls these traits in
//! a fixed order from the bridge's frame hook.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tandem_bridge::{ExternalTicker, FrameInfo};

use crate::color::DEFAULT_COLOR;
use crate::config::Viewport;
use crate::events::BurstOptions;

/// Default color of meshes added without one.
pub const DEFAULT_MESH_COLOR: u32 = 0xFF_00_A0;
/// Particles per substitute emitter.
pub const DEFAULT_EMITTER_PARTICLES: u32 = 30;

/// Renderer-side handle of something the coordinator created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Time-advance function of a controllable tertiary engine.
pub type DriveFn = Rc<dyn Fn(f64) -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshOptions {
    pub color: u32,
    pub position: [f64; 3],
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            color: DEFAULT_MESH_COLOR,
            position: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterOptions {
    pub color: u32,
    pub particles: u32,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR,
            particles: DEFAULT_EMITTER_PARTICLES,
        }
    }
}

/// The 3D renderer.
pub trait SceneRenderer {
    fn render(&self, frame: &FrameInfo) -> anyhow::Result<()>;
    fn add_mesh(&self, options: &MeshOptions) -> anyhow::Result<NodeId>;
    fn remove_mesh(&self, node: NodeId) -> anyhow::Result<()>;
    fn resize(&self, viewport: Viewport) -> anyhow::Result<()>;
}

/// The 2D renderer; also the substitute for tertiary bursts.
pub trait SpriteStage {
    /// The stage's own ticker. A stage without one cannot be driven in lockstep.
    fn ticker(&self) -> Option<Rc<dyn ExternalTicker>>;
    fn spawn_emitter(&self, x: f64, y: f64, options: &EmitterOptions) -> anyhow::Result<NodeId>;
    fn remove_emitter(&self, node: NodeId) -> anyhow::Result<()>;
    fn resize(&self, viewport: Viewport) -> anyhow::Result<()>;
}

/// A loaded tertiary animation module.
pub trait TertiaryModule {
    /// Look up a static entry point such as `"Tween.update"`.
    fn entry_point(&self, name: &str) -> Option<DriveFn>;
    fn burst(&self, x: f64, y: f64, options: &BurstOptions) -> anyhow::Result<NodeId>;
    fn stop(&self, node: NodeId) -> anyhow::Result<()>;
}

/// Loads the tertiary module. `Ok(None)` means "not available here".
pub trait ModuleLoader {
    fn load(&self) -> anyhow::Result<Option<Rc<dyn TertiaryModule>>>;
}

/// The collaborators a coordinator is built over.
pub struct Renderers {
    pub scene: Rc<dyn SceneRenderer>,
    pub stage: Rc<dyn SpriteStage>,
    pub loader: Option<Box<dyn ModuleLoader>>,
    /// No real drawing surface is present.
    pub headless: bool,
}

impl Renderers {
    pub fn new(scene: Rc<dyn SceneRenderer>, stage: Rc<dyn SpriteStage>) -> Self {
        Self {
            scene,
            stage,
            loader: None,
            headless: false,
        }
    }

    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// No-op renderers for environments without a drawing surface.
    pub fn headless() -> Self {
        Self {
            scene: Rc::new(NullScene),
            stage: Rc::new(NullStage::default()),
            loader: None,
            headless: true,
        }
    }
}

/// Scene renderer that accepts everything and draws nothing.
#[derive(Debug, Default)]
pub struct NullScene;

impl SceneRenderer for NullScene {
    fn render(&self, _frame: &FrameInfo) -> anyhow::Result<()> {
        Ok(())
    }

    fn add_mesh(&self, _options: &MeshOptions) -> anyhow::Result<NodeId> {
        Ok(NodeId(0))
    }

    fn remove_mesh(&self, _node: NodeId) -> anyhow::Result<()> {
        Ok(())
    }

    fn resize(&self, _viewport: Viewport) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Stage with a no-op ticker that hands out sequential node ids.
#[derive(Debug, Default)]
pub struct NullStage {
    next: Cell<u64>,
}

struct NullTicker;

impl ExternalTicker for NullTicker {
    fn update(&self, _normalized_delta: f64) -> anyhow::Result<()> {
        Ok(())
    }
}

impl SpriteStage for NullStage {
    fn ticker(&self) -> Option<Rc<dyn ExternalTicker>> {
        Some(Rc::new(NullTicker))
    }

    fn spawn_emitter(&self, _x: f64, _y: f64, _options: &EmitterOptions) -> anyhow::Result<NodeId> {
        let id = self.next.get() + 1;
        self.next.set(id);
        Ok(NodeId(id))
    }

    fn remove_emitter(&self, _node: NodeId) -> anyhow::Result<()> {
        Ok(())
    }

    fn resize(&self, _viewport: Viewport) -> anyhow::Result<()> {
        Ok(())
    }
}
