//! tandem-engine
//!
//! Render coordination for the tandem bridge. A [`RenderCoordinator`] hooks a
//! 3D scene renderer, a 2D sprite stage and an optional tertiary animation
//! engine into one [`Bridge`](tandem_bridge::Bridge) so they advance in
//! lockstep. When the tertiary engine cannot be driven to an explicit
//! timestamp, its bursts are logged and replayed on the 2D stage instead.

pub mod audio;
pub mod color;
pub mod config;
pub mod controllability;
pub mod coordinator;
pub mod diagnostics;
pub mod effects;
pub mod error;
pub mod events;
pub mod export;
pub mod renderers;
pub mod replay;

pub use crate::audio::{rms, AudioAnalyser, AudioBeat, AudioReactiveOptions, AudioReactor};
pub use crate::color::{parse_color, ColorSpec, DEFAULT_COLOR};
pub use crate::config::{EngineConfig, Viewport, SEED_ENV, SKIP_TERTIARY_ENV};
pub use crate::controllability::{Controllability, ENTRY_POINTS};
pub use crate::coordinator::{RenderCoordinator, SpriteUpdaterFn, UpdaterId};
pub use crate::diagnostics::{
    ActivityLog, AuditReport, ErrorLog, ErrorRecord, LogRecord, AUDIT_LOG_ENTRIES,
};
pub use crate::effects::{EffectCounts, EffectHandle, EffectId, EffectKind, EffectOptions};
pub use crate::error::EngineError;
pub use crate::events::{BurstOptions, EventLog, TertiaryEvent};
pub use crate::export::{CapturedFrame, ExportSummary, FrameSink};
pub use crate::renderers::{
    DriveFn, EmitterOptions, MeshOptions, ModuleLoader, NodeId, NullScene, NullStage, Renderers,
    SceneRenderer, SpriteStage, TertiaryModule, DEFAULT_EMITTER_PARTICLES, DEFAULT_MESH_COLOR,
};
pub use crate::replay::FallbackReplayer;

pub use tandem_bridge;
