//! tandem-bridge
//!
//! Engine-agnostic virtual master clock. A [`Bridge`] owns the only notion of
//! "now" for every renderer hooked into it: it takes over the host's
//! next-frame primitive, advances simulated time in fixed frame increments and
//! runs subscribers in a fixed order each frame. Simulated time never depends
//! on wall-clock time, which keeps offline rendering deterministic.

pub mod bridge;
pub mod callbacks;
pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
pub mod realtime;

pub use crate::bridge::{Bridge, BridgeEnv, ExternalTicker, FrameProgress, NoProgress, ProgressFn};
pub use crate::callbacks::{CallbackId, CallbackQueue, DrainReport, FrameCallback};
pub use crate::clock::{sanitize_fps, FrameInfo, VirtualClock, DEFAULT_FPS, MIN_FPS};
pub use crate::config::BridgeConfig;
pub use crate::error::BridgeError;
pub use crate::hooks::{HookHandle, HookPipeline, HookSet};
pub use crate::host::{same_scheduler, FrameHost, FrameScheduler, Interception};
pub use crate::realtime::{
    catch_up_frames, ManualClock, ManualTicker, SystemClock, TickFn, TickScheduler, WallClock,
    DEFAULT_MAX_CATCH_UP_FRAMES,
};

#[cfg(feature = "tokio")]
pub use crate::realtime::{TokioClock, TokioTicker};
