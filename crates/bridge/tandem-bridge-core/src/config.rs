//! Bridge configuration.

use serde::{Deserialize, Serialize};

use crate::clock::DEFAULT_FPS;
use crate::realtime::DEFAULT_MAX_CATCH_UP_FRAMES;

/// Settings read once when a [`Bridge`](crate::Bridge) is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Initial frame rate; clamped like [`Bridge::set_frame_rate`](crate::Bridge::set_frame_rate).
    pub fps: f64,
    /// Start the real-time loop right after construction.
    pub auto_start: bool,
    /// Upper bound on frames executed per real-time tick.
    pub max_catch_up_frames: u32,
    /// Rate that an attached ticker's normalized delta of 1.0 corresponds to.
    pub normalized_baseline_fps: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            auto_start: false,
            max_catch_up_frames: DEFAULT_MAX_CATCH_UP_FRAMES,
            normalized_baseline_fps: DEFAULT_FPS,
        }
    }
}

impl BridgeConfig {
    pub fn with_fps(fps: f64) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: BridgeConfig = serde_json::from_str(r#"{ "fps": 30 }"#).expect("parse");
        assert_eq!(cfg.fps, 30.0);
        assert_eq!(cfg.max_catch_up_frames, 8);
        assert!(!cfg.auto_start);
    }
}
