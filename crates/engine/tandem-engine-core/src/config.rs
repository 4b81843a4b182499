//! Engine configuration.

use serde::{Deserialize, Serialize};
use tandem_bridge::BridgeConfig;

/// Environment switch that presumes the tertiary engine unavailable.
pub const SKIP_TERTIARY_ENV: &str = "TANDEM_SKIP_TERTIARY";
/// Environment override for the effect placement seed.
pub const SEED_ENV: &str = "TANDEM_SEED";

/// Drawing surface size in CSS pixels plus device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub dpr: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32, dpr: u32) -> Self {
        Self { width, height, dpr }.clamped()
    }

    /// Every dimension raised to at least 1.
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
            dpr: self.dpr.max(1),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            dpr: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bridge: BridgeConfig,
    /// Do not load the tertiary engine; bursts go straight to the 2D stage.
    pub skip_tertiary: bool,
    /// Reject 2D stages that expose no ticker.
    pub require_stage_ticker: bool,
    /// Bound on logged tertiary events; `None` keeps everything.
    pub event_log_capacity: Option<usize>,
    /// Renderer faults kept for [`audit`](crate::RenderCoordinator::audit).
    pub error_log_capacity: usize,
    /// Activity notes kept in memory; the audit reports the latest of them.
    pub activity_log_capacity: usize,
    pub viewport: Viewport,
    /// Seed for random effect placement.
    pub seed: u64,
    /// Spread (px) of random placement around the viewport centre.
    pub placement_jitter: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            skip_tertiary: false,
            require_stage_ticker: true,
            event_log_capacity: Some(4096),
            error_log_capacity: 200,
            activity_log_capacity: 500,
            viewport: Viewport::default(),
            seed: 0,
            placement_jitter: 120.0,
        }
    }
}

impl EngineConfig {
    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply [`SKIP_TERTIARY_ENV`] and [`SEED_ENV`] as read by `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(SKIP_TERTIARY_ENV) {
            self.skip_tertiary = is_truthy(&raw);
        }
        if let Some(raw) = lookup(SEED_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => self.seed = seed,
                Err(_) => log::warn!("ignoring {SEED_ENV}={raw:?}: not an unsigned integer"),
            }
        }
        self
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_lookup_overrides_defaults() {
        let cfg = EngineConfig::default().with_env(|key| match key {
            SKIP_TERTIARY_ENV => Some("1".into()),
            SEED_ENV => Some(" 42 ".into()),
            _ => None,
        });
        assert!(cfg.skip_tertiary);
        assert_eq!(cfg.seed, 42);

        let cfg = EngineConfig::default().with_env(|key| match key {
            SKIP_TERTIARY_ENV => Some("0".into()),
            SEED_ENV => Some("not-a-seed".into()),
            _ => None,
        });
        assert!(!cfg.skip_tertiary);
        assert_eq!(cfg.seed, 0);
    }

    #[test]
    fn nested_json_config() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "bridge": { "fps": 30 }, "event_log_capacity": null }"#,
        )
        .expect("parse");
        assert_eq!(cfg.bridge.fps, 30.0);
        assert_eq!(cfg.event_log_capacity, None);
        assert_eq!(cfg.viewport, Viewport::default());
    }

    #[test]
    fn viewport_clamps_to_one() {
        let vp = Viewport::new(0, 0, 0);
        assert_eq!(vp, Viewport { width: 1, height: 1, dpr: 1 });
        assert_eq!(Viewport::default().center(), (400.0, 300.0));
    }
}
