//! Effect bookkeeping: what the coordinator created, per renderer.

use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::ColorSpec;
use crate::error::EngineError;
use crate::events::BurstOptions;
use crate::renderers::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Mesh in the 3D scene.
    Scene,
    /// Emitter on the 2D stage.
    Sprite,
    /// Burst in the tertiary engine.
    Tertiary,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [EffectKind::Scene, EffectKind::Sprite, EffectKind::Tertiary];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Scene => "scene",
            EffectKind::Sprite => "sprite",
            EffectKind::Tertiary => "tertiary",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::UnknownEffectKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub Uuid);

impl EffectId {
    pub fn new() -> Self {
        EffectId(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returned by every `add_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectHandle {
    pub id: EffectId,
    pub kind: EffectKind,
    pub node: NodeId,
}

/// Options for [`add_effect`](crate::RenderCoordinator::add_effect).
///
/// Missing coordinates are randomized around the viewport centre.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectOptions {
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Mesh or emitter color.
    pub color: Option<ColorSpec>,
    /// Burst options for tertiary effects.
    pub burst: BurstOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectCounts {
    pub scene: usize,
    pub sprite: usize,
    pub tertiary: usize,
}

/// Live effects per kind, in creation order.
#[derive(Debug, Default)]
pub(crate) struct EffectRegistry {
    by_kind: HashMap<EffectKind, Vec<EffectHandle>>,
}

impl EffectRegistry {
    pub(crate) fn insert(&mut self, kind: EffectKind, node: NodeId) -> EffectHandle {
        let handle = EffectHandle {
            id: EffectId::new(),
            kind,
            node,
        };
        self.by_kind.entry(kind).or_default().push(handle);
        handle
    }

    /// Most recently created effect of `kind`.
    pub(crate) fn pop(&mut self, kind: EffectKind) -> Option<EffectHandle> {
        self.by_kind.get_mut(&kind).and_then(Vec::pop)
    }

    pub(crate) fn count(&self, kind: EffectKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    pub(crate) fn counts(&self) -> EffectCounts {
        EffectCounts {
            scene: self.count(EffectKind::Scene),
            sprite: self.count(EffectKind::Sprite),
            tertiary: self.count(EffectKind::Tertiary),
        }
    }
}
