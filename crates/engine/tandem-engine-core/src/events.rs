//! Tertiary trigger events and the bounded log they are kept in.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::color::{parse_color, ColorSpec};
use crate::renderers::EmitterOptions;

pub const DEFAULT_BURST_COUNT: u32 = 12;
pub const DEFAULT_BURST_DURATION_MS: f64 = 700.0;

/// Options attached to a tertiary burst. Unknown keys are kept in `extra` and
/// passed through to the tertiary module untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BurstOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<ColorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BurstOptions {
    pub fn with_stroke(stroke: impl Into<ColorSpec>) -> Self {
        Self {
            stroke: Some(stroke.into()),
            ..Self::default()
        }
    }

    pub fn count(&self) -> u32 {
        self.count.unwrap_or(DEFAULT_BURST_COUNT)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms.unwrap_or(DEFAULT_BURST_DURATION_MS)
    }

    /// Options for spawning the substitute 2D emitter in place of this burst.
    pub fn emitter_options(&self) -> EmitterOptions {
        EmitterOptions {
            color: parse_color(self.stroke.as_ref()),
            ..EmitterOptions::default()
        }
    }
}

/// A tertiary trigger stamped with the simulation time it happened at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TertiaryEvent {
    pub time_ms: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub options: BurstOptions,
}

/// Append-only event log with an optional retention bound.
///
/// Once `capacity` events are held, each new one evicts the oldest.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: VecDeque<TertiaryEvent>,
    capacity: Option<usize>,
    dropped: u64,
}

impl EventLog {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: TertiaryEvent) {
        if let Some(cap) = self.capacity {
            if cap == 0 {
                self.dropped += 1;
                log::warn!("event log has no capacity; dropped event at {} ms", event.time_ms);
                return;
            }
            while self.events.len() >= cap {
                if let Some(old) = self.events.pop_front() {
                    self.dropped += 1;
                    log::warn!(
                        "event log full ({cap}); dropped oldest event at {} ms",
                        old.time_ms
                    );
                }
            }
        }
        self.events.push_back(event);
    }

    /// Remove and return every event with `time_ms <= t`, in log order.
    pub fn take_through(&mut self, t: f64) -> Vec<TertiaryEvent> {
        let (due, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|ev| ev.time_ms <= t);
        self.events = keep.into();
        due
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events evicted by the capacity bound so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &TertiaryEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
