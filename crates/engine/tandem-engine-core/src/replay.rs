//! Time-windowed replay of logged tertiary events onto the substitute renderer.

use crate::events::{EventLog, TertiaryEvent};

/// Event log plus the fallback switch and the last synced simulation time.
///
/// With fallback enabled, [`take_due`](Self::take_due) selects the events of
/// the interval `(last_sync, now]` and prunes everything up to `now` in one
/// pass, so toggling fallback never replays an event twice.
#[derive(Debug, Clone, Default)]
pub struct FallbackReplayer {
    enabled: bool,
    last_sync_ms: f64,
    log: EventLog,
}

impl FallbackReplayer {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            enabled: false,
            last_sync_ms: 0.0,
            log: EventLog::new(capacity),
        }
    }

    /// Returns `true` when the switch actually flipped.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, event: TertiaryEvent) {
        self.log.push(event);
    }

    /// Remember `time_ms` as the end of the last rendered frame.
    pub fn mark_synced(&mut self, time_ms: f64) {
        self.last_sync_ms = time_ms;
    }

    pub fn last_sync(&self) -> f64 {
        self.last_sync_ms
    }

    /// Events to spawn for a frame ending at `now_ms`. Empty while disabled.
    pub fn take_due(&mut self, now_ms: f64) -> Vec<TertiaryEvent> {
        if !self.enabled || self.log.is_empty() {
            return Vec::new();
        }
        let prev = self.last_sync_ms;
        let mut due = self.log.take_through(now_ms);
        // Anything at or before `prev` was already visible before fallback began.
        due.retain(|ev| ev.time_ms > prev);
        due
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BurstOptions;

    fn ev(time_ms: f64) -> TertiaryEvent {
        TertiaryEvent {
            time_ms,
            x: time_ms,
            y: 0.0,
            options: BurstOptions::default(),
        }
    }

    #[test]
    fn disabled_replayer_keeps_the_log() {
        let mut r = FallbackReplayer::new(None);
        r.record(ev(10.0));
        assert!(r.take_due(100.0).is_empty());
        assert_eq!(r.log().len(), 1);
    }

    #[test]
    fn selects_the_open_closed_window_and_prunes_stale_events() {
        let mut r = FallbackReplayer::new(None);
        for t in [5.0, 20.0, 33.0, 34.0] {
            r.record(ev(t));
        }
        r.mark_synced(16.0);
        r.set_enabled(true);

        let due: Vec<f64> = r.take_due(33.0).iter().map(|e| e.time_ms).collect();
        assert_eq!(due, vec![20.0, 33.0]);
        // 5.0 was before the window: pruned, not replayed.
        assert_eq!(r.log().len(), 1);

        r.mark_synced(33.0);
        let due: Vec<f64> = r.take_due(50.0).iter().map(|e| e.time_ms).collect();
        assert_eq!(due, vec![34.0]);
        assert!(r.log().is_empty());
    }

    #[test]
    fn toggling_does_not_replay_twice() {
        let mut r = FallbackReplayer::new(None);
        r.record(ev(10.0));
        r.set_enabled(true);
        assert_eq!(r.take_due(16.0).len(), 1);
        r.set_enabled(false);
        r.set_enabled(true);
        assert!(r.take_due(16.0).is_empty());
    }
}
