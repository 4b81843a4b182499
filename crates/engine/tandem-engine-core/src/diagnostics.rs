use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::effects::EffectCounts;

/// One renderer fault, stamped with simulation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub frame: u64,
    pub time_ms: f64,
    pub context: String,
    pub message: String,
}

/// Most recent renderer faults, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    /// Log `err` and keep it for the next audit.
    pub fn record(&mut self, context: &str, frame: u64, time_ms: f64, err: &anyhow::Error) {
        log::error!("{context} failed at frame {frame}: {err:#}");
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(ErrorRecord {
            frame,
            time_ms,
            context: context.to_string(),
            message: format!("{err:#}"),
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn recent(&self) -> Vec<ErrorRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Entries of the activity log included in an [`AuditReport`].
pub const AUDIT_LOG_ENTRIES: usize = 200;

/// One line of coordinator activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// `info`, `warn` or `error`.
    pub level: String,
    pub frame: u64,
    pub time_ms: f64,
    pub message: String,
}

/// In-memory ring of lifecycle notes, warnings and faults, oldest first.
///
/// Notes are mirrored to the `log` facade as they are recorded.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    records: VecDeque<LogRecord>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    /// Emit `message` at `level` and keep it.
    pub fn note(&mut self, level: log::Level, frame: u64, time_ms: f64, message: String) {
        log::log!(level, "{message}");
        self.keep(level, frame, time_ms, message);
    }

    /// Keep `message` without emitting it again.
    pub fn keep(&mut self, level: log::Level, frame: u64, time_ms: f64, message: String) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(LogRecord {
            level: level.as_str().to_ascii_lowercase(),
            frame,
            time_ms,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }
}

/// Snapshot of coordinator state for tooling and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub counts: EffectCounts,
    pub controlled: bool,
    pub entry_point: Option<String>,
    pub fallback_enabled: bool,
    pub headless: bool,
    pub event_log_len: usize,
    pub events_dropped: u64,
    pub frame: u64,
    pub time_ms: f64,
    pub errors: Vec<ErrorRecord>,
    /// Latest activity, at most [`AUDIT_LOG_ENTRIES`].
    pub logs: Vec<LogRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_latest_records() {
        let mut log = ErrorLog::new(2);
        for i in 0..3u64 {
            log.record("scene.render", i, i as f64, &anyhow::anyhow!("boom {i}"));
        }
        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "boom 1");
        assert_eq!(recent[1].context, "scene.render");
    }

    #[test]
    fn activity_log_is_bounded_and_tails_on_request() {
        let mut log = ActivityLog::new(3);
        for i in 0..5u64 {
            log.note(log::Level::Info, i, i as f64 * 10.0, format!("note {i}"));
        }
        log.keep(log::Level::Error, 5, 50.0, "scene.render failed".into());
        assert_eq!(log.len(), 3);

        let tail = log.recent(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "note 4");
        assert_eq!(tail[1].level, "error");
        assert_eq!(log.recent(10).len(), 3);

        let mut off = ActivityLog::new(0);
        off.note(log::Level::Warn, 0, 0.0, "dropped".into());
        assert!(off.is_empty());
    }
}
