//! One-shot "run on next frame" callback queue.

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::host::FrameScheduler;

/// Callback run once on the next frame with the frame's time in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64) -> anyhow::Result<()>>;

/// Identifier returned when a callback is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackId(pub u64);

/// Outcome of one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Registry of one-shot callbacks keyed by a monotonically increasing id.
///
/// Interior mutability lets a callback schedule its successor while the queue
/// is being drained; such entries are deferred to the following drain.
pub struct CallbackQueue {
    entries: RefCell<IndexMap<CallbackId, FrameCallback>>,
    next_id: Cell<u64>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(IndexMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Store `callback` for the next drain and return its id.
    pub fn schedule(&self, callback: FrameCallback) -> CallbackId {
        let id = CallbackId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().insert(id, callback);
        id
    }

    /// Remove a pending callback. Returns `false` when the id is unknown or
    /// already consumed.
    pub fn cancel(&self, id: CallbackId) -> bool {
        self.entries.borrow_mut().shift_remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every pending callback without invoking it.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Invoke every callback pending at call time with `time_ms`.
    ///
    /// The live queue is emptied before the first invocation, so anything
    /// scheduled from inside a callback waits for the next drain.
    pub fn drain(&self, time_ms: f64) -> DrainReport {
        let snapshot = std::mem::take(&mut *self.entries.borrow_mut());
        let mut report = DrainReport::default();
        for (id, callback) in snapshot {
            report.invoked += 1;
            if let Err(err) = callback(time_ms) {
                report.failed += 1;
                log::error!("frame callback {} failed: {err:#}", id.0);
            }
        }
        report
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("pending", &self.len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}

impl FrameScheduler for CallbackQueue {
    fn request_frame(&self, callback: FrameCallback) -> CallbackId {
        self.schedule(callback)
    }

    fn cancel_frame(&self, id: CallbackId) {
        self.cancel(id);
    }
}
