//! Per-frame hook sets.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clock::FrameInfo;
use crate::error::BridgeError;

/// The three hook sets, listed in invocation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookSet {
    /// Runs right after the clock advances, before queued callbacks.
    BeforeUpdate,
    /// Runs after queued callbacks; renderers live here.
    Update,
    /// Runs last; cleanup and telemetry.
    AfterUpdate,
}

impl HookSet {
    pub const ALL: [HookSet; 3] = [HookSet::BeforeUpdate, HookSet::Update, HookSet::AfterUpdate];

    pub fn name(self) -> &'static str {
        match self {
            HookSet::BeforeUpdate => "onBeforeUpdate",
            HookSet::Update => "onUpdate",
            HookSet::AfterUpdate => "onAfterUpdate",
        }
    }

    fn index(self) -> usize {
        match self {
            HookSet::BeforeUpdate => 0,
            HookSet::Update => 1,
            HookSet::AfterUpdate => 2,
        }
    }
}

impl fmt::Display for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HookSet {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onBeforeUpdate" | "before" | "pre" => Ok(HookSet::BeforeUpdate),
            "onUpdate" | "update" | "frame" => Ok(HookSet::Update),
            "onAfterUpdate" | "after" | "post" => Ok(HookSet::AfterUpdate),
            other => Err(BridgeError::UnknownHookSet(other.to_string())),
        }
    }
}

/// Subscription token returned by [`HookPipeline::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookHandle {
    set: HookSet,
    id: u64,
}

impl HookHandle {
    pub fn set(&self) -> HookSet {
        self.set
    }
}

/// Hook body. Errors are logged by the pipeline and never abort a frame.
pub type HookFn = dyn FnMut(FrameInfo) -> anyhow::Result<()>;

type SharedHook = Rc<RefCell<Box<HookFn>>>;

/// Three independent subscriber sets.
///
/// Each run works on a snapshot of its set, so hooks may subscribe or
/// unsubscribe while a frame is in progress; changes apply to later runs.
#[derive(Default)]
pub struct HookPipeline {
    sets: [RefCell<IndexMap<u64, SharedHook>>; 3],
    next_id: Cell<u64>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        set: HookSet,
        hook: impl FnMut(FrameInfo) -> anyhow::Result<()> + 'static,
    ) -> HookHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let boxed: Box<HookFn> = Box::new(hook);
        self.sets[set.index()]
            .borrow_mut()
            .insert(id, Rc::new(RefCell::new(boxed)));
        HookHandle { set, id }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: HookHandle) -> bool {
        self.sets[handle.set.index()]
            .borrow_mut()
            .shift_remove(&handle.id)
            .is_some()
    }

    pub fn len(&self, set: HookSet) -> usize {
        self.sets[set.index()].borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|s| s.borrow().is_empty())
    }

    pub fn clear(&self) {
        for set in &self.sets {
            set.borrow_mut().clear();
        }
    }

    /// Invoke every subscriber of `set`. Returns the number of failures.
    pub fn run(&self, set: HookSet, info: FrameInfo) -> usize {
        let snapshot: Vec<(u64, SharedHook)> = self.sets[set.index()]
            .borrow()
            .iter()
            .map(|(id, hook)| (*id, Rc::clone(hook)))
            .collect();

        let mut failures = 0;
        for (id, hook) in snapshot {
            let Ok(mut body) = hook.try_borrow_mut() else {
                log::warn!("{set} hook {id} re-entered during frame {}; skipped", info.frame);
                failures += 1;
                continue;
            };
            if let Err(err) = (*body)(info) {
                failures += 1;
                log::error!("{set} hook {id} failed at frame {}: {err:#}", info.frame);
            }
        }
        failures
    }
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("before", &self.len(HookSet::BeforeUpdate))
            .field("update", &self.len(HookSet::Update))
            .field("after", &self.len(HookSet::AfterUpdate))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(frame: u64) -> FrameInfo {
        FrameInfo {
            frame,
            time_ms: frame as f64 * 10.0,
            delta_ms: 10.0,
        }
    }

    #[test]
    fn names_parse_and_unknown_names_fail() {
        assert_eq!("onBeforeUpdate".parse::<HookSet>().unwrap(), HookSet::BeforeUpdate);
        assert_eq!("onUpdate".parse::<HookSet>().unwrap(), HookSet::Update);
        assert_eq!("post".parse::<HookSet>().unwrap(), HookSet::AfterUpdate);
        let err = "nonexistent".parse::<HookSet>().unwrap_err();
        assert!(matches!(err, BridgeError::UnknownHookSet(ref n) if n == "nonexistent"));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hooks = HookPipeline::new();
        let h = hooks.subscribe(HookSet::Update, |_| Ok(()));
        assert_eq!(hooks.len(HookSet::Update), 1);
        assert!(hooks.unsubscribe(h));
        assert!(!hooks.unsubscribe(h));
        assert!(hooks.is_empty());
    }

    #[test]
    fn errors_are_counted_and_siblings_still_run() {
        let hooks = HookPipeline::new();
        let ran = Rc::new(Cell::new(0));
        hooks.subscribe(HookSet::Update, |_| anyhow::bail!("broken hook"));
        let r = ran.clone();
        hooks.subscribe(HookSet::Update, move |_| {
            r.set(r.get() + 1);
            Ok(())
        });
        assert_eq!(hooks.run(HookSet::Update, info(1)), 1);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn subscription_made_during_run_applies_next_run() {
        let hooks = Rc::new(HookPipeline::new());
        let late_runs = Rc::new(Cell::new(0));
        let (h2, l2) = (hooks.clone(), late_runs.clone());
        let added = Rc::new(Cell::new(false));
        hooks.subscribe(HookSet::AfterUpdate, move |_| {
            if !added.get() {
                added.set(true);
                let l3 = l2.clone();
                h2.subscribe(HookSet::AfterUpdate, move |_| {
                    l3.set(l3.get() + 1);
                    Ok(())
                });
            }
            Ok(())
        });
        hooks.run(HookSet::AfterUpdate, info(1));
        assert_eq!(late_runs.get(), 0);
        hooks.run(HookSet::AfterUpdate, info(2));
        assert_eq!(late_runs.get(), 1);
    }
}
