//! Host "next frame" primitives and their interception.
//!
//! [`FrameHost`] models the host's global request/cancel pair as a slot holding
//! the active [`FrameScheduler`]. Libraries schedule through the host; whoever
//! owns the slot decides when those callbacks run. The bridge takes the slot
//! over with [`FrameHost::intercept`] and gets back an [`Interception`] guard
//! that puts the original scheduler back when released or dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callbacks::{CallbackId, CallbackQueue, FrameCallback};

/// A "run once on the next frame" primitive.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback) -> CallbackId;
    fn cancel_frame(&self, id: CallbackId);
}

/// Shared slot for the host's active frame scheduler.
pub struct FrameHost {
    active: RefCell<Rc<dyn FrameScheduler>>,
}

impl FrameHost {
    pub fn new(native: Rc<dyn FrameScheduler>) -> Rc<Self> {
        Rc::new(Self {
            active: RefCell::new(native),
        })
    }

    /// Host whose native primitive is a plain [`CallbackQueue`]; the returned
    /// queue is what the host pumps when nothing intercepts it.
    pub fn with_native_queue() -> (Rc<Self>, Rc<CallbackQueue>) {
        let native = Rc::new(CallbackQueue::new());
        let host = Self::new(native.clone());
        (host, native)
    }

    /// Schedule `callback` on whichever scheduler currently owns the slot.
    pub fn request_animation_frame(
        &self,
        callback: impl FnOnce(f64) -> anyhow::Result<()> + 'static,
    ) -> CallbackId {
        // Clone out of the slot so a scheduler may re-enter the host.
        let scheduler = self.current();
        scheduler.request_frame(Box::new(callback))
    }

    pub fn cancel_animation_frame(&self, id: CallbackId) {
        let scheduler = self.current();
        scheduler.cancel_frame(id);
    }

    /// The scheduler currently installed.
    pub fn current(&self) -> Rc<dyn FrameScheduler> {
        self.active.borrow().clone()
    }

    /// True when `scheduler` is the exact instance installed in the slot.
    pub fn is_current(&self, scheduler: &Rc<dyn FrameScheduler>) -> bool {
        same_scheduler(&self.active.borrow(), scheduler)
    }

    /// Install `scheduler`, returning a guard that restores the previous one.
    pub fn intercept(self: &Rc<Self>, scheduler: Rc<dyn FrameScheduler>) -> Interception {
        let original = std::mem::replace(&mut *self.active.borrow_mut(), scheduler);
        Interception {
            host: Rc::clone(self),
            original: Some(original),
        }
    }
}

impl fmt::Debug for FrameHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHost")
            .field("active", &Rc::as_ptr(&self.active.borrow()).cast::<()>())
            .finish()
    }
}

/// Compare two schedulers by allocation, ignoring vtable identity.
pub fn same_scheduler(a: &Rc<dyn FrameScheduler>, b: &Rc<dyn FrameScheduler>) -> bool {
    std::ptr::eq(Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>())
}

/// Scoped ownership of a [`FrameHost`] slot.
///
/// Restores the original scheduler exactly once, on [`release`](Self::release)
/// or on drop.
pub struct Interception {
    host: Rc<FrameHost>,
    original: Option<Rc<dyn FrameScheduler>>,
}

impl Interception {
    /// The scheduler that was active before interception.
    pub fn original(&self) -> Option<&Rc<dyn FrameScheduler>> {
        self.original.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.original.is_none()
    }

    /// Put the original scheduler back. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(original) = self.original.take() {
            *self.host.active.borrow_mut() = original;
            log::debug!("restored native frame scheduler");
        }
    }
}

impl Drop for Interception {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Interception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interception")
            .field("released", &self.is_released())
            .finish()
    }
}
