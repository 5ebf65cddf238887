//! Cooperative cancellation.
//!
//! The orchestrator checks a [`CancelFlag`] between pages; a set flag stops
//! the run before the next page starts and the run ends in
//! [`crate::progress::Phase::Cancelled`] instead of `Done`.
//!
//! The async entry points also arm a [`CancelOnDrop`] guard, so a caller
//! that simply drops the returned future abandons the blocking worker at
//! the next page boundary instead of letting it run to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, clonable cancellation flag.
///
/// A flag made with [`CancelFlag::child`] also reports cancellation of its
/// parent, while cancelling the child leaves the parent untouched. Each run
/// works on a child of the caller's flag so one abandoned run never
/// poisons the caller's flag for later runs.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    own: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new flag that is cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        Self {
            own: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.own)),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.own.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }
}

/// Sets the wrapped flag when dropped, unless [`CancelOnDrop::disarm`] ran first.
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    pub fn new(flag: CancelFlag) -> Self {
        Self { flag, armed: true }
    }

    /// The run finished normally; dropping the guard must not cancel.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = CancelFlag::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn child_sees_parent_but_not_the_reverse() {
        let parent = CancelFlag::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn guard_cancels_on_drop() {
        let flag = CancelFlag::new();
        drop(CancelOnDrop::new(flag.clone()));
        assert!(flag.is_cancelled());
    }

    #[test]
    fn disarmed_guard_leaves_flag_alone() {
        let flag = CancelFlag::new();
        CancelOnDrop::new(flag.clone()).disarm();
        assert!(!flag.is_cancelled());
    }
}
