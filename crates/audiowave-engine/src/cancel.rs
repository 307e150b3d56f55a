//! Interrupt-driven cancellation.
//!
//! The interrupt handler only stores `true`; the streaming loop polls the flag
//! once per period and does all cleanup on its own thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct CancelState {
    raised: AtomicBool,
    claimed: AtomicBool,
}

/// Cancellation context shared between the interrupt handler and the session.
///
/// A flag serves at most one session at a time; see [`crate::session::acquire`].
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    state: Arc<CancelState>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Safe to call from a signal handler; repeated calls are no-ops.
    pub fn raise(&self) {
        self.state.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.state.raised.store(false, Ordering::SeqCst);
    }

    /// Mark the flag as owned by a session. Fails if another session holds it.
    pub(crate) fn claim(&self) -> bool {
        self.state
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn unclaim(&self) {
        self.state.claimed.store(false, Ordering::SeqCst);
    }

    pub fn is_claimed(&self) -> bool {
        self.state.claimed.load(Ordering::SeqCst)
    }
}

/// Route SIGINT (Ctrl-C) to `flag`. Can be installed once per process.
pub fn install_interrupt_handler(flag: &CancellationFlag) -> Result<(), ctrlc::Error> {
    let flag = flag.clone();
    ctrlc::set_handler(move || flag.raise())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_idempotent_and_visible_to_clones() {
        let flag = CancellationFlag::new();
        let handler_side = flag.clone();
        assert!(!flag.is_raised());

        handler_side.raise();
        handler_side.raise();
        assert!(flag.is_raised());

        flag.reset();
        assert!(!handler_side.is_raised());
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let flag = CancellationFlag::new();
        assert!(flag.claim());
        assert!(!flag.clone().claim());
        flag.unclaim();
        assert!(flag.claim());
    }
}
