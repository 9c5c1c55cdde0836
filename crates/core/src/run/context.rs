//! Run-scoped control state.
//!
//! The context replaces global mutable state: it is created by the caller,
//! passed by reference into the control loop, and carries the cooperative
//! cancellation flag. The matching `CancelHandle` can be sent to another
//! thread (a signal handler, a control plane) and flipped at any time; the
//! loop honours it at its next checkpoint, not instantaneously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// External cancellation handle; cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The control loop's view of the run state.
#[derive(Debug)]
pub struct RunContext {
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    /// Create a context and its external cancellation handle.
    #[must_use]
    pub fn new() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancel: Arc::clone(&flag),
            },
            CancelHandle { flag },
        )
    }

    /// Poll the cancellation flag; called at loop-iteration boundaries and
    /// after long-running phases.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_flips_context() {
        let (ctx, handle) = RunContext::new();
        assert!(!ctx.is_cancelled());
        let remote = handle.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(ctx.is_cancelled());
        assert!(handle.is_cancelled());
    }
}
