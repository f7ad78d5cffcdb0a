//! Cooperative cancellation for background work
//!
//! A token is shared between the thread that may cancel and the worker that
//! checks it between units of work.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative job cancellation
///
/// Clones share one flag, so cancelling any clone is seen by all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_cancellation() {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        assert!(!worker_token.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(worker_token.is_cancelled());
    }

    #[test]
    fn cancellation_crosses_threads() {
        let token = CancellationToken::new();
        let remote = token.clone();
        thread::spawn(move || remote.cancel())
            .join()
            .expect("thread should finish");
        assert!(token.is_cancelled());
    }
}
