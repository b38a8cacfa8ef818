//! Cooperative cancellation (spec §5): a token threaded through every stage
//! and polled before entering a long loop (resource iteration, patch
//! application, directory walk). Also carries the top-level timeout
//! (`opts.Timeout`, spec §5): `build()` constructs a token with a deadline
//! when the caller does not supply its own, so one `check()` call covers
//! both explicit cancellation and timeout expiry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, Result};

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken { cancelled: Arc::new(AtomicBool::new(false)), deadline: None }
    }

    /// A token that self-cancels once `timeout` has elapsed (spec §5
    /// `opts.Timeout`, default 30s).
    pub fn with_timeout(timeout: Duration) -> Self {
        CancellationToken { cancelled: Arc::new(AtomicBool::new(false)), deadline: Some(Instant::now() + timeout) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.is_timed_out()
    }

    fn is_timed_out(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// Returns an error naming `stage` if cancellation has been requested
    /// or the deadline has passed. Call this at the top of every long loop
    /// iteration (spec §5).
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_timed_out() {
            return Err(ErrorKind::Cancelled(format!("{} (timeout)", stage)).into());
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(ErrorKind::Cancelled(stage.to_string()).into());
        }
        Ok(())
    }
}
