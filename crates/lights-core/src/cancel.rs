//! Shared flag for cooperative shutdown.
//!
//! Used as the animator's stop flag and as the per-connection continue flag
//! of the RPC bridge. Nothing is ever preempted: loops check the token at
//! their own cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token for cooperative cancellation.
///
/// Clones share state. Cancellation is one-way.
///
/// # Example
///
/// ```
/// use lights_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let pump = token.clone();
///
/// token.cancel();
/// assert!(pump.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Inverse of [`is_cancelled`](Self::is_cancelled), reads better in loop headers.
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled()
    }
}
