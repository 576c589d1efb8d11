//! Dynamic evaluation context.
//!
//! The context is read-only to iterators and may be shared by any number
//! of concurrent executions. All per-execution mutable state lives in
//! [`PlanState`](crate::PlanState).

use std::sync::Arc;

use common_config::ExecutionConfig;
use common_error::{XylemError, XylemResult};
use tokio::sync::watch;

use crate::store::{MemoryNodeStore, NodeStore};

// ============================================================================
// Dynamic Context
// ============================================================================

/// Context passed to every iterator call.
///
/// # Contract
///
/// - Iterators must not mutate the context
/// - Cancellation is cooperative: long-running iterators poll
///   [`check_cancelled`](Self::check_cancelled) at `next` boundaries
#[derive(Clone)]
pub struct DynamicContext {
    /// Node store handle.
    pub store: Arc<dyn NodeStore>,
    /// Cancellation receiver.
    cancel_rx: watch::Receiver<bool>,
    /// Execution limits.
    pub config: ExecutionConfig,
}

impl std::fmt::Debug for DynamicContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicContext")
            .field("config", &self.config)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl DynamicContext {
    /// Create a context over the given store.
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        let (_, cancel_rx) = watch::channel(false);
        Self {
            store,
            cancel_rx,
            config: ExecutionConfig::default(),
        }
    }

    /// Create with custom execution limits.
    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Create with a cancellation receiver.
    #[must_use]
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Return `Cancelled` if cancellation has been requested.
    pub fn check_cancelled(&self) -> XylemResult<()> {
        if self.is_cancelled() {
            return Err(XylemError::cancelled("query execution was cancelled"));
        }
        Ok(())
    }
}

impl Default for DynamicContext {
    fn default() -> Self {
        Self::new(Arc::new(MemoryNodeStore::new()))
    }
}

// ============================================================================
// Cancellation Handle
// ============================================================================

/// Handle for cancelling executions from outside the iterator tree.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a new cancellation handle and receiver.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel_tx: tx }, rx)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// A new receiver observing this handle.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_handle() {
        let (handle, rx) = CancellationHandle::new();
        let ctx = DynamicContext::default().with_cancellation(rx);

        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check_cancelled(), Err(XylemError::Cancelled(_))));
    }

    #[test]
    fn test_cancel_without_live_receivers() {
        let handle = CancellationHandle::default();
        handle.cancel();
        let ctx = DynamicContext::default().with_cancellation(handle.subscribe());
        assert!(ctx.is_cancelled());
    }
}
