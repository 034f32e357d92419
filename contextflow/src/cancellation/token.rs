//! Cancellation token checked by the orchestrator at stage boundaries.

use crate::errors::ContextflowError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Callback invoked with the cancellation reason.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone)]
struct Cancellation {
    reason: String,
    at: DateTime<Utc>,
}

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent: the first reason wins and callbacks run once.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    cancellation: RwLock<Option<Cancellation>>,
    callbacks: RwLock<Vec<CancelCallback>>,
}

impl CancellationToken {
    /// Creates a new token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns true if this call cancelled the token.
    ///
    /// Callback panics are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let reason = reason.into();
        *self.cancellation.write() = Some(Cancellation {
            reason: reason.clone(),
            at: Utc::now(),
        });

        let callbacks = std::mem::take(&mut *self.callbacks.write());
        for callback in &callbacks {
            invoke(callback.as_ref(), &reason);
        }
        true
    }

    /// Registers a callback. Runs it immediately if already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        {
            let mut callbacks = self.callbacks.write();
            if !self.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        let reason = self.reason().unwrap_or_default();
        invoke(&callback, &reason);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.cancellation.read().as_ref().map(|c| c.reason.clone())
    }

    /// Returns when the token was cancelled.
    #[must_use]
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancellation.read().as_ref().map(|c| c.at)
    }

    /// Returns `Err(Cancelled)` once the token is cancelled.
    pub fn ensure_active(&self) -> Result<(), ContextflowError> {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(ContextflowError::Cancelled(reason));
        }
        Ok(())
    }
}

fn invoke(callback: &(dyn Fn(&str) + Send + Sync), reason: &str) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))) {
        warn!("Cancellation callback panicked: {:?}", panic);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
