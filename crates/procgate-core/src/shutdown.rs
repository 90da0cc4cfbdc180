//! Shutdown signalling for the serve loop.
//!
//! A `ShutdownToken` is the single way to stop a running server. Operating
//! system signals, tests, and embedding processes all trigger the same token,
//! so the exit-hook-then-propagate sequence is ordinary control flow.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Why the serve loop was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operator interrupt (Ctrl-C / SIGINT).
    Interrupt,
    /// Clean exit requested by the host process (SIGTERM or programmatic).
    ExitRequested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => f.write_str("interrupt"),
            ShutdownReason::ExitRequested => f.write_str("exit requested"),
        }
    }
}

/// A cloneable token that fires once with a [`ShutdownReason`].
///
/// All clones observe the same state. Only the first `trigger` is recorded.
///
/// # Example
///
/// ```
/// use procgate_core::shutdown::{ShutdownReason, ShutdownToken};
///
/// let token = ShutdownToken::new();
/// let token_clone = token.clone();
///
/// token_clone.trigger(ShutdownReason::Interrupt);
/// assert_eq!(token.reason(), Some(ShutdownReason::Interrupt));
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownToken {
    /// Create a new, untriggered token.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns `false` if a reason was already recorded.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// The recorded reason, if shutdown has been requested.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Check if shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until shutdown is requested.
    pub async fn triggered(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives in `self`, so the channel cannot close while we wait.
            if rx.changed().await.is_err() {
                return ShutdownReason::ExitRequested;
            }
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
