//! Cancellation tokens.
//!
//! An [`AbortController`] owns the right to cancel; the [`AbortSignal`]s it
//! hands out observe it. Cancelling only ever means "stop waiting": toolkit
//! functions that accept a signal stop at their next suspension point, and
//! caller code that wants to stop its own work must check the signal itself.

use std::sync::Arc;

use tokio::sync::watch;

use super::error::AbortError;

/// The cancelling side of an abort pair.
#[derive(Debug, Clone)]
pub struct AbortController {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Cancel every operation watching this controller. Idempotent.
    pub fn abort(&self) {
        self.sender.send_if_modified(|aborted| !std::mem::replace(aborted, true));
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of an abort pair.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// `Err(AbortError)` if already aborted.
    pub fn check(&self) -> Result<(), AbortError> {
        if self.is_aborted() {
            Err(AbortError)
        } else {
            Ok(())
        }
    }

    /// Resolves once the controller aborts.
    ///
    /// Never resolves if the controller is dropped without aborting.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
