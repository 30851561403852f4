//! Waiting for on-chain settlement confirmation.
//!
//! A [`SettledEventSubscription`] is opened before a settlement transaction
//! is submitted and owns its cancel hook: whichever path drops it (confirmed,
//! timed out, shut down, submission failed) cancels the upstream stream.

use std::{fmt, time::Duration};

use paysettle_types::{Identity, PaysettleError, PromiseSettledEvent, Result};
use tokio::sync::{mpsc, watch};

type CancelFn = Box<dyn FnOnce() + Send + 'static>;

/// Live "promise settled" stream for one (chain, provider, hermes).
pub struct SettledEventSubscription {
    events: mpsc::Receiver<PromiseSettledEvent>,
    cancel: Option<CancelFn>,
}

impl SettledEventSubscription {
    pub fn new(events: mpsc::Receiver<PromiseSettledEvent>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next event, or `None` once the upstream sink is closed.
    pub async fn recv(&mut self) -> Option<PromiseSettledEvent> {
        self.events.recv().await
    }

    /// Cancel the upstream stream now.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            self.events.close();
            cancel();
        }
    }
}

impl Drop for SettledEventSubscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for SettledEventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettledEventSubscription")
            .field("cancelled", &self.cancel.is_none())
            .finish_non_exhaustive()
    }
}

/// How a confirmation wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed(PromiseSettledEvent),
    /// The sink closed without delivering an event.
    Closed,
    TimedOut,
    Shutdown,
}

impl ConfirmationOutcome {
    /// Map the outcome to the caller-visible result. Only a timeout is an
    /// error; a closed sink or shutdown ends quietly.
    pub fn into_result(self, provider: Identity) -> Result<Option<PromiseSettledEvent>> {
        match self {
            Self::Confirmed(event) => Ok(Some(event)),
            Self::Closed | Self::Shutdown => Ok(None),
            Self::TimedOut => Err(PaysettleError::SettleTimeout { provider }),
        }
    }
}

/// Race the confirmation event against `max_wait` and the shutdown signal.
pub async fn await_confirmation(
    subscription: &mut SettledEventSubscription,
    max_wait: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> ConfirmationOutcome {
    if *shutdown.borrow() {
        return ConfirmationOutcome::Shutdown;
    }

    tokio::select! {
        event = subscription.recv() => match event {
            Some(event) => ConfirmationOutcome::Confirmed(event),
            None => ConfirmationOutcome::Closed,
        },
        () = tokio::time::sleep(max_wait) => ConfirmationOutcome::TimedOut,
        () = stopped(shutdown) => ConfirmationOutcome::Shutdown,
    }
}

/// Resolves once shutdown is signalled. A dropped sender counts as shutdown.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
