//! Settlement request queue and its dispatch loop.
//!
//! Auto-settlement decisions are turned into [`ReceivedPromise`] items on a
//! bounded queue. A single loop drains it, re-resolves each channel and
//! spawns one settle-and-rebalance task per item.

use std::sync::Arc;

use paysettle_types::{Address, Channel, Identity, PaysettleError, Promise, Result};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    collaborators::ChannelProvider,
    confirm::stopped,
    settler::{HermesPromiseSettler, SettleRequest, Submission},
};

/// A promise queued for automatic settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPromise {
    pub provider: Identity,
    pub hermes_id: Address,
    /// Promise with its secret attached.
    pub promise: Promise,
    pub beneficiary: Address,
}

impl HermesPromiseSettler {
    /// Queue `channel`'s latest promise for settlement.
    ///
    /// Waits for queue space; gives up quietly once the settler is stopped.
    pub async fn initiate_settling(&self, channel: Channel) -> Result<()> {
        let promise = channel.last_promise.promise_with_secret()?;
        self.enqueue(ReceivedPromise {
            provider: channel.identity,
            hermes_id: channel.hermes_id,
            promise,
            beneficiary: channel.beneficiary,
        })
        .await;
        Ok(())
    }

    /// Push onto the settle queue, racing against shutdown.
    pub(crate) async fn enqueue(&self, item: ReceivedPromise) {
        let mut shutdown = self.shutdown_signal();
        let provider = item.provider;
        tokio::select! {
            sent = self.settle_queue.send(item) => {
                if sent.is_err() {
                    tracing::debug!(%provider, "Settle queue closed, dropping request");
                }
            }
            () = stopped(&mut shutdown) => {
                tracing::debug!(%provider, "Settler stopped, dropping request");
            }
        }
    }

    /// Start the dispatch loop. Only the first call starts it; later calls
    /// return `None`.
    pub fn start_dispatcher(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let queue = self.settle_queue_rx.lock().take()?;
        Some(tokio::spawn(Arc::clone(self).listen_for_settlement_requests(queue)))
    }

    async fn listen_for_settlement_requests(self: Arc<Self>, mut queue: mpsc::Receiver<ReceivedPromise>) {
        tracing::info!("Listening for settlement events");
        let mut shutdown = self.shutdown_signal();

        loop {
            let item = tokio::select! {
                () = stopped(&mut shutdown) => break,
                item = queue.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let chain_id = item.promise.chain_id;
            let Some(channel) = self
                .collaborators
                .channel_provider
                .get(chain_id, &item.provider, &item.hermes_id)
            else {
                tracing::debug!(provider = %item.provider, "Channel gone, dropping settle request");
                continue;
            };

            let settler = Arc::clone(&self);
            tokio::spawn(async move {
                let provider = item.provider;
                let request = SettleRequest {
                    provider,
                    hermes_id: item.hermes_id,
                    promise: item.promise,
                    beneficiary: item.beneficiary,
                    settled: channel.settled,
                };
                match settler.settle(Submission::Rebalance, request).await {
                    Ok(()) => {}
                    Err(PaysettleError::AlreadySettling(_)) => {
                        tracing::debug!(%provider, "Settlement already running");
                    }
                    Err(e) => tracing::error!(%provider, error = %e, "Could not settle promise"),
                }
            });
        }

        tracing::info!("Stopped listening for settlement events");
    }
}
