//! The hermes promise settler.
//!
//! [`HermesPromiseSettler`] owns the per-identity state store, the settle
//! request queue, the shutdown signal and the random source used by
//! withdrawals. Every settlement flows through [`HermesPromiseSettler::settle`]:
//!
//! ```text
//! guard ─► fee update ─► fee check ─► subscribe ─► submit ─┬─► confirmed ─► history
//!                                                          ├─► timed out ─► SettleTimeout
//!                                                          └─► shutdown  ─► Ok
//! ```
//!
//! The guard is released on every exit. After submission it is owned by the
//! confirmation waiter task, together with the settled-event subscription.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use paysettle_types::{
    Address, ChainId, Channel, Identity, PaysettleError, Promise, PromiseSettledEvent, Result,
    SettlementHistoryEntry, SettlerConfig,
};
use rand::{SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};

use crate::{
    collaborators::{ChainClient, ChannelProvider, Collaborators, SettlementHistoryStorage, Transactor},
    confirm::{ConfirmationOutcome, SettledEventSubscription, await_confirmation},
    dispatcher::ReceivedPromise,
    fee::FeeUpdater,
    state::{SettleGuard, SettlementStateStore},
};

/// Which transactor call submits the settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Settle and rebalance to the channel beneficiary.
    Rebalance,
    /// Settle to an explicit beneficiary.
    WithBeneficiary(Address),
    /// Settle into the provider's stake.
    IntoStake,
    /// Pay-and-settle with a signed beneficiary payload (withdrawals).
    PayAndSettle {
        beneficiary: Address,
        signature: String,
    },
}

/// Inputs of one settlement run.
#[derive(Debug, Clone)]
pub struct SettleRequest {
    pub provider: Identity,
    pub hermes_id: Address,
    /// Promise with its secret attached.
    pub promise: Promise,
    pub beneficiary: Address,
    /// Amount already settled on the channel.
    pub settled: Decimal,
}

/// Coordinates settlement of hermes promises for the node's identities.
pub struct HermesPromiseSettler {
    pub(crate) config: SettlerConfig,
    pub(crate) state: SettlementStateStore,
    pub(crate) collaborators: Collaborators,
    pub(crate) fee_updater: FeeUpdater,
    pub(crate) settle_queue: mpsc::Sender<ReceivedPromise>,
    pub(crate) settle_queue_rx: Mutex<Option<mpsc::Receiver<ReceivedPromise>>>,
    shutdown: watch::Sender<bool>,
    pub(crate) rng: Mutex<StdRng>,
}

impl HermesPromiseSettler {
    /// Build a settler. The configuration is validated first.
    pub fn new(collaborators: Collaborators, config: SettlerConfig) -> Result<Self> {
        config.validate()?;

        let (settle_queue, settle_queue_rx) = mpsc::channel(config.settle_queue_capacity);
        let (shutdown, _) = watch::channel(false);
        let fee_updater = FeeUpdater::new(
            Arc::clone(&collaborators.transactor),
            Arc::clone(&collaborators.hermes_url_resolver),
            Arc::clone(&collaborators.hermes_caller_factory),
        );

        Ok(Self {
            config,
            state: SettlementStateStore::new(),
            collaborators,
            fee_updater,
            settle_queue,
            settle_queue_rx: Mutex::new(Some(settle_queue_rx)),
            shutdown,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SettlerConfig {
        &self.config
    }

    /// Per-identity settlement state.
    #[must_use]
    pub fn state(&self) -> &SettlementStateStore {
        &self.state
    }

    /// Hermes fee rate in basis points.
    pub async fn hermes_fee(&self, chain_id: ChainId, hermes_id: &Address) -> Result<u16> {
        self.collaborators.chain.hermes_fee(chain_id, hermes_id).await
    }

    /// Load registration state for `id`. Intended for service start.
    pub async fn load_initial_state(&self, chain_id: ChainId, id: &Identity) -> Result<()> {
        self.state
            .load(chain_id, id, self.collaborators.registration.as_ref())
            .await
    }

    /// Settle the latest promise and rebalance to the channel beneficiary.
    pub async fn force_settle(&self, chain_id: ChainId, provider: Identity, hermes_id: Address) -> Result<()> {
        let channel = self.settleable_channel(chain_id, &provider, &hermes_id)?;
        let request = SettleRequest {
            provider,
            hermes_id,
            promise: channel.last_promise.promise_with_secret()?,
            beneficiary: channel.beneficiary,
            settled: channel.settled,
        };
        self.settle(Submission::Rebalance, request).await
    }

    /// Settle the latest promise to `beneficiary`.
    pub async fn settle_with_beneficiary(
        &self,
        chain_id: ChainId,
        provider: Identity,
        beneficiary: Address,
        hermes_id: Address,
    ) -> Result<()> {
        let channel = self.settleable_channel(chain_id, &provider, &hermes_id)?;
        let request = SettleRequest {
            provider,
            hermes_id,
            promise: channel.last_promise.promise_with_secret()?,
            beneficiary,
            settled: channel.settled,
        };
        self.settle(Submission::WithBeneficiary(beneficiary), request).await
    }

    /// Settle the latest promise into the provider's stake.
    pub async fn settle_into_stake(&self, chain_id: ChainId, provider: Identity, hermes_id: Address) -> Result<()> {
        let channel = self.settleable_channel(chain_id, &provider, &hermes_id)?;
        let request = SettleRequest {
            provider,
            hermes_id,
            promise: channel.last_promise.promise_with_secret()?,
            beneficiary: channel.beneficiary,
            settled: channel.settled,
        };
        self.settle(Submission::IntoStake, request).await
    }

    fn settleable_channel(&self, chain_id: ChainId, provider: &Identity, hermes_id: &Address) -> Result<Channel> {
        self.collaborators
            .channel_provider
            .get(chain_id, provider, hermes_id)
            .ok_or(PaysettleError::NothingToSettle)
    }

    /// Run one settlement end to end.
    ///
    /// Fails fast with [`PaysettleError::AlreadySettling`] if the identity
    /// is busy. Returns once the confirmation wait is over.
    pub async fn settle(&self, submission: Submission, request: SettleRequest) -> Result<()> {
        let SettleRequest {
            provider,
            hermes_id,
            promise,
            beneficiary,
            settled,
        } = request;

        let guard = self.state.try_acquire(&provider)?;

        let updated = self
            .fee_updater
            .update_with_latest_fee(&hermes_id, &promise)
            .await
            .inspect_err(|e| tracing::error!(%provider, error = %e, "Could not update promise fee"))?;

        let amount_to_settle = updated.amount - settled;

        let hermes_fee = self
            .collaborators
            .chain
            .calculate_hermes_fee(updated.chain_id, &hermes_id, amount_to_settle)
            .await
            .map_err(|e| {
                tracing::error!(%provider, error = %e, "Could not calculate hermes fee");
                PaysettleError::HermesFeeFailed {
                    hermes_id,
                    reason: e.to_string(),
                }
            })?;

        let total_fees = hermes_fee + updated.fee;
        if total_fees > amount_to_settle {
            tracing::error!(
                %provider,
                amount_to_settle = %amount_to_settle,
                promise_amount = %updated.amount,
                %settled,
                transactor_fee = %updated.fee,
                %hermes_fee,
                %total_fees,
                "Earned amount too small for settling"
            );
            return Err(PaysettleError::EarningsBelowFees {
                earnings: amount_to_settle,
                fees: total_fees,
            });
        }

        self.submit_and_confirm(guard, submission, hermes_id, updated, Some(beneficiary))
            .await
    }

    /// Subscribe, submit, and wait for the outcome.
    ///
    /// With `history_beneficiary` set, a confirmed settlement appends one
    /// history entry. The guard travels with the waiter task.
    pub(crate) async fn submit_and_confirm(
        &self,
        guard: SettleGuard,
        submission: Submission,
        hermes_id: Address,
        promise: Promise,
        history_beneficiary: Option<Address>,
    ) -> Result<()> {
        let provider = *guard.identity();

        let subscription = self
            .collaborators
            .chain
            .subscribe_to_promise_settled(promise.chain_id, &provider, &hermes_id)
            .await
            .map_err(|e| {
                tracing::error!(%provider, error = %e, "Could not subscribe to promise settlement");
                PaysettleError::SubscriptionFailed {
                    provider,
                    reason: e.to_string(),
                }
            })?;

        let wait = ConfirmationWait {
            guard,
            subscription,
            shutdown: self.shutdown.subscribe(),
            max_wait: self.config.max_wait_for_settlement,
            history: history_beneficiary.map(|beneficiary| HistoryRecorder {
                chain_id: promise.chain_id,
                hermes_id,
                promise: promise.clone(),
                beneficiary,
                channel_provider: Arc::clone(&self.collaborators.channel_provider),
                storage: Arc::clone(&self.collaborators.history),
            }),
        };
        let waiter = tokio::spawn(wait.run());

        if let Err(e) = self.submit(&submission, &hermes_id, &provider, &promise).await {
            // Dropping the waiter future releases the guard and cancels the
            // subscription.
            waiter.abort();
            let _ = waiter.await;
            tracing::error!(%provider, error = %e, "Could not settle promise");
            return Err(PaysettleError::SubmissionFailed {
                provider,
                reason: e.to_string(),
            });
        }

        waiter
            .await
            .map_err(|e| PaysettleError::Internal(format!("confirmation waiter for {provider} failed: {e}")))?
    }

    async fn submit(
        &self,
        submission: &Submission,
        hermes_id: &Address,
        provider: &Identity,
        promise: &Promise,
    ) -> Result<()> {
        let transactor = &self.collaborators.transactor;
        match submission {
            Submission::Rebalance => transactor.settle_and_rebalance(hermes_id, provider, promise).await,
            Submission::WithBeneficiary(beneficiary) => {
                transactor
                    .settle_with_beneficiary(provider, beneficiary, hermes_id, promise)
                    .await
            }
            Submission::IntoStake => transactor.settle_into_stake(hermes_id, provider, promise).await,
            Submission::PayAndSettle {
                beneficiary,
                signature,
            } => {
                transactor
                    .pay_and_settle(hermes_id, provider, promise, beneficiary, signature)
                    .await
            }
        }
    }

    /// Fire the shutdown signal. Returns `true` only for the call that
    /// actually stopped the settler.
    pub fn shutdown(&self) -> bool {
        let fired = self.shutdown.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if fired {
            tracing::info!("Hermes promise settler stopping");
        }
        fired
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Background half of a settlement: waits for the outcome and owns the
/// guard and subscription until it ends.
struct ConfirmationWait {
    guard: SettleGuard,
    subscription: SettledEventSubscription,
    shutdown: watch::Receiver<bool>,
    max_wait: Duration,
    history: Option<HistoryRecorder>,
}

impl ConfirmationWait {
    async fn run(self) -> Result<()> {
        let Self {
            guard,
            mut subscription,
            mut shutdown,
            max_wait,
            history,
        } = self;
        let provider = *guard.identity();

        let outcome = await_confirmation(&mut subscription, max_wait, &mut shutdown).await;
        drop(subscription);
        drop(guard);

        match &outcome {
            ConfirmationOutcome::Confirmed(_) => tracing::info!(%provider, "Settling complete"),
            ConfirmationOutcome::TimedOut => tracing::info!(%provider, "Settle timeout"),
            ConfirmationOutcome::Closed => {
                tracing::debug!(%provider, "Settlement event stream closed");
            }
            ConfirmationOutcome::Shutdown => {
                tracing::debug!(%provider, "Stopped waiting for settlement");
            }
        }

        let Some(event) = outcome.into_result(provider)? else {
            return Ok(());
        };
        if let Some(history) = history {
            history.record(provider, &event).await;
        }
        Ok(())
    }
}

/// Appends the history entry for a confirmed settlement.
struct HistoryRecorder {
    chain_id: ChainId,
    hermes_id: Address,
    promise: Promise,
    beneficiary: Address,
    channel_provider: Arc<dyn ChannelProvider>,
    storage: Arc<dyn SettlementHistoryStorage>,
}

impl HistoryRecorder {
    async fn record(self, provider: Identity, event: &PromiseSettledEvent) {
        let total_settled = match self
            .channel_provider
            .fetch(self.chain_id, &provider, &self.hermes_id)
            .await
        {
            Ok(channel) => {
                tracing::info!(%provider, "Resync success");
                channel.settled
            }
            Err(e) => {
                tracing::error!(%provider, error = %e, "Resync failed");
                self.channel_provider
                    .get(self.chain_id, &provider, &self.hermes_id)
                    .map_or(Decimal::ZERO, |channel| channel.settled)
            }
        };

        let entry = SettlementHistoryEntry::from_event(
            event,
            provider,
            self.hermes_id,
            self.promise,
            self.beneficiary,
            total_settled,
        );
        let stored = self.storage.store(entry).await.map_err(|e| match e {
            PaysettleError::HistoryStorage(_) => e,
            other => PaysettleError::HistoryStorage(other.to_string()),
        });
        if let Err(e) = stored {
            tracing::error!(%provider, error = %e, "Could not store settlement history");
        }
    }
}
