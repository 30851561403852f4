//! Interfaces of the external collaborators the settler drives.
//!
//! The engine owns none of these: chain access, transaction submission,
//! hermes HTTP calls, storage, and key management all live behind these
//! traits. Implementations report failures as [`PaysettleError`] values;
//! the engine wraps them with operation context and never retries.
//!
//! [`PaysettleError`]: paysettle_types::PaysettleError

use std::sync::Arc;

use async_trait::async_trait;
use paysettle_types::{
    Address, ChainId, Channel, ChannelId, ExchangeMessage, Identity, Promise, RegistrationStatus,
    Result, SettleFees, SettlementHistoryEntry, StoredPromise,
};
use rust_decimal::Decimal;

use crate::confirm::SettledEventSubscription;

/// Identity registry lookups.
#[async_trait]
pub trait RegistrationStatusProvider: Send + Sync {
    async fn registration_status(&self, chain_id: ChainId, id: &Identity) -> Result<RegistrationStatus>;
}

/// Provider channel cache.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Cached lookup; never blocks on the network.
    fn get(&self, chain_id: ChainId, id: &Identity, hermes_id: &Address) -> Option<Channel>;

    /// Forced refresh from chain. A missing channel is reported as
    /// [`PaysettleError::ChannelNotFound`](paysettle_types::PaysettleError::ChannelNotFound).
    async fn fetch(&self, chain_id: ChainId, id: &Identity, hermes_id: &Address) -> Result<Channel>;
}

/// Settlement transaction submission.
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn settle_and_rebalance(&self, hermes_id: &Address, provider_id: &Identity, promise: &Promise) -> Result<()>;

    async fn settle_with_beneficiary(
        &self,
        provider_id: &Identity,
        beneficiary: &Address,
        hermes_id: &Address,
        promise: &Promise,
    ) -> Result<()>;

    async fn pay_and_settle(
        &self,
        hermes_id: &Address,
        provider_id: &Identity,
        promise: &Promise,
        beneficiary: &Address,
        beneficiary_signature: &str,
    ) -> Result<()>;

    async fn settle_into_stake(&self, hermes_id: &Address, provider_id: &Identity, promise: &Promise) -> Result<()>;

    /// Current settlement fee quote for the chain.
    async fn fetch_settle_fees(&self, chain_id: ChainId) -> Result<SettleFees>;
}

/// Chain reads and event subscriptions.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Subscribe to "promise settled" events for (chain, provider, hermes).
    /// The subscription delivers at most the confirmation, or closes.
    async fn subscribe_to_promise_settled(
        &self,
        chain_id: ChainId,
        provider_id: &Identity,
        hermes_id: &Address,
    ) -> Result<SettledEventSubscription>;

    /// Hermes fee rate in basis points.
    async fn hermes_fee(&self, chain_id: ChainId, hermes_id: &Address) -> Result<u16>;

    /// Hermes fee charged for settling `value`.
    async fn calculate_hermes_fee(&self, chain_id: ChainId, hermes_id: &Address, value: Decimal) -> Result<Decimal>;

    /// Token balance held by `holder`.
    async fn token_balance(&self, chain_id: ChainId, token: &Address, holder: &Address) -> Result<Decimal>;
}

/// Resolves the hermes HTTP endpoint for a (chain, hermes) pair.
#[async_trait]
pub trait HermesUrlResolver: Send + Sync {
    async fn hermes_url(&self, chain_id: ChainId, hermes_id: &Address) -> Result<String>;
}

/// HTTP client bound to one hermes endpoint.
#[async_trait]
pub trait HermesCaller: Send + Sync {
    /// Ask hermes to re-issue `promise` carrying `new_fee`.
    async fn update_promise_fee(&self, promise: &Promise, new_fee: Decimal) -> Result<Promise>;
}

/// Builds a [`HermesCaller`] for a resolved URL.
pub type HermesCallerFactory = Arc<dyn Fn(&str) -> Arc<dyn HermesCaller> + Send + Sync>;

/// Hermes pay-and-settle request path used by withdrawals.
#[async_trait]
pub trait PaySettler: Send + Sync {
    /// Resolves once hermes has accepted (or refused) the exchange message.
    async fn pay_and_settle(
        &self,
        r: &[u8],
        message: &ExchangeMessage,
        provider_id: &Identity,
        session_id: &str,
    ) -> Result<()>;
}

/// Deterministic address lookups.
#[async_trait]
pub trait AddressProvider: Send + Sync {
    /// Consumer channel contract address for `id`.
    async fn channel_address(&self, chain_id: ChainId, id: &Identity) -> Result<Address>;

    /// Currently active hermes on the chain.
    async fn active_hermes(&self, chain_id: ChainId) -> Result<Address>;

    /// Settlement token contract.
    async fn token_address(&self, chain_id: ChainId) -> Result<Address>;
}

/// Account enumeration and hash signing.
pub trait Keystore: Send + Sync {
    fn accounts(&self) -> Vec<Identity>;

    fn sign_hash(&self, account: &Identity, hash: &[u8; 32]) -> Result<Vec<u8>>;
}

/// Append-only settlement history sink.
#[async_trait]
pub trait SettlementHistoryStorage: Send + Sync {
    async fn store(&self, entry: SettlementHistoryEntry) -> Result<()>;
}

/// Stored promise lookup.
#[async_trait]
pub trait PromiseStorage: Send + Sync {
    async fn get(&self, chain_id: ChainId, channel_id: &ChannelId) -> Result<StoredPromise>;
}

/// Everything the settler talks to, bundled for construction.
#[derive(Clone)]
pub struct Collaborators {
    pub transactor: Arc<dyn Transactor>,
    pub promise_storage: Arc<dyn PromiseStorage>,
    pub pay_settler: Arc<dyn PaySettler>,
    pub address_provider: Arc<dyn AddressProvider>,
    pub hermes_caller_factory: HermesCallerFactory,
    pub hermes_url_resolver: Arc<dyn HermesUrlResolver>,
    pub channel_provider: Arc<dyn ChannelProvider>,
    pub chain: Arc<dyn ChainClient>,
    pub registration: Arc<dyn RegistrationStatusProvider>,
    pub keystore: Arc<dyn Keystore>,
    pub history: Arc<dyn SettlementHistoryStorage>,
}
