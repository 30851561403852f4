//! Settlement records: fee quotes, the on-chain "promise settled" event, and
//! the append-only settlement history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Address, ChannelId, Identity, Promise, TxHash};

/// Current settlement fee quote from the transactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleFees {
    /// Fee the transactor charges to submit a settlement.
    pub fee: Decimal,
    /// When this quote stops being honoured.
    pub valid_until: DateTime<Utc>,
}

/// On-chain confirmation that a promise was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseSettledEvent {
    pub tx_hash: TxHash,
    pub channel_id: ChannelId,
    pub beneficiary: Address,
    pub amount_sent_to_beneficiary: Decimal,
    pub fees: Decimal,
}

/// Immutable record of one confirmed settlement.
///
/// Exactly one entry is appended per confirmed settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementHistoryEntry {
    pub id: Uuid,
    pub tx_hash: TxHash,
    pub provider_id: Identity,
    pub hermes_id: Address,
    pub channel_id: ChannelId,
    pub time: DateTime<Utc>,
    /// The promise that was submitted (post fee update).
    pub promise: Promise,
    pub beneficiary: Address,
    /// Amount transferred to the beneficiary.
    pub amount: Decimal,
    /// Fees withheld on-chain.
    pub fees: Decimal,
    /// Running total settled on the channel after this settlement.
    pub total_settled: Decimal,
}

impl SettlementHistoryEntry {
    /// Build an entry from a confirmation event.
    #[must_use]
    pub fn from_event(
        event: &PromiseSettledEvent,
        provider_id: Identity,
        hermes_id: Address,
        promise: Promise,
        beneficiary: Address,
        total_settled: Decimal,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tx_hash: event.tx_hash,
            provider_id,
            hermes_id,
            channel_id: ChannelId::for_provider(&provider_id, &hermes_id),
            time: Utc::now(),
            promise,
            beneficiary,
            amount: event.amount_sent_to_beneficiary,
            fees: event.fees,
            total_settled,
        }
    }
}
