//! Provider channel snapshot.
//!
//! A [`Channel`] is a read-only view of on-chain channel state between a
//! provider and a hermes, plus the latest unredeemed promise. It is owned by
//! an external channel cache; the engine only reads it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, ChainId, Identity, StoredPromise};

/// Snapshot of a provider ↔ hermes channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub chain_id: ChainId,
    /// The provider owning the channel.
    pub identity: Identity,
    pub hermes_id: Address,
    /// Where settled funds go by default.
    pub beneficiary: Address,
    /// Provider stake locked in the channel.
    pub stake: Decimal,
    /// Hermes-side balance backing the channel.
    pub balance: Decimal,
    /// Total settled to date.
    pub settled: Decimal,
    /// Latest promise received for this channel.
    pub last_promise: StoredPromise,
}

impl Channel {
    /// Amount promised so far.
    #[must_use]
    pub fn promised(&self) -> Decimal {
        self.last_promise.promise.amount
    }

    /// `balance + settled`.
    #[must_use]
    pub fn available_balance(&self) -> Decimal {
        self.balance + self.settled
    }

    /// Promised but not yet settled: `promised - settled`.
    #[must_use]
    pub fn unsettled_balance(&self) -> Decimal {
        self.promised() - self.settled
    }

    /// What would remain if every promise were redeemed:
    /// `available_balance - promised`.
    #[must_use]
    pub fn current_balance(&self) -> Decimal {
        self.available_balance() - self.promised()
    }
}

/// Dummy channels for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Channel {
    /// A channel with the given figures and a promise for `promised`.
    pub fn dummy(
        identity: Identity,
        hermes_id: Address,
        stake: Decimal,
        balance: Decimal,
        settled: Decimal,
        promised: Decimal,
    ) -> Self {
        let chain_id = ChainId(1);
        Self {
            chain_id,
            identity,
            hermes_id,
            beneficiary: Address([0xbe; 20]),
            stake,
            balance,
            settled,
            last_promise: StoredPromise::dummy(identity, hermes_id, chain_id, promised),
        }
    }
}
