//! Error types for the paysettle settlement engine.
//!
//! All errors use the `PS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Identity / addressing errors
//! - 2xx: Channel / state errors
//! - 3xx: Promise / crypto errors
//! - 4xx: Fee errors
//! - 5xx: Submission / confirmation errors
//! - 6xx: Settlement outcome errors
//! - 7xx: Withdrawal errors
//! - 8xx: Collaborator / storage errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Address, ChainId, Identity};

/// Central error enum for all paysettle operations.
#[derive(Debug, Error)]
pub enum PaysettleError {
    // =================================================================
    // Identity / addressing (1xx)
    // =================================================================
    /// A hex address or id could not be parsed.
    #[error("PS_ERR_100: Invalid address {value}: {reason}")]
    InvalidAddress { value: String, reason: String },

    /// The registration status lookup failed.
    #[error("PS_ERR_101: Could not check registration status for {identity}: {reason}")]
    RegistrationLookup { identity: Identity, reason: String },

    /// No account for this identity in the keystore.
    #[error("PS_ERR_102: Unknown account {0}")]
    UnknownAccount(Identity),

    // =================================================================
    // Channel / state (2xx)
    // =================================================================
    /// The channel provider has no channel for this (identity, hermes) pair.
    #[error("PS_ERR_200: Channel not found for {identity} with hermes {hermes_id}")]
    ChannelNotFound { identity: Identity, hermes_id: Address },

    // =================================================================
    // Promise / crypto (3xx)
    // =================================================================
    /// The promise secret `R` is not valid hex.
    #[error("PS_ERR_300: Could not decode R: {0}")]
    Decode(String),

    /// Signing a hash with the keystore failed.
    #[error("PS_ERR_301: Signing failed for {identity}: {reason}")]
    Signing { identity: Identity, reason: String },

    // =================================================================
    // Fees (4xx)
    // =================================================================
    /// Fetching the current settlement fees failed.
    #[error("PS_ERR_400: Could not fetch settle fees on {chain_id}: {reason}")]
    FeeFetchFailed { chain_id: ChainId, reason: String },

    /// Resolving the hermes endpoint failed.
    #[error("PS_ERR_401: Could not get hermes URL for {hermes_id}: {reason}")]
    HermesUrl { hermes_id: Address, reason: String },

    /// Hermes refused or failed to re-sign the promise with the new fee.
    #[error("PS_ERR_402: Could not update promise fee: {reason}")]
    FeeUpdateFailed { reason: String },

    /// Computing the hermes fee for the settle amount failed.
    #[error("PS_ERR_403: Could not calculate hermes fee for {hermes_id}: {reason}")]
    HermesFeeFailed { hermes_id: Address, reason: String },

    // =================================================================
    // Submission / confirmation (5xx)
    // =================================================================
    /// Subscribing to the on-chain "promise settled" stream failed.
    #[error("PS_ERR_500: Could not subscribe to promise settlement for {provider}: {reason}")]
    SubscriptionFailed { provider: Identity, reason: String },

    /// The transaction layer rejected the settlement call.
    #[error("PS_ERR_501: Settlement submission failed for {provider}: {reason}")]
    SubmissionFailed { provider: Identity, reason: String },

    /// No confirmation observed within the wait window. The transaction may
    /// still land on-chain.
    #[error("PS_ERR_502: Settle timeout for {provider}")]
    SettleTimeout { provider: Identity },

    // =================================================================
    // Settlement outcome (6xx)
    // =================================================================
    /// No channel exists for the identity/hermes pair. A no-op, not a failure.
    #[error("PS_ERR_600: Nothing to settle for the given provider")]
    NothingToSettle,

    /// The settle guard for this identity is already held.
    #[error("PS_ERR_601: Provider {0} already has settlement in progress")]
    AlreadySettling(Identity),

    /// Combined fees would eat the whole settlement.
    #[error(
        "PS_ERR_602: Settlement fees exceed earning amount. Please provide more service and try again. Current earnings: {earnings}, current fees: {fees}"
    )]
    EarningsBelowFees { earnings: Decimal, fees: Decimal },

    // =================================================================
    // Withdrawal (7xx)
    // =================================================================
    /// Withdrawals are only served on the configured L2 chain.
    #[error("PS_ERR_700: Can only withdraw from chain with ID {expected}, requested with {actual}")]
    WithdrawalChainMismatch { expected: ChainId, actual: ChainId },

    /// The consumer channel holds nothing.
    #[error("PS_ERR_701: Nothing to withdraw. Balance in channel {channel} is {balance}")]
    NothingToWithdraw { channel: Address, balance: Decimal },

    /// The settlement fee is larger than the withdrawal itself.
    #[error("PS_ERR_702: Amount too small for withdrawal. Need at least {needed}, have {available}")]
    WithdrawalBelowFees { needed: Decimal, available: Decimal },

    /// Hermes pay-and-settle call failed.
    #[error("PS_ERR_703: Could not call hermes pay and settle: {reason}")]
    PayAndSettle { reason: String },

    /// Address resolution for the withdrawal failed.
    #[error("PS_ERR_704: Could not resolve {what}: {reason}")]
    AddressResolution { what: &'static str, reason: String },

    // =================================================================
    // Collaborator / storage (8xx)
    // =================================================================
    /// A stored promise could not be read.
    #[error("PS_ERR_800: Promise storage error: {0}")]
    PromiseStorage(String),

    /// Appending to the settlement history failed.
    #[error("PS_ERR_801: Could not store settlement history: {0}")]
    HistoryStorage(String),

    /// Opaque failure reported by an external collaborator.
    #[error("PS_ERR_802: Upstream error: {0}")]
    Upstream(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("PS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid values, unparsable input).
    #[error("PS_ERR_901: Configuration error: {0}")]
    Configuration(String),
}

impl PaysettleError {
    /// `true` for the "no channel, no-op" outcome.
    #[must_use]
    pub fn is_nothing_to_settle(&self) -> bool {
        matches!(self, Self::NothingToSettle)
    }

    /// `true` if the settle guard was already held.
    #[must_use]
    pub fn is_already_settling(&self) -> bool {
        matches!(self, Self::AlreadySettling(_))
    }

    /// `true` if the confirmation wait timed out.
    #[must_use]
    pub fn is_settle_timeout(&self) -> bool {
        matches!(self, Self::SettleTimeout { .. })
    }

    /// `true` if a channel lookup reported "not found".
    #[must_use]
    pub fn is_channel_not_found(&self) -> bool {
        matches!(self, Self::ChannelNotFound { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PaysettleError>;
