//! System-wide constants for the paysettle settlement engine.

/// One whole token in base units (18 decimals).
pub const ONE_TOKEN: u64 = 1_000_000_000_000_000_000;

/// Default fraction of the available balance that unsettled earnings must
/// reach before auto-settlement triggers.
pub const DEFAULT_SETTLE_THRESHOLD: f64 = 0.1;

/// Default upper bound on waiting for a settlement confirmation, in seconds.
pub const DEFAULT_MAX_WAIT_FOR_SETTLEMENT_SECS: u64 = 600;

/// Default capacity of the settlement request queue. Sized for a handful of
/// concurrently active identities.
pub const DEFAULT_SETTLE_QUEUE_CAPACITY: usize = 5;

/// Default chain the node operates on.
pub const DEFAULT_CHAIN_ID: i64 = 137;

/// Default L1 chain id (used in the pay-and-settle beneficiary payload).
pub const DEFAULT_L1_CHAIN_ID: i64 = 1;

/// Default L2 chain id (the only chain withdrawals are served on).
pub const DEFAULT_L2_CHAIN_ID: i64 = 137;

/// Length of a promise secret `R` and of an agreement id, in bytes.
pub const SECRET_LEN: usize = 32;
