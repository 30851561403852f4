//! Configuration for the hermes promise settler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ChainId, PaysettleError, Result, constants};

/// Settler configuration, threaded into the engine at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlerConfig {
    /// Fraction of the available balance in `(0, 1]` used by the
    /// auto-settlement policy.
    pub threshold: f64,
    /// How long to wait for an on-chain confirmation after submission.
    pub max_wait_for_settlement: Duration,
    /// Chain the node operates on (used when loading initial state).
    pub chain_id: ChainId,
    /// L1 chain id, embedded in pay-and-settle beneficiary payloads.
    pub l1_chain_id: ChainId,
    /// L2 chain id; withdrawals are only served here.
    pub l2_chain_id: ChainId,
    /// Capacity of the settlement request queue.
    #[serde(default = "default_queue_capacity")]
    pub settle_queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    constants::DEFAULT_SETTLE_QUEUE_CAPACITY
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self {
            threshold: constants::DEFAULT_SETTLE_THRESHOLD,
            max_wait_for_settlement: Duration::from_secs(
                constants::DEFAULT_MAX_WAIT_FOR_SETTLEMENT_SECS,
            ),
            chain_id: ChainId(constants::DEFAULT_CHAIN_ID),
            l1_chain_id: ChainId(constants::DEFAULT_L1_CHAIN_ID),
            l2_chain_id: ChainId(constants::DEFAULT_L2_CHAIN_ID),
            settle_queue_capacity: constants::DEFAULT_SETTLE_QUEUE_CAPACITY,
        }
    }
}

impl SettlerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| PaysettleError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(PaysettleError::Configuration(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_wait_for_settlement.is_zero() {
            return Err(PaysettleError::Configuration(
                "max_wait_for_settlement must be non-zero".into(),
            ));
        }
        if self.settle_queue_capacity == 0 {
            return Err(PaysettleError::Configuration(
                "settle_queue_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Builder-style override of the confirmation wait.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_for_settlement = max_wait;
        self
    }

    /// Builder-style override of the threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}
