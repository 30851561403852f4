//! Re-pricing a promise against the live settlement fee.
//!
//! Before submission the promise fee is refreshed: the transactor quotes the
//! current fee, hermes re-signs the promise carrying it, and the original
//! secret is put back (hermes' reply is not trusted to carry `R`).

use std::sync::Arc;

use paysettle_types::{Address, ChainId, PaysettleError, Promise, Result};

use crate::collaborators::{HermesCaller, HermesCallerFactory, HermesUrlResolver, Transactor};

/// Fetches fees and asks hermes to re-sign promises with them.
#[derive(Clone)]
pub struct FeeUpdater {
    transactor: Arc<dyn Transactor>,
    url_resolver: Arc<dyn HermesUrlResolver>,
    caller_factory: HermesCallerFactory,
}

impl FeeUpdater {
    #[must_use]
    pub fn new(
        transactor: Arc<dyn Transactor>,
        url_resolver: Arc<dyn HermesUrlResolver>,
        caller_factory: HermesCallerFactory,
    ) -> Self {
        Self {
            transactor,
            url_resolver,
            caller_factory,
        }
    }

    /// Return `promise` re-signed by hermes with the current settle fee.
    ///
    /// Failures are propagated as-is, never retried.
    pub async fn update_with_latest_fee(&self, hermes_id: &Address, promise: &Promise) -> Result<Promise> {
        tracing::debug!(hermes = %hermes_id, "Updating promise with latest fee");

        let fees = self
            .transactor
            .fetch_settle_fees(promise.chain_id)
            .await
            .map_err(|e| PaysettleError::FeeFetchFailed {
                chain_id: promise.chain_id,
                reason: e.to_string(),
            })?;

        let caller = self.hermes_caller(promise.chain_id, hermes_id).await?;

        let mut updated = caller
            .update_promise_fee(promise, fees.fee)
            .await
            .map_err(|e| PaysettleError::FeeUpdateFailed {
                reason: e.to_string(),
            })?;
        updated.r.clone_from(&promise.r);

        tracing::debug!(hermes = %hermes_id, fee = %updated.fee, "Promise updated with latest fee");
        Ok(updated)
    }

    async fn hermes_caller(&self, chain_id: ChainId, hermes_id: &Address) -> Result<Arc<dyn HermesCaller>> {
        let url = self
            .url_resolver
            .hermes_url(chain_id, hermes_id)
            .await
            .map_err(|e| PaysettleError::HermesUrl {
                hermes_id: *hermes_id,
                reason: e.to_string(),
            })?;
        Ok((self.caller_factory)(&url))
    }
}
