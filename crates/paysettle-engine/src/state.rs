//! Per-identity settlement state and the settle guard.
//!
//! Every identity has a [`SettlementState`] `{registered, settle_in_progress}`
//! kept in one map behind a read/write lock. The `settle_in_progress` flag is
//! the only exclusive-mutation resource in the engine: it is flipped with
//! test-and-set semantics under the write lock, and the [`SettleGuard`]
//! returned by [`SettlementStateStore::try_acquire`] clears it again on drop.

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use paysettle_types::{ChainId, Identity, PaysettleError, RegistrationStatus, Result};

use crate::collaborators::RegistrationStatusProvider;

/// Settlement bookkeeping for one identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementState {
    pub registered: bool,
    pub settle_in_progress: bool,
}

/// Shared map of [`SettlementState`] keyed by identity.
///
/// Cloning is cheap and yields a handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct SettlementStateStore {
    inner: Arc<RwLock<HashMap<Identity, SettlementState>>>,
    /// One async lock per identity; registry lookups for the same identity
    /// never overlap.
    loads: Arc<Mutex<HashMap<Identity, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SettlementStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the state for `id`, if it was ever observed.
    #[must_use]
    pub fn get(&self, id: &Identity) -> Option<SettlementState> {
        self.inner.read().get(id).copied()
    }

    /// Whether a settlement or withdrawal is in flight for `id`.
    #[must_use]
    pub fn is_settling(&self, id: &Identity) -> bool {
        self.inner
            .read()
            .get(id)
            .is_some_and(|s| s.settle_in_progress)
    }

    /// Unconditionally set the in-progress flag, creating state if needed.
    pub fn set_settling(&self, id: &Identity, settling: bool) {
        self.inner.write().entry(*id).or_default().settle_in_progress = settling;
    }

    /// Mark `id` registered, creating state if needed. The in-progress flag
    /// is left untouched.
    pub fn mark_registered(&self, id: &Identity) {
        self.inner.write().entry(*id).or_default().registered = true;
    }

    /// Load the registration status of `id` once.
    ///
    /// A registered identity that is already known is skipped without a
    /// lookup. Otherwise the registry is consulted; only a `Registered`
    /// answer creates or updates state, and an in-progress flag set in the
    /// meantime is preserved. Concurrent loads of the same identity run one
    /// after the other, so the registry is asked at most once.
    pub async fn load(
        &self,
        chain_id: ChainId,
        id: &Identity,
        registry: &dyn RegistrationStatusProvider,
    ) -> Result<()> {
        let gate = Arc::clone(self.loads.lock().entry(*id).or_default());
        let _loading = gate.lock().await;

        if self.get(id).is_some_and(|s| s.registered) {
            tracing::info!(identity = %id, "State already loaded, skipping");
            return Ok(());
        }

        let status = registry
            .registration_status(chain_id, id)
            .await
            .map_err(|e| PaysettleError::RegistrationLookup {
                identity: *id,
                reason: e.to_string(),
            })?;

        if status != RegistrationStatus::Registered {
            tracing::info!(identity = %id, %status, "Provider not registered, skipping");
            return Ok(());
        }

        self.mark_registered(id);
        Ok(())
    }

    /// Test-and-set the in-progress flag.
    ///
    /// # Errors
    /// [`PaysettleError::AlreadySettling`] if the flag is already set. The
    /// caller is never queued.
    pub fn try_acquire(&self, id: &Identity) -> Result<SettleGuard> {
        let mut map = self.inner.write();
        let state = map.entry(*id).or_default();
        if state.settle_in_progress {
            return Err(PaysettleError::AlreadySettling(*id));
        }
        state.settle_in_progress = true;
        drop(map);

        tracing::info!(provider = %id, "Marked provider as requesting settlement");
        Ok(SettleGuard {
            store: self.clone(),
            id: *id,
        })
    }
}

/// Exclusive right to settle for one identity. Clears the in-progress flag
/// when dropped.
#[must_use = "dropping the guard releases the settlement lock immediately"]
#[derive(Debug)]
pub struct SettleGuard {
    store: SettlementStateStore,
    id: Identity,
}

impl SettleGuard {
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.id
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.store.set_settling(&self.id, false);
        tracing::debug!(provider = %self.id, "Settle guard released");
    }
}
