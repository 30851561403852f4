//! Event bus adapter.
//!
//! Translates [`AppEvent`]s into state updates, settlement calls and queue
//! pushes. Each event is handled on its own task; errors end here and are
//! logged.

use std::sync::Arc;

use paysettle_types::{
    AppEvent, HermesPromiseEvent, IdentityRegistrationEvent, NodeStatus, RegistrationStatus,
    ServiceStatus, ServiceStatusEvent, SettlementRequestEvent,
};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    collaborators::{ChannelProvider, Keystore},
    confirm::stopped,
    settler::HermesPromiseSettler,
};

impl HermesPromiseSettler {
    /// Consume `events` until the bus closes or the settler stops.
    pub fn subscribe(self: &Arc<Self>, mut events: broadcast::Receiver<AppEvent>) -> JoinHandle<()> {
        let settler = Arc::clone(self);
        tokio::spawn(async move {
            let mut shutdown = settler.shutdown_signal();
            loop {
                let event = tokio::select! {
                    () = stopped(&mut shutdown) => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        let settler = Arc::clone(&settler);
                        tokio::spawn(async move { settler.handle_event(event).await });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Settler lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Settler event subscription ended");
        })
    }

    /// Handle one event to completion.
    pub async fn handle_event(self: Arc<Self>, event: AppEvent) {
        tracing::trace!(topic = event.topic(), "Handling event");
        match event {
            AppEvent::Node(NodeStatus::Started) => self.handle_node_start(),
            AppEvent::Node(NodeStatus::Stopped) => {
                self.shutdown();
            }
            AppEvent::IdentityRegistration(event) => self.handle_registration_event(&event),
            AppEvent::ServiceStatus(event) => self.handle_service_event(&event).await,
            AppEvent::SettlementRequest(event) => self.handle_settlement_event(&event).await,
            AppEvent::HermesPromise(event) => self.handle_hermes_promise_received(&event).await,
        }
    }

    fn handle_node_start(self: Arc<Self>) {
        if self.start_dispatcher().is_none() {
            tracing::debug!("Settlement dispatcher already running");
        }

        let chain_id = self.config.chain_id;
        for id in self.collaborators.keystore.accounts() {
            let settler = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = settler.load_initial_state(chain_id, &id).await {
                    tracing::error!(identity = %id, error = %e, "Could not load initial state");
                }
            });
        }
    }

    fn handle_registration_event(&self, event: &IdentityRegistrationEvent) {
        if event.status != RegistrationStatus::Registered {
            tracing::debug!(provider = %event.id, status = %event.status, "Ignoring registration event");
            return;
        }
        self.state.mark_registered(&event.id);
        tracing::info!(provider = %event.id, "Identity registration event handled");
    }

    async fn handle_service_event(&self, event: &ServiceStatusEvent) {
        if event.status != ServiceStatus::Running {
            tracing::debug!(provider = %event.provider_id, status = ?event.status, "Ignoring service event");
            return;
        }
        if let Err(e) = self
            .load_initial_state(self.config.chain_id, &event.provider_id)
            .await
        {
            tracing::error!(provider = %event.provider_id, error = %e, "Could not load initial state");
        }
    }

    async fn handle_settlement_event(&self, event: &SettlementRequestEvent) {
        if let Err(e) = self
            .force_settle(event.chain_id, event.provider_id, event.hermes_id)
            .await
        {
            tracing::error!(provider = %event.provider_id, error = %e, "Could not settle promise");
        }
    }

    /// Decide on auto-settlement for a freshly received promise. The state
    /// lock is not held while the request is queued.
    async fn handle_hermes_promise_received(&self, event: &HermesPromiseEvent) {
        let id = event.provider_id;
        tracing::info!(provider = %id, "Received hermes promise");

        let Some(state) = self.state.get(&id) else {
            tracing::error!(provider = %id, "Have no info on provider, skipping");
            return;
        };
        if !state.registered {
            tracing::error!(provider = %id, "Provider not registered, skipping");
            return;
        }

        let chain_id = event.promise.chain_id;
        let channels = &self.collaborators.channel_provider;
        let channel = match channels.get(chain_id, &id, &event.hermes_id) {
            Some(channel) => channel,
            None => match channels.fetch(chain_id, &id, &event.hermes_id).await {
                Ok(channel) => channel,
                Err(e) if e.is_channel_not_found() => {
                    tracing::debug!(provider = %id, hermes = %event.hermes_id, "No channel yet, skipping");
                    return;
                }
                Err(e) => {
                    tracing::error!(provider = %id, hermes = %event.hermes_id, error = %e, "Could not sync state for provider");
                    return;
                }
            },
        };

        tracing::info!(provider = %id, hermes = %event.hermes_id, "Hermes promise state updated");

        let state = self.state.get(&id).unwrap_or(state);
        if !state.needs_settling(self.config.threshold, &channel) {
            return;
        }
        if let Err(e) = self.initiate_settling(channel).await {
            tracing::error!(provider = %id, error = %e, "Could not initiate settling");
        }
    }
}
