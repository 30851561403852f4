//! Application events the settler reacts to.
//!
//! These arrive over the event bus; the settler's event adapter translates
//! each into state updates or settlement calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, ChainId, Identity, Promise};

/// Node lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Started,
    Stopped,
}

/// Identity registration status as reported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Registered,
    Unregistered,
    InProgress,
    RegistrationError,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "REGISTERED"),
            Self::Unregistered => write!(f, "UNREGISTERED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::RegistrationError => write!(f, "REGISTRATION_ERROR"),
        }
    }
}

/// Provider service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    Starting,
    Running,
    NotRunning,
}

/// An identity's registration status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRegistrationEvent {
    pub id: Identity,
    pub chain_id: ChainId,
    pub status: RegistrationStatus,
}

/// A provider's service changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusEvent {
    pub provider_id: Identity,
    pub status: ServiceStatus,
}

/// Manual "settle now" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequestEvent {
    pub chain_id: ChainId,
    pub provider_id: Identity,
    pub hermes_id: Address,
}

/// A promise from hermes was received and recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HermesPromiseEvent {
    pub provider_id: Identity,
    pub hermes_id: Address,
    pub promise: Promise,
}

/// Everything delivered on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    Node(NodeStatus),
    IdentityRegistration(IdentityRegistrationEvent),
    ServiceStatus(ServiceStatusEvent),
    SettlementRequest(SettlementRequestEvent),
    HermesPromise(HermesPromiseEvent),
}

impl AppEvent {
    /// Short topic name, for logs.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::IdentityRegistration(_) => "identity-registration",
            Self::ServiceStatus(_) => "service-status",
            Self::SettlementRequest(_) => "settlement-request",
            Self::HermesPromise(_) => "hermes-promise",
        }
    }
}
