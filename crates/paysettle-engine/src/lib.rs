//! # paysettle-engine
//!
//! Settlement coordination for hermes promises earned by a provider node.
//!
//! ## Pipeline
//!
//! ```text
//! AppEvent ──► events ──► policy ──► dispatcher queue ──► settler
//!                                                          │
//!               fee update ◄── guard ◄─────────────────────┘
//!                   │
//!                   ▼
//!            fee check ──► subscribe ──► submit ──► confirm-or-timeout ──► history
//! ```
//!
//! ## Guarantees
//!
//! - At most one settlement or withdrawal in flight per identity; a second
//!   attempt fails immediately with `AlreadySettling`.
//! - The confirmation subscription is opened before submission.
//! - Every exit path releases the settle guard and cancels the
//!   subscription.
//! - Exactly one history entry per confirmed settlement.
//!
//! All external systems are reached through the traits in [`collaborators`].

pub mod collaborators;
pub mod confirm;
pub mod dispatcher;
pub mod events;
pub mod fee;
pub mod keystore;
pub mod policy;
pub mod settler;
pub mod state;
pub mod withdrawal;

pub use collaborators::{
    AddressProvider, ChainClient, ChannelProvider, Collaborators, HermesCaller,
    HermesCallerFactory, HermesUrlResolver, Keystore, PaySettler, PromiseStorage,
    RegistrationStatusProvider, SettlementHistoryStorage, Transactor,
};
pub use confirm::{ConfirmationOutcome, SettledEventSubscription};
pub use dispatcher::ReceivedPromise;
pub use fee::FeeUpdater;
pub use keystore::Ed25519Keystore;
pub use settler::{HermesPromiseSettler, SettleRequest, Submission};
pub use state::{SettleGuard, SettlementState, SettlementStateStore};
