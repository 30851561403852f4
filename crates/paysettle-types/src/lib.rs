//! # paysettle-types
//!
//! Shared types, errors, and configuration for the **paysettle** hermes
//! promise settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`ChainId`], [`Address`], [`Identity`], [`ChannelId`], [`TxHash`], [`AgreementId`]
//! - **Promise model**: [`Promise`], [`StoredPromise`], [`Invoice`], [`ExchangeMessage`], [`PayAndSettleBeneficiaryPayload`]
//! - **Channel model**: [`Channel`]
//! - **Settlement records**: [`SettleFees`], [`PromiseSettledEvent`], [`SettlementHistoryEntry`]
//! - **Events**: [`AppEvent`] and its payloads
//! - **Configuration**: [`SettlerConfig`]
//! - **Errors**: [`PaysettleError`] with `PS_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod promise;
pub mod settlement;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use promise::*;
pub use settlement::*;

// Constants are accessed via `paysettle_types::constants::FOO`
// (not re-exported to avoid name collisions).
