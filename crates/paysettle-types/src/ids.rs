//! Identifiers used throughout paysettle.
//!
//! Account-like values ([`Address`], [`Identity`]) are 20-byte handles;
//! hash-like values ([`ChannelId`], [`TxHash`], [`AgreementId`]) are 32 bytes.
//! All of them render as `0x`-prefixed lowercase hex.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::PaysettleError;

fn parse_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N], PaysettleError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| PaysettleError::InvalidAddress {
        value: s.to_string(),
        reason: e.to_string(),
    })?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| PaysettleError::InvalidAddress {
            value: s.to_string(),
            reason: format!("expected {N} bytes, got {}", b.len()),
        })
}

// ---------------------------------------------------------------------------
// ChainId
// ---------------------------------------------------------------------------

/// EVM-style chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ChainId(pub i64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte on-chain account or contract address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = PaysettleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_fixed::<20>(s).map(Self)
    }
}

impl TryFrom<String> for Address {
    type Error = PaysettleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable handle for a provider or consumer account.
///
/// The key for all per-party settlement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub Address);

impl Identity {
    #[must_use]
    pub fn from_address(address: Address) -> Self {
        Self(address)
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Identity {
    type Err = PaysettleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Deterministic 32-byte identifier of a payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ChannelId(pub [u8; 32]);

impl ChannelId {
    /// Channel id of the provider's channel with the given hermes.
    #[must_use]
    pub fn for_provider(provider: &Identity, hermes_id: &Address) -> Self {
        Self::derive(b"paysettle:channel:provider:v1:", provider, hermes_id)
    }

    /// Channel id under which hermes stores the promise it issues in reply
    /// to a pay-and-settle request.
    #[must_use]
    pub fn for_pay_and_settle(provider: &Identity, hermes_id: &Address) -> Self {
        Self::derive(b"paysettle:channel:withdrawal:v1:", provider, hermes_id)
    }

    /// Channel id of a consumer channel contract: the address left-padded to 32 bytes.
    #[must_use]
    pub fn from_address(address: &Address) -> Self {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(address.as_bytes());
        Self(out)
    }

    fn derive(tag: &[u8], provider: &Identity, hermes_id: &Address) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update(provider.address().as_bytes());
        hasher.update(hermes_id.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ChannelId {
    type Err = PaysettleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_fixed::<32>(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// Hash of a mined settlement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// AgreementId
// ---------------------------------------------------------------------------

/// Random 32-byte agreement identifier carried by an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgreementId(pub [u8; 32]);

impl fmt::Display for AgreementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agreement:{}", hex::encode(&self.0[..8]))
    }
}
