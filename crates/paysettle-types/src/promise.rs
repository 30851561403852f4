//! # Promise — the off-chain IOU redeemed by settlement
//!
//! A [`Promise`] is a signed claim that `amount` (cumulative, in base units)
//! is owed on a channel. It is hash-locked: redeeming it on-chain requires
//! the secret `R` whose SHA-256 equals `hashlock`.
//!
//! Promises reach the engine inside a [`StoredPromise`] that carries `R`
//! hex-encoded. Before a promise is escalated to settlement the secret must
//! be decoded and attached via [`StoredPromise::promise_with_secret`].
//!
//! The withdrawal flow additionally builds an [`Invoice`], an
//! [`ExchangeMessage`] wrapping a self-issued promise, and a
//! [`PayAndSettleBeneficiaryPayload`]. Each exposes a canonical
//! `message_hash` for the keystore to sign.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, AgreementId, ChainId, ChannelId, Identity, PaysettleError, Result};

/// SHA-256 hashlock for a promise secret.
#[must_use]
pub fn hashlock(r: &[u8]) -> [u8; 32] {
    Sha256::digest(r).into()
}

/// Decode a hex-encoded secret `R`.
pub fn decode_secret(r_hex: &str) -> Result<Vec<u8>> {
    hex::decode(r_hex).map_err(|e| PaysettleError::Decode(e.to_string()))
}

/// Copy up to 32 bytes of `bytes` into a fixed array.
#[must_use]
pub fn to_bytes32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// A signed off-chain promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    /// Chain the promise is redeemable on.
    pub chain_id: ChainId,
    /// Channel the promise draws on.
    pub channel_id: ChannelId,
    /// Cumulative promised amount.
    pub amount: Decimal,
    /// Transaction fee the settling party may deduct.
    pub fee: Decimal,
    /// SHA-256 of `r`.
    pub hashlock: [u8; 32],
    /// Raw secret. Empty until decoded from the stored hex form.
    #[serde(default)]
    pub r: Vec<u8>,
    /// Signature over [`Promise::message_hash`].
    pub signature: Vec<u8>,
}

impl Promise {
    /// Canonical hash signed by the issuer.
    ///
    /// Format: `sha256("paysettle:promise:v1:" || chain_id || channel_id || amount || fee || hashlock)`
    #[must_use]
    pub fn message_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"paysettle:promise:v1:");
        hasher.update(self.chain_id.0.to_be_bytes());
        hasher.update(self.channel_id.0);
        hasher.update(self.amount.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(self.fee.to_string().as_bytes());
        hasher.update(self.hashlock);
        hasher.finalize().into()
    }

    /// Whether the raw secret is attached.
    #[must_use]
    pub fn has_secret(&self) -> bool {
        !self.r.is_empty()
    }

    /// Whether the attached secret opens the hashlock.
    #[must_use]
    pub fn secret_matches(&self) -> bool {
        self.has_secret() && hashlock(&self.r) == self.hashlock
    }
}

/// A promise as kept by promise storage and the channel cache, with its
/// secret still hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPromise {
    pub channel_id: ChannelId,
    pub identity: Identity,
    pub hermes_id: Address,
    pub promise: Promise,
    /// Hex-encoded secret `R`.
    pub r: String,
    pub revealed: bool,
    pub agreement_id: Option<AgreementId>,
}

impl StoredPromise {
    /// Return the inner promise with its decoded secret attached.
    ///
    /// # Errors
    /// [`PaysettleError::Decode`] if `r` is not valid hex.
    pub fn promise_with_secret(&self) -> Result<Promise> {
        let r = decode_secret(&self.r)?;
        let mut promise = self.promise.clone();
        promise.r = r;
        Ok(promise)
    }
}

/// Invoice accompanying a self-issued promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub agreement_id: AgreementId,
    pub agreement_total: Decimal,
    pub transactor_fee: Decimal,
    pub hashlock: [u8; 32],
    pub chain_id: ChainId,
    pub provider: Identity,
}

impl Invoice {
    /// Build an invoice whose hashlock commits to `r`.
    #[must_use]
    pub fn new(
        agreement_id: AgreementId,
        agreement_total: Decimal,
        transactor_fee: Decimal,
        r: &[u8],
        chain_id: ChainId,
        provider: Identity,
    ) -> Self {
        Self {
            agreement_id,
            agreement_total,
            transactor_fee,
            hashlock: hashlock(r),
            chain_id,
            provider,
        }
    }
}

/// A promise wrapped with its agreement context, as sent to hermes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeMessage {
    pub promise: Promise,
    pub agreement_id: AgreementId,
    pub agreement_total: Decimal,
    pub provider: Identity,
    pub hermes_id: Address,
    pub chain_id: ChainId,
    /// Signature over [`ExchangeMessage::message_hash`].
    pub signature: Vec<u8>,
}

impl ExchangeMessage {
    /// Canonical hash signed by the sender.
    #[must_use]
    pub fn message_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"paysettle:exchange:v1:");
        hasher.update(self.promise.message_hash());
        hasher.update(&self.promise.signature);
        hasher.update(self.agreement_id.0);
        hasher.update(self.agreement_total.to_string().as_bytes());
        hasher.update(self.provider.address().as_bytes());
        hasher.update(self.hermes_id.as_bytes());
        hasher.update(self.chain_id.0.to_be_bytes());
        hasher.finalize().into()
    }
}

/// Beneficiary authorization attached to a pay-and-settle transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayAndSettleBeneficiaryPayload {
    pub beneficiary: Address,
    pub chain_id: ChainId,
    pub channel_id: ChannelId,
    pub amount: Decimal,
    pub r: [u8; 32],
    pub signature: Vec<u8>,
}

impl PayAndSettleBeneficiaryPayload {
    /// Unsigned payload.
    #[must_use]
    pub fn new(
        beneficiary: Address,
        chain_id: ChainId,
        channel_id: ChannelId,
        amount: Decimal,
        r: [u8; 32],
    ) -> Self {
        Self {
            beneficiary,
            chain_id,
            channel_id,
            amount,
            r,
            signature: Vec::new(),
        }
    }

    /// Canonical hash signed by the provider.
    #[must_use]
    pub fn message_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"paysettle:pay-and-settle:v1:");
        hasher.update(self.beneficiary.as_bytes());
        hasher.update(self.chain_id.0.to_be_bytes());
        hasher.update(self.channel_id.0);
        hasher.update(self.amount.to_string().as_bytes());
        hasher.update(self.r);
        hasher.finalize().into()
    }
}

/// Dummy promises for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Promise {
    /// A promise with a random secret whose hashlock matches it.
    /// Returns the promise (secret *not* attached) and the secret.
    pub fn dummy(chain_id: ChainId, amount: Decimal, fee: Decimal) -> (Self, Vec<u8>) {
        let r: [u8; 32] = rand::random();
        let promise = Self {
            chain_id,
            channel_id: ChannelId(rand::random()),
            amount,
            fee,
            hashlock: hashlock(&r),
            r: Vec::new(),
            signature: vec![0u8; 64],
        };
        (promise, r.to_vec())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl StoredPromise {
    /// A stored promise for `identity`/`hermes_id` with a valid hex secret.
    pub fn dummy(identity: Identity, hermes_id: Address, chain_id: ChainId, amount: Decimal) -> Self {
        let (mut promise, r) = Promise::dummy(chain_id, amount, Decimal::ZERO);
        let channel_id = ChannelId::for_provider(&identity, &hermes_id);
        promise.channel_id = channel_id;
        Self {
            channel_id,
            identity,
            hermes_id,
            promise,
            r: hex::encode(r),
            revealed: false,
            agreement_id: None,
        }
    }
}
