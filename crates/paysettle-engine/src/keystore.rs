//! In-memory Ed25519 keystore.
//!
//! Each account is an Ed25519 signing key; its [`Identity`] is the last 20
//! bytes of the SHA-256 of the verifying key.

use std::collections::HashMap;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::RwLock;
use paysettle_types::{Address, Identity, PaysettleError, Result};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::collaborators::Keystore;

/// Identity owning `key`.
#[must_use]
pub fn identity_of(key: &VerifyingKey) -> Identity {
    let digest = Sha256::digest(key.as_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Identity(Address(address))
}

/// Signing keys keyed by identity.
#[derive(Default)]
pub struct Ed25519Keystore {
    keys: RwLock<HashMap<Identity, SigningKey>>,
}

impl Ed25519Keystore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh account and return its identity.
    pub fn generate(&self) -> Identity {
        self.insert(SigningKey::generate(&mut OsRng))
    }

    /// Add an existing key.
    pub fn insert(&self, key: SigningKey) -> Identity {
        let id = identity_of(&key.verifying_key());
        self.keys.write().insert(id, key);
        id
    }

    fn verifying_key(&self, account: &Identity) -> Option<VerifyingKey> {
        self.keys.read().get(account).map(SigningKey::verifying_key)
    }

    /// Check `signature` over `hash` against `account`'s key.
    pub fn verify(&self, account: &Identity, hash: &[u8; 32], signature: &[u8]) -> Result<()> {
        let key = self
            .verifying_key(account)
            .ok_or(PaysettleError::UnknownAccount(*account))?;
        let signature = Signature::from_slice(signature).map_err(|e| PaysettleError::Signing {
            identity: *account,
            reason: e.to_string(),
        })?;
        key.verify(hash, &signature)
            .map_err(|e| PaysettleError::Signing {
                identity: *account,
                reason: e.to_string(),
            })
    }
}

impl Keystore for Ed25519Keystore {
    /// Accounts in ascending address order.
    fn accounts(&self) -> Vec<Identity> {
        let mut accounts: Vec<Identity> = self.keys.read().keys().copied().collect();
        accounts.sort_by_key(|id| id.address().0);
        accounts
    }

    fn sign_hash(&self, account: &Identity, hash: &[u8; 32]) -> Result<Vec<u8>> {
        let keys = self.keys.read();
        let key = keys
            .get(account)
            .ok_or(PaysettleError::UnknownAccount(*account))?;
        Ok(key.sign(hash).to_bytes().to_vec())
    }
}
