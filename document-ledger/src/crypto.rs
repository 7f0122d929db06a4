//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - Ed25519 key pairs whose public key is the caller [`Identity`]
//! - Signature verification for signed commands
//! - Domain-separated SHA-256 for the audit hash chain

use crate::types::Identity;
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const AUDIT_DOMAIN: &[u8] = b"docledger/audit/v1";

/// Digital signature (Ed25519)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}

/// Ed25519 key pair held by a ledger participant
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Identity (public key) of this key pair
    pub fn identity(&self) -> Identity {
        Identity::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }
}

/// Verify `signature` over `message` by `signer`
pub fn verify_signature(signer: &Identity, message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|e| Error::Signature(format!("Invalid public key {}: {}", signer, e)))?;

    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());
    verifying_key
        .verify(message, &dalek_sig)
        .map_err(|e| Error::Signature(format!("Verification failed: {}", e)))
}

/// Domain-separated hash of a serialized audit event body
pub fn audit_hash(body: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(AUDIT_DOMAIN);
    hasher.update(body);
    hasher.finalize().into()
}
