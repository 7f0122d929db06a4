//! Caller authentication
//!
//! Every mutation takes a [`CallerContext`]. A host that already
//! authenticates its callers (an RPC layer with mTLS, a consensus runtime)
//! builds one with [`CallerContext::trusted`]. Anyone else submits a
//! [`SignedCommand`], which is verified against the signer's public key
//! before a context is produced.
//!
//! A signature covers the ledger it was made for (the initializer identity)
//! and a per-signer nonce. The writer accepts each nonce only if it is
//! greater than the last one it stored for that signer, so a captured
//! command cannot be applied twice or on another ledger.

use crate::crypto::{verify_signature, KeyPair, Signature};
use crate::types::{DocumentHash, Identity};
use crate::Result;
use serde::{Deserialize, Serialize};

const COMMAND_DOMAIN: &[u8] = b"docledger/command/v2";

/// Authenticated identity of the caller of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    identity: Identity,
    nonce: Option<u64>,
}

impl CallerContext {
    /// Context for an identity the host has already authenticated
    pub fn trusted(identity: Identity) -> Self {
        Self {
            identity,
            nonce: None,
        }
    }

    /// Caller identity
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Nonce of the signed command this context came from
    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }
}

/// A ledger mutation as submitted over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Issue a document
    Issue {
        /// Content hash
        hash: DocumentHash,
        /// Display name
        file_name: String,
        /// Content locator
        content_uri: String,
    },
    /// Revoke a document
    Revoke {
        /// Content hash
        hash: DocumentHash,
    },
    /// Grant Issuer to `target`
    GrantIssuer {
        /// New issuer
        target: Identity,
    },
    /// Remove Issuer from `target`
    RevokeIssuer {
        /// Former issuer
        target: Identity,
    },
}

impl Command {
    /// Bytes covered by the signature
    pub fn signing_bytes(&self, ledger: &Identity, nonce: u64) -> Result<Vec<u8>> {
        let mut bytes = COMMAND_DOMAIN.to_vec();
        bytes.extend_from_slice(&bincode::serialize(&(ledger, nonce, self))?);
        Ok(bytes)
    }

    /// Sign with `keypair` for the ledger initialized by `ledger`
    pub fn sign(self, keypair: &KeyPair, ledger: &Identity, nonce: u64) -> Result<SignedCommand> {
        let signature = keypair.sign(&self.signing_bytes(ledger, nonce)?);
        Ok(SignedCommand {
            signer: keypair.identity(),
            nonce,
            command: self,
            signature,
        })
    }
}

/// Command plus the signer's Ed25519 signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCommand {
    /// Claimed caller
    pub signer: Identity,
    /// Must exceed the last nonce the ledger accepted from `signer`
    pub nonce: u64,
    /// Requested mutation
    pub command: Command,
    /// Signature over [`Command::signing_bytes`]
    pub signature: Signature,
}

impl SignedCommand {
    /// Verify the signature for `ledger` and return the authenticated context
    ///
    /// Nonce freshness is checked by the writer, not here.
    pub fn authenticate(&self, ledger: &Identity) -> Result<CallerContext> {
        let message = self.command.signing_bytes(ledger, self.nonce)?;
        verify_signature(&self.signer, &message, &self.signature)?;
        Ok(CallerContext {
            identity: self.signer,
            nonce: Some(self.nonce),
        })
    }
}
