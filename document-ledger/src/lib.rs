//! Document Trust Ledger
//!
//! Authoritative registry of issued documents keyed by content hash, with
//! role-gated issuance and revocation and a tamper-evident audit log.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor applies every mutation, so the
//!   check-then-write of `issue` can never be raced
//! - **Atomic Commits**: Record, index entry, roles and audit event of a
//!   mutation land in one RocksDB `WriteBatch`
//! - **Snapshot Reads**: Lookups and enumeration bypass the writer
//! - **Audit Chain**: Every state change appends a hash-linked event,
//!   with Merkle inclusion proofs over the event hashes
//!
//! # Invariants
//!
//! - A hash is issued at most once; revocation never frees it
//! - The enumeration index holds each issued hash exactly once, in order
//! - Absent hashes read as the absent record (zero issuer), never an error
//! - Only Admin changes roles; only Issuer issues or revokes

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod index;
pub mod ledger;
pub mod merkle;
pub mod metrics;
pub mod roles;
pub mod storage;
pub mod types;

// Re-exports
pub use auth::{CallerContext, Command, SignedCommand};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, RevocationScope};
pub use crypto::{KeyPair, Signature};
pub use error::{Error, ErrorKind, Result};
pub use ledger::{AuditHead, Ledger};
pub use merkle::MerkleProof;
pub use storage::Storage;
pub use types::{
    AuditEvent, AuditEventKind, DocumentHash, DocumentRecord, DocumentStatus, Genesis, Identity,
    IssueReceipt, Receipt, RevokeReceipt, Role, RoleReceipt, RoleSet,
};
