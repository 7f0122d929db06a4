//! Core types for the document ledger
//!
//! All persisted types are designed for:
//! - Deterministic serialization (bincode)
//! - Fixed-width keys (32-byte hashes and identities)
//! - A distinguishable zero value for "no record"

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Parse `0x`-prefixed (optional) hex into exactly 32 bytes.
fn parse_hex32(s: &str, what: &str) -> crate::Result<[u8; 32]> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    if digits.len() != 64 {
        return Err(crate::Error::InvalidInput(format!(
            "{} must be 64 hex digits, got {}",
            what,
            digits.len()
        )));
    }

    let mut out = [0u8; 32];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| crate::Error::InvalidInput(format!("{} is not valid hex: {}", what, e)))?;
    Ok(out)
}

/// Content fingerprint used as the ledger's primary key.
///
/// The ledger never derives this value itself; it trusts whatever the
/// caller supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentHash([u8; 32]);

impl DocumentHash {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SHA-256 of file content, as computed by clients before calling the ledger
    pub fn digest(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Lowercase hex with `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for DocumentHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_hex32(s, "document hash").map(Self)
    }
}

/// Caller identity: the Ed25519 public key of the account.
///
/// `Identity::ZERO` is the absent sentinel returned as the issuer of
/// unknown documents. It never holds a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity([u8; 32]);

impl Identity {
    /// The zero identity
    pub const ZERO: Identity = Identity([0u8; 32]);

    /// Create from public key bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Public key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the absent sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Short form for log lines (`0x1a2b3c4d…`)
    pub fn short(&self) -> String {
        format!("0x{}…", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Identity {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_hex32(s, "identity").map(Self)
    }
}

/// Authoritative record for one issued document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Identity that issued the document (ZERO when absent)
    pub issuer: Identity,

    /// Display name, not interpreted
    pub file_name: String,

    /// Off-ledger content locator, not interpreted
    pub content_uri: String,

    /// Issuance time (seconds since Unix epoch), taken from the ledger clock
    pub issued_at: u64,

    /// One-way revocation flag
    pub revoked: bool,
}

impl DocumentRecord {
    /// The "no record" value returned for unknown hashes
    pub fn absent() -> Self {
        Self {
            issuer: Identity::ZERO,
            file_name: String::new(),
            content_uri: String::new(),
            issued_at: 0,
            revoked: false,
        }
    }

    /// True if this is the absent sentinel
    pub fn is_absent(&self) -> bool {
        self.issuer.is_zero()
    }

    /// Lifecycle state of the hash this record belongs to
    pub fn status(&self) -> DocumentStatus {
        if self.is_absent() {
            DocumentStatus::Absent
        } else if self.revoked {
            DocumentStatus::Revoked
        } else {
            DocumentStatus::Issued
        }
    }
}

/// Per-hash lifecycle: `Absent → Issued → Revoked`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DocumentStatus {
    /// Never issued
    Absent = 0,
    /// Issued and valid
    Issued = 1,
    /// Issued, then revoked (terminal)
    Revoked = 2,
}

/// Capability held by an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    /// May grant and revoke the Issuer capability
    Admin = 1,
    /// May issue and revoke documents
    Issuer = 2,
}

impl Role {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Issuer => "issuer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of capabilities held by one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    admin: bool,
    issuer: bool,
}

impl RoleSet {
    /// No capabilities
    pub const EMPTY: RoleSet = RoleSet {
        admin: false,
        issuer: false,
    };

    /// Both capabilities (the initializer's set)
    pub const ALL: RoleSet = RoleSet {
        admin: true,
        issuer: true,
    };

    /// Membership test
    pub fn contains(&self, role: Role) -> bool {
        match role {
            Role::Admin => self.admin,
            Role::Issuer => self.issuer,
        }
    }

    /// Copy with `role` added
    pub fn with(mut self, role: Role) -> Self {
        match role {
            Role::Admin => self.admin = true,
            Role::Issuer => self.issuer = true,
        }
        self
    }

    /// Copy with `role` removed
    pub fn without(mut self, role: Role) -> Self {
        match role {
            Role::Admin => self.admin = false,
            Role::Issuer => self.issuer = false,
        }
        self
    }

    /// True if no capability is held
    pub fn is_empty(&self) -> bool {
        !self.admin && !self.issuer
    }
}

/// Genesis parameters applied when the store is first created
#[derive(Debug, Clone, Copy)]
pub struct Genesis {
    /// Identity seeded with Admin and Issuer
    pub initializer: Identity,
}

impl Genesis {
    /// Genesis with the given initializer
    pub fn new(initializer: Identity) -> Self {
        Self { initializer }
    }
}

/// Confirmation of a committed issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReceipt {
    /// Issued hash
    pub hash: DocumentHash,
    /// Issuer of record
    pub issuer: Identity,
    /// Assigned issuance time
    pub issued_at: u64,
    /// Audit sequence of the `DocumentIssued` event
    pub sequence: u64,
    /// Hash of the audit event
    pub event_hash: [u8; 32],
}

/// Confirmation of a revocation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeReceipt {
    /// Revoked hash
    pub hash: DocumentHash,
    /// Caller that requested revocation
    pub revoked_by: Identity,
    /// Time the request was applied
    pub revoked_at: u64,
    /// False if the record was already revoked
    pub changed: bool,
    /// Audit sequence of the `DocumentRevoked` event, if one was written
    pub sequence: Option<u64>,
}

/// Confirmation of a role grant or removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleReceipt {
    /// Identity whose roles were changed
    pub target: Identity,
    /// Roles after the call
    pub roles: RoleSet,
    /// False if the call was a no-op
    pub changed: bool,
    /// Audit sequence of the event, if one was written
    pub sequence: Option<u64>,
}

/// Any mutation receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Receipt {
    /// From `issue`
    Issued(IssueReceipt),
    /// From `revoke`
    Revoked(RevokeReceipt),
    /// From `grant_issuer` / `revoke_issuer`
    Roles(RoleReceipt),
}

/// What an audit event records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    /// Store created; initializer seeded with Admin and Issuer
    LedgerInitialized {
        /// Genesis identity
        initializer: Identity,
    },

    /// Document issued
    DocumentIssued {
        /// Document hash
        hash: DocumentHash,
        /// Issuer of record
        issuer: Identity,
        /// Display name
        file_name: String,
        /// Content locator
        content_uri: String,
        /// Issuance time
        issued_at: u64,
    },

    /// Document revoked
    DocumentRevoked {
        /// Document hash
        hash: DocumentHash,
        /// Revoking identity
        revoked_by: Identity,
        /// Revocation time
        revoked_at: u64,
    },

    /// Issuer capability granted
    IssuerGranted {
        /// Granting admin
        admin: Identity,
        /// New issuer
        target: Identity,
    },

    /// Issuer capability removed
    IssuerRevoked {
        /// Removing admin
        admin: Identity,
        /// Former issuer
        target: Identity,
    },
}

impl AuditEventKind {
    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AuditEventKind::LedgerInitialized { .. } => "ledger_initialized",
            AuditEventKind::DocumentIssued { .. } => "document_issued",
            AuditEventKind::DocumentRevoked { .. } => "document_revoked",
            AuditEventKind::IssuerGranted { .. } => "issuer_granted",
            AuditEventKind::IssuerRevoked { .. } => "issuer_revoked",
        }
    }
}

/// Entry in the append-only, hash-chained audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Dense position in the log, starting at 0
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Time the event was committed
    pub recorded_at: u64,

    /// Event payload
    pub kind: AuditEventKind,

    /// `event_hash` of the previous event (zero for sequence 0)
    pub prev_hash: [u8; 32],

    /// Hash over every other field
    pub event_hash: [u8; 32],
}

impl AuditEvent {
    /// Build the event at `sequence`, chaining it to `prev_hash`
    pub fn chained(
        sequence: u64,
        recorded_at: u64,
        kind: AuditEventKind,
        prev_hash: [u8; 32],
    ) -> crate::Result<Self> {
        let mut event = Self {
            sequence,
            event_id: Uuid::now_v7(),
            recorded_at,
            kind,
            prev_hash,
            event_hash: [0u8; 32],
        };
        event.event_hash = event.compute_hash()?;
        Ok(event)
    }

    /// Recompute the chain hash from the event contents
    pub fn compute_hash(&self) -> crate::Result<[u8; 32]> {
        let body = bincode::serialize(&(
            self.sequence,
            &self.event_id,
            self.recorded_at,
            &self.kind,
            &self.prev_hash,
        ))?;
        Ok(crate::crypto::audit_hash(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_hash_hex_roundtrip() {
        let hash = DocumentHash::from_bytes([0xAA; 32]);
        let text = hash.to_string();
        assert!(text.starts_with("0xaaaa"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<DocumentHash>().unwrap(), hash);

        // Prefix is optional
        let bare = &text[2..];
        assert_eq!(bare.parse::<DocumentHash>().unwrap(), hash);
    }

    #[test]
    fn test_document_hash_rejects_bad_length() {
        let err = "0xabcd".parse::<DocumentHash>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);

        let err = format!("0x{}", "zz".repeat(32))
            .parse::<DocumentHash>()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_document_hash_digest_is_sha256() {
        // SHA-256("abc")
        let expected = "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(DocumentHash::digest(b"abc").to_string(), expected);
    }

    #[test]
    fn test_absent_record() {
        let record = DocumentRecord::absent();
        assert!(record.is_absent());
        assert!(record.issuer.is_zero());
        assert_eq!(record.status(), DocumentStatus::Absent);
    }

    #[test]
    fn test_record_status() {
        let mut record = DocumentRecord {
            issuer: Identity::from_bytes([1; 32]),
            file_name: "contract.pdf".to_string(),
            content_uri: "cid123".to_string(),
            issued_at: 10,
            revoked: false,
        };
        assert_eq!(record.status(), DocumentStatus::Issued);

        record.revoked = true;
        assert_eq!(record.status(), DocumentStatus::Revoked);
    }

    #[test]
    fn test_role_set() {
        let roles = RoleSet::EMPTY.with(Role::Issuer);
        assert!(roles.contains(Role::Issuer));
        assert!(!roles.contains(Role::Admin));

        let roles = roles.without(Role::Issuer);
        assert!(roles.is_empty());

        assert!(RoleSet::ALL.contains(Role::Admin));
        assert!(RoleSet::ALL.contains(Role::Issuer));
    }

    #[test]
    fn test_audit_event_hash_covers_contents() {
        let kind = AuditEventKind::LedgerInitialized {
            initializer: Identity::from_bytes([7; 32]),
        };
        let mut event = AuditEvent::chained(0, 100, kind, [0u8; 32]).unwrap();
        assert_eq!(event.compute_hash().unwrap(), event.event_hash);

        event.recorded_at = 101;
        assert_ne!(event.compute_hash().unwrap(), event.event_hash);
    }
}
