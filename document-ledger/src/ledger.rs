//! Main ledger orchestration layer
//!
//! This module ties together storage, roles, the audit log and the writer
//! actor into the public API of the document ledger.
//!
//! # Example
//!
//! ```no_run
//! use document_ledger::{CallerContext, Config, DocumentHash, Genesis, Identity, Ledger, SystemClock};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> document_ledger::Result<()> {
//!     let admin = Identity::from_bytes([1; 32]);
//!     let ledger = Ledger::open(Config::default(), Genesis::new(admin), Arc::new(SystemClock)).await?;
//!
//!     let caller = CallerContext::trusted(admin);
//!     let hash = DocumentHash::digest(b"contract body");
//!     ledger.issue(&caller, hash, "contract.pdf", "ipfs://cid").await?;
//!
//!     assert!(ledger.has_document(&hash)?);
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, ActorContext, AuditCursor, LedgerHandle},
    auth::{CallerContext, Command, SignedCommand},
    clock::Clock,
    merkle::{MerkleProof, MerkleTree},
    metrics::Metrics,
    roles::RoleStore,
    storage::{StorageStats, WriteSet},
    types::{
        AuditEvent, AuditEventKind, DocumentHash, DocumentRecord, Genesis, Identity,
        IssueReceipt, Receipt, RevokeReceipt, RoleReceipt, RoleSet,
    },
    Config, Error, Result, Storage,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Page size used when walking the audit log
const AUDIT_PAGE: usize = 1024;

/// Result of a full audit-chain verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditHead {
    /// Number of events verified
    pub len: u64,
    /// Hash of the last event
    pub head_hash: [u8; 32],
}

/// Main ledger interface
///
/// Cheap to clone; every clone talks to the same writer.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Role membership reads
    roles: RoleStore,

    /// Identity bound into every signed command for this ledger
    initializer: Identity,

    /// Merkle tree over audit-event hashes, appended by the writer
    audit_tree: Arc<RwLock<MerkleTree>>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Arc<Config>,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// A fresh data directory is initialized from `genesis`: the initializer
    /// receives Admin and Issuer and the first audit event is recorded. An
    /// existing directory must have been created with the same initializer.
    pub async fn open(config: Config, genesis: Genesis, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        if genesis.initializer.is_zero() {
            return Err(Error::InvalidInput(
                "initializer must not be the zero identity".to_string(),
            ));
        }

        let storage = Arc::new(Storage::open(&config)?);

        match storage.initializer()? {
            None => Self::initialize(&storage, &genesis, clock.as_ref())?,
            Some(existing) if existing != genesis.initializer => {
                return Err(Error::Config(format!(
                    "data directory was initialized by {}, not {}",
                    existing, genesis.initializer
                )));
            }
            Some(_) => {}
        }

        let (tree, cursor) = Self::load_audit_tree(&storage)?;
        let index_len = storage.index_len()?;

        let metrics = Metrics::new().map_err(|e| Error::Config(e.to_string()))?;
        metrics.indexed_documents.set(index_len as i64);

        let audit_tree = Arc::new(RwLock::new(tree));
        let ctx = ActorContext {
            storage: storage.clone(),
            clock,
            metrics: metrics.clone(),
            audit_tree: audit_tree.clone(),
            limits: config.limits.clone(),
            revocation_scope: config.policy.revocation_scope,
        };
        let handle = spawn_ledger_actor(ctx, config.mailbox_capacity, index_len, cursor);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            initializer = %genesis.initializer.short(),
            documents = index_len,
            audit_events = cursor.len,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            roles: RoleStore::new(storage.clone()),
            storage,
            initializer: genesis.initializer,
            audit_tree,
            metrics,
            config: Arc::new(config),
        })
    }

    fn initialize(storage: &Storage, genesis: &Genesis, clock: &dyn Clock) -> Result<()> {
        let initializer = genesis.initializer;
        let event = AuditEvent::chained(
            0,
            clock.now(),
            AuditEventKind::LedgerInitialized { initializer },
            [0u8; 32],
        )?;

        storage.commit(&WriteSet {
            roles: Some((initializer, RoleSet::ALL)),
            initializer: Some(initializer),
            audit: Some(event),
            ..Default::default()
        })?;

        tracing::info!(initializer = %initializer, "Ledger initialized");
        Ok(())
    }

    fn load_audit_tree(storage: &Storage) -> Result<(MerkleTree, AuditCursor)> {
        let expected = storage.audit_len()?;
        let mut leaves = Vec::with_capacity(expected as usize);
        let mut head = [0u8; 32];

        loop {
            let page = storage.audit_events(leaves.len() as u64, AUDIT_PAGE)?;
            if page.is_empty() {
                break;
            }
            for event in page {
                if event.sequence != leaves.len() as u64 {
                    return Err(Error::Corruption(format!(
                        "audit gap: expected sequence {}, found {}",
                        leaves.len(),
                        event.sequence
                    )));
                }
                head = event.event_hash;
                leaves.push(event.event_hash);
            }
        }

        if leaves.len() as u64 != expected {
            return Err(Error::Corruption(format!(
                "audit length {} does not match {} stored events",
                expected,
                leaves.len()
            )));
        }

        Ok((
            MerkleTree::from_leaves(leaves),
            AuditCursor {
                len: expected,
                head,
            },
        ))
    }

    /// Issue a document. Requires Issuer.
    pub async fn issue(
        &self,
        caller: &CallerContext,
        hash: DocumentHash,
        file_name: impl Into<String>,
        content_uri: impl Into<String>,
    ) -> Result<IssueReceipt> {
        self.handle
            .issue(*caller, hash, file_name.into(), content_uri.into())
            .await
    }

    /// Revoke an issued document. Requires Issuer.
    ///
    /// Revoking an already revoked document succeeds with `changed == false`.
    pub async fn revoke(&self, caller: &CallerContext, hash: DocumentHash) -> Result<RevokeReceipt> {
        self.handle.revoke(*caller, hash).await
    }

    /// Grant Issuer to `target`. Requires Admin.
    pub async fn grant_issuer(&self, caller: &CallerContext, target: Identity) -> Result<RoleReceipt> {
        self.handle.grant_issuer(*caller, target).await
    }

    /// Remove Issuer from `target`. Requires Admin.
    pub async fn revoke_issuer(
        &self,
        caller: &CallerContext,
        target: Identity,
    ) -> Result<RoleReceipt> {
        self.handle.revoke_issuer(*caller, target).await
    }

    /// Authenticate a signed command and apply it as its signer
    ///
    /// The command must be signed for this ledger with a nonce above the
    /// signer's last accepted one; a replay fails with `Signature`.
    pub async fn submit(&self, signed: &SignedCommand) -> Result<Receipt> {
        let caller = match signed.authenticate(&self.initializer) {
            Ok(caller) => caller,
            Err(e) => {
                self.metrics.record_rejection(e.kind());
                tracing::warn!(signer = %signed.signer.short(), error = %e, "Rejected signed command");
                return Err(e);
            }
        };

        match signed.command.clone() {
            Command::Issue {
                hash,
                file_name,
                content_uri,
            } => self
                .issue(&caller, hash, file_name, content_uri)
                .await
                .map(Receipt::Issued),
            Command::Revoke { hash } => self.revoke(&caller, hash).await.map(Receipt::Revoked),
            Command::GrantIssuer { target } => {
                self.grant_issuer(&caller, target).await.map(Receipt::Roles)
            }
            Command::RevokeIssuer { target } => {
                self.revoke_issuer(&caller, target).await.map(Receipt::Roles)
            }
        }
    }

    /// Lowest nonce `signer` may use for its next signed command
    pub fn next_nonce(&self, signer: &Identity) -> Result<u64> {
        Ok(self
            .storage
            .get_nonce(signer)?
            .map_or(0, |last| last.saturating_add(1)))
    }

    /// Record for `hash`, or the absent record if it was never issued
    pub fn get_document(&self, hash: &DocumentHash) -> Result<DocumentRecord> {
        Ok(self
            .storage
            .get_document(hash)?
            .unwrap_or_else(DocumentRecord::absent))
    }

    /// True if `hash` has ever been issued (revoked documents included)
    pub fn has_document(&self, hash: &DocumentHash) -> Result<bool> {
        self.storage.has_document(hash)
    }

    /// Every issued hash, in issuance order
    pub fn get_all_issued_documents(&self) -> Result<Vec<DocumentHash>> {
        self.storage.issued_hashes()
    }

    /// Length of the enumeration index
    pub fn document_count(&self) -> Result<u64> {
        self.storage.index_len()
    }

    /// True if `identity` holds Admin
    pub fn is_admin(&self, identity: &Identity) -> Result<bool> {
        self.roles.is_admin(identity)
    }

    /// True if `identity` holds Issuer
    pub fn is_issuer(&self, identity: &Identity) -> Result<bool> {
        self.roles.is_issuer(identity)
    }

    /// Identity the ledger was initialized with
    pub fn initializer(&self) -> Result<Identity> {
        self.storage
            .initializer()?
            .ok_or_else(|| Error::Corruption("initializer missing".to_string()))
    }

    /// Up to `limit` audit events starting at sequence `from`
    pub fn audit_events(&self, from: u64, limit: usize) -> Result<Vec<AuditEvent>> {
        self.storage.audit_events(from, limit)
    }

    /// Recompute every audit hash and check the chain links
    pub fn verify_audit_chain(&self) -> Result<AuditHead> {
        let mut expected_prev = [0u8; 32];
        let mut next = 0u64;

        loop {
            let page = self.storage.audit_events(next, AUDIT_PAGE)?;
            if page.is_empty() {
                break;
            }
            for event in page {
                if event.sequence != next {
                    return Err(Error::Corruption(format!(
                        "audit gap at sequence {}",
                        next
                    )));
                }
                if event.prev_hash != expected_prev {
                    return Err(Error::Corruption(format!(
                        "audit event {} does not link to its predecessor",
                        next
                    )));
                }
                if event.compute_hash()? != event.event_hash {
                    return Err(Error::Corruption(format!(
                        "audit event {} hash mismatch",
                        next
                    )));
                }
                expected_prev = event.event_hash;
                next += 1;
            }
        }

        let stored_len = self.storage.audit_len()?;
        if stored_len != next {
            return Err(Error::Corruption(format!(
                "audit length {} but {} events chained",
                stored_len, next
            )));
        }

        tracing::debug!(events = next, "Audit chain verified");
        Ok(AuditHead {
            len: next,
            head_hash: expected_prev,
        })
    }

    /// Merkle root over all audit-event hashes
    pub fn audit_root(&self) -> [u8; 32] {
        self.audit_tree.read().root()
    }

    /// Inclusion proof for the audit event at `sequence`
    pub fn audit_proof(&self, sequence: u64) -> Result<MerkleProof> {
        self.audit_tree
            .read()
            .proof(sequence)
            .ok_or_else(|| Error::InvalidInput(format!("no audit event at sequence {}", sequence)))
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Stop the writer after it drains queued mutations
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::KeyPair;
    use crate::types::DocumentStatus;

    fn test_config() -> (Config, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn admin() -> Identity {
        Identity::from_bytes([1; 32])
    }

    async fn open(config: Config) -> Ledger {
        Ledger::open(config, Genesis::new(admin()), Arc::new(ManualClock::new(100)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_initializes_roles_and_genesis_event() {
        let (config, _temp) = test_config();
        let ledger = open(config).await;

        assert!(ledger.is_admin(&admin()).unwrap());
        assert!(ledger.is_issuer(&admin()).unwrap());
        assert_eq!(ledger.initializer().unwrap(), admin());
        assert_eq!(ledger.document_count().unwrap(), 0);

        let events = ledger.audit_events(0, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            AuditEventKind::LedgerInitialized {
                initializer: admin()
            }
        );
        assert_eq!(events[0].recorded_at, 100);
    }

    #[tokio::test]
    async fn test_open_rejects_zero_initializer() {
        let (config, _temp) = test_config();
        let result = Ledger::open(
            config,
            Genesis::new(Identity::ZERO),
            Arc::new(ManualClock::new(0)),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_get_document_absent_sentinel() {
        let (config, _temp) = test_config();
        let ledger = open(config).await;

        let record = ledger
            .get_document(&DocumentHash::from_bytes([7; 32]))
            .unwrap();
        assert!(record.is_absent());
        assert_eq!(record.status(), DocumentStatus::Absent);
    }

    #[tokio::test]
    async fn test_audit_root_and_proofs_track_mutations() {
        let (config, _temp) = test_config();
        let ledger = open(config).await;
        let caller = CallerContext::trusted(admin());

        let root0 = ledger.audit_root();
        let receipt = ledger
            .issue(&caller, DocumentHash::from_bytes([2; 32]), "a.pdf", "")
            .await
            .unwrap();
        let root1 = ledger.audit_root();
        assert_ne!(root0, root1);

        let proof = ledger.audit_proof(receipt.sequence).unwrap();
        assert_eq!(proof.leaf, receipt.event_hash);
        assert!(proof.verify_against(&root1));

        assert!(matches!(ledger.audit_proof(99), Err(Error::InvalidInput(_))));

        let head = ledger.verify_audit_chain().unwrap();
        assert_eq!(head.len, 2);
        assert_eq!(head.head_hash, receipt.event_hash);
    }

    #[tokio::test]
    async fn test_submit_signed_command() {
        let (config, _temp) = test_config();
        let keypair = KeyPair::from_seed(&[9; 32]);
        let ledger = Ledger::open(
            config,
            Genesis::new(keypair.identity()),
            Arc::new(ManualClock::new(5)),
        )
        .await
        .unwrap();

        let hash = DocumentHash::from_bytes([3; 32]);
        let signed = Command::Issue {
            hash,
            file_name: "signed.pdf".to_string(),
            content_uri: String::new(),
        }
        .sign(&keypair, &keypair.identity(), 0)
        .unwrap();

        match ledger.submit(&signed).await.unwrap() {
            Receipt::Issued(receipt) => assert_eq!(receipt.issuer, keypair.identity()),
            other => panic!("expected issue receipt, got {:?}", other),
        }

        // Impersonation: claimed signer differs from the key that signed
        assert_eq!(ledger.next_nonce(&keypair.identity()).unwrap(), 1);

        // Impersonation: claimed signer differs from the key that signed
        let mut forged = Command::Revoke { hash }
            .sign(&KeyPair::generate(), &keypair.identity(), 1)
            .unwrap();
        forged.signer = keypair.identity();
        assert!(matches!(
            ledger.submit(&forged).await,
            Err(Error::Signature(_))
        ));
        assert!(!ledger.get_document(&hash).unwrap().revoked);

        // A forged command does not use up the signer's nonce
        assert_eq!(ledger.next_nonce(&keypair.identity()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_then_mutation_fails() {
        let (config, _temp) = test_config();
        let ledger = open(config).await;
        ledger.shutdown().await.unwrap();

        let result = ledger
            .issue(
                &CallerContext::trusted(admin()),
                DocumentHash::from_bytes([4; 32]),
                "late.pdf",
                "",
            )
            .await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}
