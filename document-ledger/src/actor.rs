//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task applies every mutation, so check-then-write is never raced
//! - Each mutation is gate → validation → state reads → one `WriteBatch`
//! - Async message passing with a bounded mailbox for backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Ledger (Clone) - many concurrent callers     │
//! │   reads: direct RocksDB    writes: LedgerHandle       │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   authorize() → validate → Storage::commit(WriteSet)  │
//! │   → advance audit head / index length → reply         │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! A caller that stops waiting does not cancel its message: once queued,
//! the mutation is applied and the reply is dropped.
//!
//! Signed callers carry a nonce. The writer rejects a nonce that is not
//! above the stored one, and stores the new one in the same batch as the
//! mutation. Rejected or no-op commands still use up their nonce.
//!
//! The audit Merkle tree is write-locked for the duration of a commit, so
//! an event visible in storage always has an inclusion proof.

use crate::auth::CallerContext;
use crate::clock::Clock;
use crate::config::{LimitsConfig, RevocationScope};
use crate::gate::authorize;
use crate::merkle::MerkleTree;
use crate::metrics::Metrics;
use crate::roles::{self, RoleStore};
use crate::storage::{Storage, WriteSet};
use crate::types::{
    AuditEvent, AuditEventKind, DocumentHash, DocumentRecord, Identity, IssueReceipt,
    RevokeReceipt, Role, RoleReceipt,
};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Issue a document
    Issue {
        caller: CallerContext,
        hash: DocumentHash,
        file_name: String,
        content_uri: String,
        response: oneshot::Sender<Result<IssueReceipt>>,
    },

    /// Revoke a document
    Revoke {
        caller: CallerContext,
        hash: DocumentHash,
        response: oneshot::Sender<Result<RevokeReceipt>>,
    },

    /// Grant Issuer
    GrantIssuer {
        caller: CallerContext,
        target: Identity,
        response: oneshot::Sender<Result<RoleReceipt>>,
    },

    /// Remove Issuer
    RevokeIssuer {
        caller: CallerContext,
        target: Identity,
        response: oneshot::Sender<Result<RoleReceipt>>,
    },

    /// Drain queued mutations, then stop
    Shutdown { response: oneshot::Sender<()> },
}

/// Writer state shared with the read side
#[derive(Debug, Clone)]
pub struct ActorContext {
    /// Storage backend
    pub storage: Arc<Storage>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Metrics sink
    pub metrics: Metrics,
    /// Merkle tree over audit-event hashes
    pub audit_tree: Arc<RwLock<MerkleTree>>,
    /// Input limits
    pub limits: LimitsConfig,
    /// Revocation policy
    pub revocation_scope: RevocationScope,
}

/// Position of the writer in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditCursor {
    /// Number of events written
    pub len: u64,
    /// Hash of the last event (zero if none)
    pub head: [u8; 32],
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    ctx: ActorContext,
    roles: RoleStore,
    mailbox: mpsc::Receiver<LedgerMessage>,
    index_len: u64,
    cursor: AuditCursor,
    /// Nonce claimed by the command being applied
    pending_nonce: Option<(Identity, u64)>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        ctx: ActorContext,
        mailbox: mpsc::Receiver<LedgerMessage>,
        index_len: u64,
        cursor: AuditCursor,
    ) -> Self {
        Self {
            roles: RoleStore::new(ctx.storage.clone()),
            ctx,
            mailbox,
            index_len,
            cursor,
            pending_nonce: None,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut shutdown_ack = None;

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown { response } => {
                    // Stop accepting, keep draining what is already queued
                    self.mailbox.close();
                    shutdown_ack = Some(response);
                }
                msg => self.handle_message(msg),
            }
        }

        tracing::info!(
            documents = self.index_len,
            audit_events = self.cursor.len,
            "Ledger writer stopped"
        );

        // Release storage before acknowledging, so the data directory can be reopened
        drop(self);
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        let started = Instant::now();

        match msg {
            LedgerMessage::Issue {
                caller,
                hash,
                file_name,
                content_uri,
                response,
            } => {
                let result = self.apply(&caller, |actor| {
                    actor.issue(&caller, hash, file_name, content_uri)
                });
                self.observe("issue", &result, started);
                let _ = response.send(result);
            }

            LedgerMessage::Revoke {
                caller,
                hash,
                response,
            } => {
                let result = self.apply(&caller, |actor| actor.revoke(&caller, hash));
                self.observe("revoke", &result, started);
                let _ = response.send(result);
            }

            LedgerMessage::GrantIssuer {
                caller,
                target,
                response,
            } => {
                let result =
                    self.apply(&caller, |actor| actor.change_issuer(&caller, target, true));
                self.observe("grant_issuer", &result, started);
                let _ = response.send(result);
            }

            LedgerMessage::RevokeIssuer {
                caller,
                target,
                response,
            } => {
                let result =
                    self.apply(&caller, |actor| actor.change_issuer(&caller, target, false));
                self.observe("revoke_issuer", &result, started);
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Run `op` with the caller's nonce claimed, consuming it even if `op`
    /// writes nothing
    fn apply<T>(
        &mut self,
        caller: &CallerContext,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.claim_nonce(caller)?;
        let result = op(self);

        if let Some((signer, nonce)) = self.pending_nonce.take() {
            let consumed = self.ctx.storage.commit(&WriteSet {
                nonce: Some((signer, nonce)),
                ..Default::default()
            });
            if let Err(e) = consumed {
                tracing::error!(signer = %signer.short(), nonce, error = %e, "Failed to store nonce");
                if result.is_ok() {
                    return Err(e);
                }
            }
        }
        result
    }

    fn claim_nonce(&mut self, caller: &CallerContext) -> Result<()> {
        self.pending_nonce = None;
        let Some(nonce) = caller.nonce() else {
            return Ok(());
        };

        let signer = caller.identity();
        if let Some(last) = self.ctx.storage.get_nonce(&signer)? {
            if nonce <= last {
                tracing::warn!(
                    signer = %signer.short(),
                    nonce,
                    last,
                    "Rejected replayed or stale command"
                );
                return Err(Error::Signature(format!(
                    "nonce {} is not above last accepted nonce {}",
                    nonce, last
                )));
            }
        }

        self.pending_nonce = Some((signer, nonce));
        Ok(())
    }

    fn observe<T>(&self, operation: &'static str, result: &Result<T>, started: Instant) {
        self.ctx
            .metrics
            .record_write_duration(started.elapsed().as_secs_f64());

        if let Err(e) = result {
            if e.is_rejection() {
                self.ctx.metrics.record_rejection(e.kind());
                tracing::debug!(operation, error = %e, "Mutation rejected");
            } else {
                tracing::error!(operation, error = %e, "Mutation failed");
            }
        }
    }

    fn validate_issue(&self, file_name: &str, content_uri: &str) -> Result<()> {
        if file_name.trim().is_empty() {
            return Err(Error::InvalidInput("file name must not be empty".to_string()));
        }
        if file_name.len() > self.ctx.limits.max_file_name_len {
            return Err(Error::InvalidInput(format!(
                "file name exceeds {} bytes",
                self.ctx.limits.max_file_name_len
            )));
        }
        if content_uri.len() > self.ctx.limits.max_content_uri_len {
            return Err(Error::InvalidInput(format!(
                "content URI exceeds {} bytes",
                self.ctx.limits.max_content_uri_len
            )));
        }
        Ok(())
    }

    fn next_event(&self, recorded_at: u64, kind: AuditEventKind) -> Result<AuditEvent> {
        AuditEvent::chained(self.cursor.len, recorded_at, kind, self.cursor.head)
    }

    /// Commit `writes` with the claimed nonce and move the in-memory cursor
    /// past its audit event
    fn commit(&mut self, mut writes: WriteSet) -> Result<()> {
        writes.nonce = self.pending_nonce.take();

        let mut tree = self.ctx.audit_tree.write();
        self.ctx.storage.commit(&writes)?;
        if let Some(event) = &writes.audit {
            tree.append(event.event_hash);
        }
        drop(tree);

        if writes.index_entry.is_some() {
            self.index_len += 1;
        }
        if let Some(event) = &writes.audit {
            self.cursor = AuditCursor {
                len: event.sequence + 1,
                head: event.event_hash,
            };
        }
        Ok(())
    }

    fn issue(
        &mut self,
        caller: &CallerContext,
        hash: DocumentHash,
        file_name: String,
        content_uri: String,
    ) -> Result<IssueReceipt> {
        authorize(&self.roles, caller, Role::Issuer)?;
        self.validate_issue(&file_name, &content_uri)?;

        if self.ctx.storage.has_document(&hash)? {
            return Err(Error::AlreadyIssued(hash));
        }

        let issuer = caller.identity();
        let issued_at = self.ctx.clock.now();
        let event = self.next_event(
            issued_at,
            AuditEventKind::DocumentIssued {
                hash,
                issuer,
                file_name: file_name.clone(),
                content_uri: content_uri.clone(),
                issued_at,
            },
        )?;
        let receipt = IssueReceipt {
            hash,
            issuer,
            issued_at,
            sequence: event.sequence,
            event_hash: event.event_hash,
        };

        let record = DocumentRecord {
            issuer,
            file_name,
            content_uri,
            issued_at,
            revoked: false,
        };

        self.commit(WriteSet {
            document: Some((hash, record)),
            index_entry: Some((self.index_len, hash)),
            audit: Some(event),
            ..Default::default()
        })?;

        self.ctx.metrics.record_issued(self.index_len);
        tracing::info!(
            hash = %hash,
            issuer = %issuer.short(),
            issued_at,
            sequence = receipt.sequence,
            "Document issued"
        );

        Ok(receipt)
    }

    fn revoke(&mut self, caller: &CallerContext, hash: DocumentHash) -> Result<RevokeReceipt> {
        authorize(&self.roles, caller, Role::Issuer)?;

        let mut record = self
            .ctx
            .storage
            .get_document(&hash)?
            .ok_or(Error::NotFound(hash))?;

        let revoked_by = caller.identity();
        if self.ctx.revocation_scope == RevocationScope::IssuerOfRecord
            && record.issuer != revoked_by
        {
            tracing::warn!(
                hash = %hash,
                caller = %revoked_by.short(),
                "Revocation denied: caller is not the issuer of record"
            );
            return Err(Error::Unauthorized {
                caller: revoked_by,
                required: Role::Issuer,
            });
        }

        let revoked_at = self.ctx.clock.now();

        if record.revoked {
            return Ok(RevokeReceipt {
                hash,
                revoked_by,
                revoked_at,
                changed: false,
                sequence: None,
            });
        }

        record.revoked = true;
        let event = self.next_event(
            revoked_at,
            AuditEventKind::DocumentRevoked {
                hash,
                revoked_by,
                revoked_at,
            },
        )?;
        let sequence = event.sequence;

        self.commit(WriteSet {
            document: Some((hash, record)),
            audit: Some(event),
            ..Default::default()
        })?;

        self.ctx.metrics.record_revoked();
        tracing::info!(
            hash = %hash,
            revoked_by = %revoked_by.short(),
            sequence,
            "Document revoked"
        );

        Ok(RevokeReceipt {
            hash,
            revoked_by,
            revoked_at,
            changed: true,
            sequence: Some(sequence),
        })
    }

    fn change_issuer(
        &mut self,
        caller: &CallerContext,
        target: Identity,
        grant: bool,
    ) -> Result<RoleReceipt> {
        authorize(&self.roles, caller, Role::Admin)?;

        let current = self.roles.roles_of(&target)?;
        let transition = if grant {
            roles::grant_issuer(&target, current)?
        } else {
            roles::revoke_issuer(&target, current)?
        };

        if !transition.changed() {
            return Ok(RoleReceipt {
                target,
                roles: transition.after,
                changed: false,
                sequence: None,
            });
        }

        let admin = caller.identity();
        let kind = if grant {
            AuditEventKind::IssuerGranted { admin, target }
        } else {
            AuditEventKind::IssuerRevoked { admin, target }
        };
        let event = self.next_event(self.ctx.clock.now(), kind)?;
        let sequence = event.sequence;

        self.commit(WriteSet {
            roles: Some((target, transition.after)),
            audit: Some(event),
            ..Default::default()
        })?;

        self.ctx.metrics.record_role_change();
        tracing::info!(
            admin = %admin.short(),
            target = %target.short(),
            grant,
            sequence,
            "Issuer role changed"
        );

        Ok(RoleReceipt {
            target,
            roles: transition.after,
            changed: true,
            sequence: Some(sequence),
        })
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Issue a document
    pub async fn issue(
        &self,
        caller: CallerContext,
        hash: DocumentHash,
        file_name: String,
        content_uri: String,
    ) -> Result<IssueReceipt> {
        self.request(|response| LedgerMessage::Issue {
            caller,
            hash,
            file_name,
            content_uri,
            response,
        })
        .await
    }

    /// Revoke a document
    pub async fn revoke(&self, caller: CallerContext, hash: DocumentHash) -> Result<RevokeReceipt> {
        self.request(|response| LedgerMessage::Revoke {
            caller,
            hash,
            response,
        })
        .await
    }

    /// Grant Issuer
    pub async fn grant_issuer(&self, caller: CallerContext, target: Identity) -> Result<RoleReceipt> {
        self.request(|response| LedgerMessage::GrantIssuer {
            caller,
            target,
            response,
        })
        .await
    }

    /// Remove Issuer
    pub async fn revoke_issuer(
        &self,
        caller: CallerContext,
        target: Identity,
    ) -> Result<RoleReceipt> {
        self.request(|response| LedgerMessage::RevokeIssuer {
            caller,
            target,
            response,
        })
        .await
    }

    /// Shutdown actor after draining queued mutations
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Shutdown acknowledgement lost".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    ctx: ActorContext,
    mailbox_capacity: usize,
    index_len: u64,
    cursor: AuditCursor,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = LedgerActor::new(ctx, rx, index_len, cursor);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::RoleSet;
    use crate::Config;

    fn spawn_with_issuer(issuer: Identity) -> (LedgerHandle, Arc<Storage>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;

        let storage = Arc::new(Storage::open(&config).unwrap());
        storage
            .commit(&WriteSet {
                roles: Some((issuer, RoleSet::ALL)),
                ..Default::default()
            })
            .unwrap();

        let ctx = ActorContext {
            storage: storage.clone(),
            clock: Arc::new(ManualClock::new(1_000)),
            metrics: Metrics::new().unwrap(),
            audit_tree: Arc::new(RwLock::new(MerkleTree::new())),
            limits: LimitsConfig::default(),
            revocation_scope: RevocationScope::AnyIssuer,
        };
        let handle = spawn_ledger_actor(
            ctx,
            16,
            0,
            AuditCursor {
                len: 0,
                head: [0u8; 32],
            },
        );
        (handle, storage, temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _storage, _temp) = spawn_with_issuer(Identity::from_bytes([1; 32]));
        handle.shutdown().await.unwrap();

        // Mailbox is closed afterwards
        let err = handle
            .revoke(
                CallerContext::trusted(Identity::from_bytes([1; 32])),
                DocumentHash::from_bytes([0; 32]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }

    #[tokio::test]
    async fn test_actor_issue_writes_record_index_and_audit() {
        let issuer = Identity::from_bytes([1; 32]);
        let (handle, storage, _temp) = spawn_with_issuer(issuer);
        let hash = DocumentHash::from_bytes([0xAA; 32]);

        let receipt = handle
            .issue(
                CallerContext::trusted(issuer),
                hash,
                "contract.pdf".to_string(),
                "cid123".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.issued_at, 1_000);
        assert_eq!(receipt.sequence, 0);

        let record = storage.get_document(&hash).unwrap().unwrap();
        assert_eq!(record.issuer, issuer);
        assert_eq!(storage.issued_hashes().unwrap(), vec![hash]);

        let event = storage.get_audit_event(0).unwrap().unwrap();
        assert_eq!(event.event_hash, receipt.event_hash);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_empty_file_name() {
        let issuer = Identity::from_bytes([1; 32]);
        let (handle, storage, _temp) = spawn_with_issuer(issuer);
        let hash = DocumentHash::from_bytes([0xAA; 32]);

        let err = handle
            .issue(
                CallerContext::trusted(issuer),
                hash,
                "   ".to_string(),
                String::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!storage.has_document(&hash).unwrap());
        assert_eq!(storage.audit_len().unwrap(), 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_stores_nonce_with_mutation() {
        use crate::auth::Command;
        use crate::crypto::KeyPair;

        let keypair = KeyPair::from_seed(&[5; 32]);
        let signer = keypair.identity();
        let (handle, storage, _temp) = spawn_with_issuer(signer);
        let signed_issue = |byte: u8, nonce: u64| {
            Command::Issue {
                hash: DocumentHash::from_bytes([byte; 32]),
                file_name: "signed.pdf".to_string(),
                content_uri: String::new(),
            }
            .sign(&keypair, &signer, nonce)
            .unwrap()
            .authenticate(&signer)
            .unwrap()
        };

        handle
            .issue(
                signed_issue(0x01, 5),
                DocumentHash::from_bytes([0x01; 32]),
                "signed.pdf".to_string(),
                String::new(),
            )
            .await
            .unwrap();
        assert_eq!(storage.get_nonce(&signer).unwrap(), Some(5));

        let err = handle
            .issue(
                signed_issue(0x02, 5),
                DocumentHash::from_bytes([0x02; 32]),
                "signed.pdf".to_string(),
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Signature(_)));
        assert!(!storage.has_document(&DocumentHash::from_bytes([0x02; 32])).unwrap());
        assert_eq!(storage.audit_len().unwrap(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_mutations() {
        let issuer = Identity::from_bytes([1; 32]);
        let (handle, storage, _temp) = spawn_with_issuer(issuer);

        let mut pending = Vec::new();
        for i in 0..10u8 {
            let handle = handle.clone();
            pending.push(tokio::spawn(async move {
                handle
                    .issue(
                        CallerContext::trusted(issuer),
                        DocumentHash::from_bytes([i; 32]),
                        format!("doc-{}", i),
                        String::new(),
                    )
                    .await
            }));
        }
        for task in pending {
            task.await.unwrap().unwrap();
        }
        handle.shutdown().await.unwrap();

        assert_eq!(storage.index_len().unwrap(), 10);
        assert_eq!(storage.audit_len().unwrap(), 10);
    }
}
