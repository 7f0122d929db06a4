//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `documents` - Document records (key: document hash)
//! - `index` - Enumeration Index (key: position, big-endian)
//! - `roles` - Role sets (key: identity)
//! - `nonces` - Last accepted signed-command nonce (key: identity)
//! - `audit` - Hash-chained audit log (key: sequence, big-endian)
//! - `meta` - Initializer and counters
//!
//! Every mutation is a single [`WriteSet`] committed as one RocksDB
//! `WriteBatch`, so readers see all of it or none of it.

use crate::{
    error::{Error, Result},
    index,
    types::{AuditEvent, DocumentHash, DocumentRecord, Identity, RoleSet},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::sync::Arc;

/// Column family names
const CF_DOCUMENTS: &str = "documents";
const CF_INDEX: &str = "index";
const CF_ROLES: &str = "roles";
const CF_NONCES: &str = "nonces";
const CF_AUDIT: &str = "audit";
const CF_META: &str = "meta";

/// Meta keys
const META_INITIALIZER: &[u8] = b"initializer";
const META_INDEX_LEN: &[u8] = b"index_len";
const META_AUDIT_LEN: &[u8] = b"audit_len";

/// Everything one mutation writes, applied atomically
#[derive(Debug, Default)]
pub struct WriteSet {
    /// New or updated document record
    pub document: Option<(DocumentHash, DocumentRecord)>,

    /// Enumeration Index append (position, hash)
    pub index_entry: Option<(u64, DocumentHash)>,

    /// Replacement role set for an identity
    pub roles: Option<(Identity, RoleSet)>,

    /// Signed-command nonce consumed by this mutation
    pub nonce: Option<(Identity, u64)>,

    /// Genesis identity (written once)
    pub initializer: Option<Identity>,

    /// Audit event appended by this mutation
    pub audit: Option<AuditEvent>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_bytes()?);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_DOCUMENTS, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_INDEX, Self::cf_options_sequential()),
            ColumnFamilyDescriptor::new(CF_ROLES, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_NONCES, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_AUDIT, Self::cf_options_sequential()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_point_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups by hash/identity benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_sequential() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn read_u64(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, key)? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Corruption(format!(
                        "meta counter {} has {} bytes",
                        String::from_utf8_lossy(key),
                        bytes.len()
                    ))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
        }
    }

    // Documents

    /// Get document record, `None` if never issued
    pub fn get_document(&self, hash: &DocumentHash) -> Result<Option<DocumentRecord>> {
        let cf = self.cf_handle(CF_DOCUMENTS)?;
        match self.db.get_cf(cf, hash.as_bytes())? {
            None => Ok(None),
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
        }
    }

    /// True if a record exists for `hash`
    pub fn has_document(&self, hash: &DocumentHash) -> Result<bool> {
        let cf = self.cf_handle(CF_DOCUMENTS)?;
        Ok(self.db.get_pinned_cf(cf, hash.as_bytes())?.is_some())
    }

    // Roles

    /// Roles held by `identity` (empty if none)
    pub fn get_roles(&self, identity: &Identity) -> Result<RoleSet> {
        let cf = self.cf_handle(CF_ROLES)?;
        match self.db.get_cf(cf, identity.as_bytes())? {
            None => Ok(RoleSet::EMPTY),
            Some(value) => Ok(bincode::deserialize(&value)?),
        }
    }

    /// Last nonce accepted from `signer`, `None` if it never submitted
    pub fn get_nonce(&self, signer: &Identity) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_NONCES)?;
        match self.db.get_cf(cf, signer.as_bytes())? {
            None => Ok(None),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Corruption(format!("nonce for {} has {} bytes", signer, bytes.len()))
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
        }
    }

    /// Genesis identity, `None` on a fresh store
    pub fn initializer(&self) -> Result<Option<Identity>> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, META_INITIALIZER)? {
            None => Ok(None),
            Some(bytes) => {
                let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Corruption(format!("initializer has {} bytes", bytes.len()))
                })?;
                Ok(Some(Identity::from_bytes(raw)))
            }
        }
    }

    // Enumeration Index

    /// Number of issued hashes
    pub fn index_len(&self) -> Result<u64> {
        self.read_u64(META_INDEX_LEN)
    }

    /// Every issued hash in acceptance order, from one consistent snapshot
    pub fn issued_hashes(&self) -> Result<Vec<DocumentHash>> {
        let cf = self.cf_handle(CF_INDEX)?;
        let snapshot = self.db.snapshot();

        let mut hashes = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            hashes.push(index::decode_entry(hashes.len() as u64, &key, &value)?);
        }

        tracing::debug!(count = hashes.len(), "Enumerated issued documents");
        Ok(hashes)
    }

    // Audit log

    /// Number of audit events
    pub fn audit_len(&self) -> Result<u64> {
        self.read_u64(META_AUDIT_LEN)
    }

    /// Audit event at `sequence`
    pub fn get_audit_event(&self, sequence: u64) -> Result<Option<AuditEvent>> {
        let cf = self.cf_handle(CF_AUDIT)?;
        match self.db.get_cf(cf, sequence.to_be_bytes())? {
            None => Ok(None),
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
        }
    }

    /// Up to `limit` audit events starting at `from`, from one snapshot
    pub fn audit_events(&self, from: u64, limit: usize) -> Result<Vec<AuditEvent>> {
        let cf = self.cf_handle(CF_AUDIT)?;
        let snapshot = self.db.snapshot();
        let start = from.to_be_bytes();

        let mut events = Vec::with_capacity(limit.min(1024));
        for item in snapshot.iterator_cf(cf, IteratorMode::From(&start[..], Direction::Forward)) {
            if events.len() >= limit {
                break;
            }
            let (_, value) = item?;
            events.push(bincode::deserialize::<AuditEvent>(&value)?);
        }

        Ok(events)
    }

    // Batch operations (atomic)

    /// Apply a write set as one atomic batch
    pub fn commit(&self, writes: &WriteSet) -> Result<()> {
        let mut batch = WriteBatch::default();
        let cf_meta = self.cf_handle(CF_META)?;

        if let Some((hash, record)) = &writes.document {
            let cf = self.cf_handle(CF_DOCUMENTS)?;
            batch.put_cf(cf, hash.as_bytes(), bincode::serialize(record)?);
        }

        if let Some((position, hash)) = &writes.index_entry {
            let cf = self.cf_handle(CF_INDEX)?;
            batch.put_cf(cf, index::entry_key(*position), hash.as_bytes());
            batch.put_cf(cf_meta, META_INDEX_LEN, (position + 1).to_be_bytes());
        }

        if let Some((identity, roles)) = &writes.roles {
            let cf = self.cf_handle(CF_ROLES)?;
            if roles.is_empty() {
                batch.delete_cf(cf, identity.as_bytes());
            } else {
                batch.put_cf(cf, identity.as_bytes(), bincode::serialize(roles)?);
            }
        }

        if let Some((signer, nonce)) = &writes.nonce {
            let cf = self.cf_handle(CF_NONCES)?;
            batch.put_cf(cf, signer.as_bytes(), nonce.to_be_bytes());
        }

        if let Some(initializer) = &writes.initializer {
            batch.put_cf(cf_meta, META_INITIALIZER, initializer.as_bytes());
        }

        if let Some(event) = &writes.audit {
            let cf = self.cf_handle(CF_AUDIT)?;
            batch.put_cf(cf, event.sequence.to_be_bytes(), bincode::serialize(event)?);
            batch.put_cf(cf_meta, META_AUDIT_LEN, (event.sequence + 1).to_be_bytes());
        }

        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &opts)?;

        Ok(())
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_documents: self.index_len()?,
            total_audit_events: self.audit_len()?,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries in the Enumeration Index
    pub total_documents: u64,
    /// Entries in the audit log
    pub total_audit_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuditEventKind, Role};
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn test_record(issuer: Identity) -> DocumentRecord {
        DocumentRecord {
            issuer,
            file_name: "contract.pdf".to_string(),
            content_uri: "cid123".to_string(),
            issued_at: 1_700_000_000,
            revoked: false,
        }
    }

    #[test]
    fn test_storage_open_empty() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        assert_eq!(storage.initializer().unwrap(), None);
        assert_eq!(storage.index_len().unwrap(), 0);
        assert_eq!(storage.audit_len().unwrap(), 0);
        assert!(storage.issued_hashes().unwrap().is_empty());
    }

    #[test]
    fn test_commit_document_with_index() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let issuer = Identity::from_bytes([1; 32]);
        let hash = DocumentHash::from_bytes([0xAA; 32]);

        storage
            .commit(&WriteSet {
                document: Some((hash, test_record(issuer))),
                index_entry: Some((0, hash)),
                ..Default::default()
            })
            .unwrap();

        assert!(storage.has_document(&hash).unwrap());
        assert_eq!(storage.get_document(&hash).unwrap(), Some(test_record(issuer)));
        assert_eq!(storage.index_len().unwrap(), 1);
        assert_eq!(storage.issued_hashes().unwrap(), vec![hash]);
    }

    #[test]
    fn test_missing_document_is_none() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let hash = DocumentHash::from_bytes([0xBB; 32]);

        assert_eq!(storage.get_document(&hash).unwrap(), None);
        assert!(!storage.has_document(&hash).unwrap());
    }

    #[test]
    fn test_index_preserves_order_past_255() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let issuer = Identity::from_bytes([1; 32]);
        let mut expected = Vec::new();
        for i in 0..300u64 {
            let mut bytes = [0u8; 32];
            // Descending hash values so key order != hash order
            bytes[..8].copy_from_slice(&(u64::MAX - i).to_be_bytes());
            let hash = DocumentHash::from_bytes(bytes);
            storage
                .commit(&WriteSet {
                    document: Some((hash, test_record(issuer))),
                    index_entry: Some((i, hash)),
                    ..Default::default()
                })
                .unwrap();
            expected.push(hash);
        }

        assert_eq!(storage.issued_hashes().unwrap(), expected);
    }

    #[test]
    fn test_roles_roundtrip_and_clear() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let who = Identity::from_bytes([5; 32]);

        assert_eq!(storage.get_roles(&who).unwrap(), RoleSet::EMPTY);

        storage
            .commit(&WriteSet {
                roles: Some((who, RoleSet::EMPTY.with(Role::Issuer))),
                ..Default::default()
            })
            .unwrap();
        assert!(storage.get_roles(&who).unwrap().contains(Role::Issuer));

        storage
            .commit(&WriteSet {
                roles: Some((who, RoleSet::EMPTY)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(storage.get_roles(&who).unwrap(), RoleSet::EMPTY);
    }

    #[test]
    fn test_nonce_written_with_batch() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let signer = Identity::from_bytes([7; 32]);

        assert_eq!(storage.get_nonce(&signer).unwrap(), None);

        storage
            .commit(&WriteSet {
                roles: Some((signer, RoleSet::EMPTY.with(Role::Issuer))),
                nonce: Some((signer, 41)),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(storage.get_nonce(&signer).unwrap(), Some(41));
        assert!(storage.get_roles(&signer).unwrap().contains(Role::Issuer));
    }

    #[test]
    fn test_oversized_write_buffer_rejected() {
        let (mut config, _temp) = test_config();
        config.rocksdb.write_buffer_size_mb = usize::MAX;

        assert!(matches!(Storage::open(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_audit_range() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut prev = [0u8; 32];
        for sequence in 0..5u64 {
            let event = AuditEvent::chained(
                sequence,
                100 + sequence,
                AuditEventKind::IssuerGranted {
                    admin: Identity::from_bytes([1; 32]),
                    target: Identity::from_bytes([sequence as u8 + 2; 32]),
                },
                prev,
            )
            .unwrap();
            prev = event.event_hash;
            storage
                .commit(&WriteSet {
                    audit: Some(event),
                    ..Default::default()
                })
                .unwrap();
        }

        assert_eq!(storage.audit_len().unwrap(), 5);

        let events = storage.audit_events(2, 2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 2);
        assert_eq!(events[1].sequence, 3);

        assert_eq!(storage.audit_events(4, 10).unwrap().len(), 1);
        assert!(storage.get_audit_event(5).unwrap().is_none());
    }

    #[test]
    fn test_reopen_persists_state() {
        let (config, _temp) = test_config();
        let hash = DocumentHash::from_bytes([0xCC; 32]);
        let initializer = Identity::from_bytes([9; 32]);

        {
            let storage = Storage::open(&config).unwrap();
            storage
                .commit(&WriteSet {
                    document: Some((hash, test_record(initializer))),
                    index_entry: Some((0, hash)),
                    initializer: Some(initializer),
                    ..Default::default()
                })
                .unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.initializer().unwrap(), Some(initializer));
        assert_eq!(storage.issued_hashes().unwrap(), vec![hash]);
        assert_eq!(
            storage.get_stats().unwrap(),
            StorageStats {
                total_documents: 1,
                total_audit_events: 0,
            }
        );
    }
}
