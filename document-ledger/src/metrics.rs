//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `docledger_documents_issued_total` - Documents issued
//! - `docledger_documents_revoked_total` - Documents revoked (state changes only)
//! - `docledger_role_changes_total` - Issuer grants and removals that changed state
//! - `docledger_rejections_total{kind}` - Mutations rejected, by error kind
//! - `docledger_write_duration_seconds` - Writer latency per mutation
//! - `docledger_indexed_documents` - Entries in the Enumeration Index

use crate::error::ErrorKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Documents issued
    pub documents_issued: IntCounter,

    /// Documents revoked
    pub documents_revoked: IntCounter,

    /// Role changes
    pub role_changes: IntCounter,

    /// Rejected mutations by kind
    pub rejections: IntCounterVec,

    /// Writer latency histogram
    pub write_duration: Histogram,

    /// Enumeration Index size
    pub indexed_documents: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("documents_issued", &self.documents_issued.get())
            .field("documents_revoked", &self.documents_revoked.get())
            .field("indexed_documents", &self.indexed_documents.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let documents_issued = IntCounter::new(
            "docledger_documents_issued_total",
            "Total number of documents issued",
        )?;
        registry.register(Box::new(documents_issued.clone()))?;

        let documents_revoked = IntCounter::new(
            "docledger_documents_revoked_total",
            "Total number of documents revoked",
        )?;
        registry.register(Box::new(documents_revoked.clone()))?;

        let role_changes = IntCounter::new(
            "docledger_role_changes_total",
            "Total number of issuer grants and removals",
        )?;
        registry.register(Box::new(role_changes.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new(
                "docledger_rejections_total",
                "Mutations rejected, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let write_duration = Histogram::with_opts(
            HistogramOpts::new(
                "docledger_write_duration_seconds",
                "Writer latency per mutation",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250]),
        )?;
        registry.register(Box::new(write_duration.clone()))?;

        let indexed_documents = IntGauge::new(
            "docledger_indexed_documents",
            "Entries in the enumeration index",
        )?;
        registry.register(Box::new(indexed_documents.clone()))?;

        Ok(Self {
            documents_issued,
            documents_revoked,
            role_changes,
            rejections,
            write_duration,
            indexed_documents,
            registry,
        })
    }

    /// Record a committed issuance
    pub fn record_issued(&self, index_len: u64) {
        self.documents_issued.inc();
        self.indexed_documents.set(index_len as i64);
    }

    /// Record a committed revocation
    pub fn record_revoked(&self) {
        self.documents_revoked.inc();
    }

    /// Record a committed role change
    pub fn record_role_change(&self) {
        self.role_changes.inc();
    }

    /// Record a rejected mutation
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejections.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record writer latency
    pub fn record_write_duration(&self, duration_seconds: f64) {
        self.write_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
