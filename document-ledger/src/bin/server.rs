//! Document ledger server binary
//!
//! Opens the ledger, checks the audit chain and keeps the writer running
//! until interrupted. Configuration comes from the TOML file named by
//! `DOCLEDGER_CONFIG`, or from `DOCLEDGER_*` environment variables.

use anyhow::Context;
use document_ledger::{Config, Genesis, Ledger, SystemClock};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.as_str()));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config, source) = match std::env::var("DOCLEDGER_CONFIG") {
        Ok(path) => (
            Config::from_file(&path).with_context(|| format!("loading config from {}", path))?,
            path,
        ),
        Err(_) => (
            Config::from_env().context("loading config from environment")?,
            "environment".to_string(),
        ),
    };

    init_tracing(&config);
    info!(
        service = %config.service_name,
        version = %config.service_version,
        config = %source,
        "Starting document ledger"
    );

    let initializer = config
        .initializer_identity()?
        .context("an initializer identity is required (DOCLEDGER_INITIALIZER)")?;

    let ledger = Ledger::open(config, Genesis::new(initializer), Arc::new(SystemClock))
        .await
        .context("opening ledger")?;

    let head = ledger
        .verify_audit_chain()
        .context("audit chain verification failed")?;
    let stats = ledger.stats()?;
    info!(
        documents = stats.total_documents,
        audit_events = head.len,
        audit_head = %hex::encode(head.head_hash),
        audit_root = %hex::encode(ledger.audit_root()),
        "Ledger ready"
    );

    signal::ctrl_c().await?;

    info!("Shutting down document ledger");
    ledger.shutdown().await?;
    Ok(())
}
