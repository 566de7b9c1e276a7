//! # bailiff-api
//!
//! The receiver service (`bailiff-receiver`) and the sender client
//! (`bailiff-send`) for sealed case documents.
//!
//! The receiver exposes the key registry over HTTP, stores submitted
//! envelopes verbatim and opens them only when a case is downloaded.

use std::sync::Arc;

use bailiff_envelope::Identity;
use bailiff_registry::{
    FileAuditSink, FileBackend, IntegrityChainSink, RegisterRequest, Registry, SeedOutcome,
};
use tracing::info;

pub mod cases;
pub mod client;
pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

pub use cases::{CaseStore, FileCaseStore, InMemoryCaseStore};
pub use client::{ClientError, ReceiverClient, SendMode, SendReport};
pub use config::{LogFormat, ServerConfig};
pub use error::ApiError;
pub use routes::{build_router, AppState};

/// Open the on-disk registry, audit log and case store under
/// `config.data_dir`, and self-register `identity` when configured.
pub async fn bootstrap(config: &ServerConfig, identity: Identity) -> Result<AppState, ApiError> {
    let storage = FileBackend::new(config.registry_dir())?;
    let audit_log = config.audit_log();
    let audit = IntegrityChainSink::resume(Arc::new(FileAuditSink::new(&audit_log)), &audit_log)?;
    let registry = Registry::new(Arc::new(storage), Arc::new(audit));
    let cases = FileCaseStore::new(config.cases_dir())?;

    if config.seed_identity {
        let req = RegisterRequest {
            owner_email: config.owner_email.clone(),
            ..RegisterRequest::new(identity.public_pem(), config.device_name.as_str())
        };
        let (row, outcome) = registry.seed(req).await?;
        match outcome {
            SeedOutcome::Created => info!(key_id = %row.key_id, "receiver key registered"),
            SeedOutcome::Reactivated => info!(key_id = %row.key_id, "receiver key reactivated"),
            SeedOutcome::AlreadyActive => info!(key_id = %row.key_id, "receiver key already active"),
        }
    }

    let active = registry.active_keys().await.map(|k| k.len()).unwrap_or(0);
    info!(active_keys = active, data_dir = %config.data_dir.display(), "registry loaded");

    Ok(AppState {
        registry: Arc::new(registry),
        identity: Arc::new(identity),
        cases: Arc::new(cases),
        max_upload_bytes: config.max_upload_bytes,
    })
}
