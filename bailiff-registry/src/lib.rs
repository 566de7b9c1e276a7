//! # bailiff-registry
//!
//! The authorized key registry: which public keys a sender must seal case
//! documents for.
//!
//! Rows are keyed by `KeyId`, derived from the public key PEM, so one key
//! pair is one identity no matter which device registers it. Rows move
//! between active and revoked and are never deleted.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bailiff_registry::*;
//! use std::sync::Arc;
//!
//! # async fn demo(pem: &str) -> Result<(), RegistryError> {
//! let registry = Registry::new(Arc::new(InMemoryBackend::new()), Arc::new(TracingAuditSink));
//!
//! let row = registry.register(RegisterRequest::new(pem, "court-1")).await?;
//! assert!(row.is_active);
//!
//! // What a sender seals for
//! let lookup = registry.lookup().await;
//!
//! registry.revoke(&row.key_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod error;
pub mod registry;
pub mod storage;
pub mod types;

pub use audit::{
    read_log, verify_chain, AuditAction, AuditEvent, AuditSinkSync, FileAuditSink, InMemoryAuditSink,
    IntegrityChainSink, TracingAuditSink,
};
pub use error::RegistryError;
pub use registry::Registry;
pub use storage::{FileBackend, InMemoryBackend, RegistryBackend};
pub use types::{ActiveKey, AuthorizedKey, KeyId, KeyStatus, KeySummary, RegisterRequest, SeedOutcome};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bailiff_envelope::{Bailiff, DirectoryLookup, Identity, KeyPair, SealPlan};
    use std::sync::{Arc, OnceLock};

    fn identities() -> &'static [Identity] {
        static IDS: OnceLock<Vec<Identity>> = OnceLock::new();
        IDS.get_or_init(|| {
            (0..3)
                .map(|_| Identity::from_key_pair(KeyPair::generate_with_bits(1024).unwrap()).unwrap())
                .collect()
        })
    }

    fn pem(i: usize) -> &'static str {
        identities()[i].public_pem()
    }

    fn test_registry() -> Registry {
        Registry::new(Arc::new(InMemoryBackend::new()), Arc::new(InMemoryAuditSink::new()))
    }

    fn test_registry_with_audit() -> (Registry, Arc<InMemoryAuditSink>) {
        let audit = Arc::new(InMemoryAuditSink::new());
        let registry = Registry::new(Arc::new(InMemoryBackend::new()), audit.clone());
        (registry, audit)
    }

    // -- register ---------------------------------------------------------

    #[tokio::test]
    async fn test_register_creates_active_row() {
        let reg = test_registry();
        let row = reg
            .register(RegisterRequest::new(pem(0), "court-1").with_owner_email("clerk@court.example"))
            .await
            .unwrap();

        assert_eq!(&row.key_id, identities()[0].key_id());
        assert!(row.is_active);
        assert_eq!(row.status(), KeyStatus::Active);
        assert_eq!(row.device_name, "court-1");
        assert_eq!(row.owner_email.as_deref(), Some("clerk@court.example"));
        assert_eq!(row.public_key, pem(0));
        assert!(row.revoked_at.is_none());
    }

    #[tokio::test]
    async fn test_register_active_twice_conflicts() {
        let (reg, audit) = test_registry_with_audit();
        let row = reg.register(RegisterRequest::new(pem(0), "court-1")).await.unwrap();
        let err = reg
            .register(RegisterRequest::new(pem(0), "court-2"))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Conflict(row.key_id.clone()));

        // Conflict leaves the row untouched.
        let stored = reg.find_by_key_id(&row.key_id).await.unwrap().unwrap();
        assert_eq!(stored.device_name, "court-1");

        let actions: Vec<_> = audit.events().into_iter().map(|e| e.action).collect();
        assert!(matches!(actions[1], AuditAction::RegistrationRejected { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let reg = test_registry();
        assert!(matches!(
            reg.register(RegisterRequest::new("not a key", "court-1")).await,
            Err(RegistryError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            reg.register(RegisterRequest::new(pem(0), "   ")).await,
            Err(RegistryError::InvalidRequest(_))
        ));
        assert!(reg.all_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_owner_email_is_none() {
        let reg = test_registry();
        let row = reg
            .register(RegisterRequest::new(pem(0), "court-1").with_owner_email("  "))
            .await
            .unwrap();
        assert_eq!(row.owner_email, None);
    }

    // -- revoke -----------------------------------------------------------

    #[tokio::test]
    async fn test_revoke_and_idempotence() {
        let (reg, audit) = test_registry_with_audit();
        let row = reg.register(RegisterRequest::new(pem(0), "court-1")).await.unwrap();

        let first = reg.revoke(&row.key_id).await.unwrap();
        assert!(!first.is_active);
        assert!(first.revoked_at.is_some());

        let second = reg.revoke(&row.key_id).await.unwrap();
        assert_eq!(second, first);

        let actions: Vec<_> = audit
            .events_for_key(&row.key_id)
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::KeyRegistered,
                AuditAction::KeyRevoked,
                AuditAction::RevokeNoop
            ]
        );
    }

    #[tokio::test]
    async fn test_revoke_unknown_is_not_found() {
        let reg = test_registry();
        let id = KeyId::new("0000000000000000");
        assert_eq!(reg.revoke(&id).await, Err(RegistryError::NotFound(id)));
    }

    // -- reactivation -----------------------------------------------------

    #[tokio::test]
    async fn test_reregister_revoked_key_reuses_row() {
        let (reg, audit) = test_registry_with_audit();
        let original = reg
            .register(RegisterRequest::new(pem(0), "court-1").with_owner_email("a@court.example"))
            .await
            .unwrap();
        reg.revoke(&original.key_id).await.unwrap();

        let back = reg
            .register(RegisterRequest::new(pem(0), "court-1-replacement"))
            .await
            .unwrap();
        assert_eq!(back.key_id, original.key_id);
        assert_eq!(back.created_at, original.created_at);
        assert!(back.is_active);
        assert!(back.revoked_at.is_none());
        assert_eq!(back.device_name, "court-1-replacement");
        assert_eq!(back.owner_email, None);
        assert_eq!(reg.all_keys().await.unwrap().len(), 1);

        let last = audit.events().pop().unwrap();
        assert_eq!(
            last.action,
            AuditAction::KeyReactivated {
                previous_device_name: "court-1".into()
            }
        );
    }

    // -- queries ----------------------------------------------------------

    #[tokio::test]
    async fn test_active_and_all_listings() {
        let reg = test_registry();
        let a = reg.register(RegisterRequest::new(pem(0), "court-1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = reg.register(RegisterRequest::new(pem(1), "court-2")).await.unwrap();
        reg.revoke(&a.key_id).await.unwrap();

        let active = reg.active_keys().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key_id, b.key_id);
        assert_eq!(active[0].public_key, pem(1));

        let all = reg.all_keys().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key_id, b.key_id, "newest first");
        assert!(!all[1].is_active);

        // The admin listing never carries key material.
        let json = serde_json::to_string(&all).unwrap();
        assert!(!json.contains("BEGIN PUBLIC KEY"));
        assert!(!json.contains("publicKey"));
    }

    #[tokio::test]
    async fn test_find_by_key_id() {
        let reg = test_registry();
        let row = reg.register(RegisterRequest::new(pem(2), "court-3")).await.unwrap();
        assert_eq!(reg.find_by_key_id(&row.key_id).await.unwrap(), Some(row));
        assert_eq!(
            reg.find_by_key_id(&KeyId::new("ffffffffffffffff")).await.unwrap(),
            None
        );
    }

    // -- directory --------------------------------------------------------

    #[tokio::test]
    async fn test_lookup_drives_seal_plan() {
        let reg = test_registry();
        assert!(matches!(reg.lookup().await, DirectoryLookup::Empty));

        let row = reg.register(RegisterRequest::new(pem(0), "court-1")).await.unwrap();
        let SealPlan::Recipients(recipients) = reg.lookup().await.into_plan() else {
            panic!("expected recipients");
        };
        assert_eq!(recipients.len(), 1);

        let env = Bailiff::new().seal(b"hello-pdf", &recipients).unwrap();
        let doc = Bailiff::new().open(&env, &identities()[0]).unwrap();
        assert!(doc.verified);

        reg.revoke(&row.key_id).await.unwrap();
        assert!(matches!(
            reg.lookup().await.into_plan(),
            SealPlan::LegacyFallback(_)
        ));
    }

    struct BrokenBackend;

    impl RegistryBackend for BrokenBackend {
        fn get(&self, _: &KeyId) -> Result<Option<AuthorizedKey>, RegistryError> {
            Err(RegistryError::Storage("disk on fire".into()))
        }
        fn create(&self, _: &AuthorizedKey) -> Result<(), RegistryError> {
            Err(RegistryError::Storage("disk on fire".into()))
        }
        fn update(&self, _: &AuthorizedKey) -> Result<(), RegistryError> {
            Err(RegistryError::Storage("disk on fire".into()))
        }
        fn list(&self) -> Result<Vec<AuthorizedKey>, RegistryError> {
            Err(RegistryError::Storage("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_unavailable() {
        let reg = Registry::new(Arc::new(BrokenBackend), Arc::new(TracingAuditSink));
        assert!(matches!(reg.lookup().await, DirectoryLookup::Unavailable(_)));
    }

    // -- seed -------------------------------------------------------------

    #[tokio::test]
    async fn test_seed_outcomes() {
        let reg = test_registry();
        let req = RegisterRequest::new(pem(0), "tribunal-primary");

        let (row, outcome) = reg.seed(req.clone()).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Created);

        let (_, outcome) = reg.seed(req.clone()).await.unwrap();
        assert_eq!(outcome, SeedOutcome::AlreadyActive);

        reg.revoke(&row.key_id).await.unwrap();
        let (row, outcome) = reg.seed(req).await.unwrap();
        assert_eq!(outcome, SeedOutcome::Reactivated);
        assert!(row.is_active);
    }

    #[tokio::test]
    async fn test_seed_reactivation_keeps_stored_metadata() {
        let reg = test_registry();
        let req = RegisterRequest {
            owner_email: Some("clerk@court.example".into()),
            ..RegisterRequest::new(pem(0), "registry-desk")
        };
        let row = reg.register(req).await.unwrap();
        reg.revoke(&row.key_id).await.unwrap();

        let (row, outcome) = reg
            .seed(RegisterRequest::new(pem(0), "tribunal-primary"))
            .await
            .unwrap();
        assert_eq!(outcome, SeedOutcome::Reactivated);
        assert!(row.is_active);
        assert_eq!(row.device_name, "registry-desk");
        assert_eq!(row.owner_email.as_deref(), Some("clerk@court.example"));

        let stored = reg.find_by_key_id(&row.key_id).await.unwrap().unwrap();
        assert_eq!(stored.device_name, "registry-desk");
    }

    // -- concurrency ------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_yields_one_row() {
        let reg = Arc::new(test_registry());
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let reg = reg.clone();
                tokio::spawn(async move {
                    reg.register(RegisterRequest::new(pem(0), format!("device-{i}"))).await
                })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => ok += 1,
                Err(RegistryError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 7));
        assert_eq!(reg.all_keys().await.unwrap().len(), 1);
    }
}
