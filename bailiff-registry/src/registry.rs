//! Authorized key registry: registration, revocation, reactivation and the
//! active-recipient directory.

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::error::RegistryError;
use crate::storage::RegistryBackend;
use crate::types::*;

use bailiff_envelope::{DirectoryLookup, PublicKey, Recipient};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct Registry {
    storage: Arc<dyn RegistryBackend>,
    audit: Arc<dyn AuditSinkSync>,
    // Serializes read-modify-write sequences within this process. `create`
    // stays the cross-process uniqueness guard.
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new(storage: Arc<dyn RegistryBackend>, audit: Arc<dyn AuditSinkSync>) -> Self {
        Self {
            storage,
            audit,
            write_lock: Mutex::new(()),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Register a public key.
    ///
    /// - unknown key: a new active row
    /// - active key: `Conflict`
    /// - revoked key: the same row becomes active again, with the new device
    ///   name and owner email
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthorizedKey, RegistryError> {
        let device_name = req.device_name.trim().to_string();
        let owner_email = req
            .owner_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        if device_name.is_empty() {
            self.audit
                .record(AuditEvent::rejection(None, "blank device name"));
            return Err(RegistryError::InvalidRequest("deviceName must not be blank".into()));
        }
        if let Err(e) = PublicKey::from_pem(&req.public_key) {
            self.audit.record(
                AuditEvent::rejection(None, "unparseable public key").with_device(&device_name),
            );
            return Err(RegistryError::InvalidPublicKey(e.to_string()));
        }

        let key_id = KeyId::for_public_key(&req.public_key);
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.storage.get(&key_id)? {
            return self.reactivate(existing, device_name, owner_email);
        }

        let now = Utc::now();
        let row = AuthorizedKey {
            key_id: key_id.clone(),
            public_key: req.public_key,
            device_name,
            owner_email,
            is_active: true,
            created_at: now,
            updated_at: now,
            revoked_at: None,
        };

        match self.storage.create(&row) {
            Ok(()) => {
                info!(key_id = %row.key_id, device_name = %row.device_name, "key registered");
                self.audit.record(
                    AuditEvent::key_event(&row.key_id, KeyStatus::Active, AuditAction::KeyRegistered)
                        .with_device(&row.device_name),
                );
                Ok(row)
            }
            Err(RegistryError::Conflict(_)) => {
                // Another writer created the row first; take the path it left us.
                debug!(key_id = %key_id, "lost create race, re-reading row");
                let existing = self
                    .storage
                    .get(&key_id)?
                    .ok_or_else(|| RegistryError::Storage(format!("row {key_id} vanished after conflict")))?;
                self.reactivate(existing, row.device_name, row.owner_email)
            }
            Err(e) => Err(e),
        }
    }

    fn reactivate(
        &self,
        mut existing: AuthorizedKey,
        device_name: String,
        owner_email: Option<String>,
    ) -> Result<AuthorizedKey, RegistryError> {
        if existing.is_active {
            self.audit.record(
                AuditEvent::rejection(Some(&existing.key_id), "already registered")
                    .with_device(&device_name),
            );
            return Err(RegistryError::Conflict(existing.key_id));
        }

        let previous_device_name = std::mem::replace(&mut existing.device_name, device_name);
        if previous_device_name != existing.device_name {
            warn!(
                key_id = %existing.key_id,
                previous = %previous_device_name,
                current = %existing.device_name,
                "revoked key re-registered under a different device name"
            );
        }
        existing.owner_email = owner_email;
        existing.is_active = true;
        existing.updated_at = Utc::now();
        existing.revoked_at = None;
        self.storage.update(&existing)?;

        info!(key_id = %existing.key_id, device_name = %existing.device_name, "key reactivated");
        self.audit.record(
            AuditEvent::key_event(
                &existing.key_id,
                KeyStatus::Active,
                AuditAction::KeyReactivated {
                    previous_device_name,
                },
            )
            .with_device(&existing.device_name),
        );
        Ok(existing)
    }

    /// Revoke a key. Revoking a revoked key returns the row unchanged.
    pub async fn revoke(&self, key_id: &KeyId) -> Result<AuthorizedKey, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut row = self
            .storage
            .get(key_id)?
            .ok_or_else(|| RegistryError::NotFound(key_id.clone()))?;

        if !row.is_active {
            debug!(key_id = %key_id, "revoke of already revoked key");
            self.audit.record(
                AuditEvent::key_event(key_id, KeyStatus::Revoked, AuditAction::RevokeNoop)
                    .with_device(&row.device_name),
            );
            return Ok(row);
        }

        let now = Utc::now();
        row.is_active = false;
        row.updated_at = now;
        row.revoked_at = Some(now);
        self.storage.update(&row)?;

        info!(key_id = %key_id, device_name = %row.device_name, "key revoked");
        self.audit.record(
            AuditEvent::key_event(key_id, KeyStatus::Revoked, AuditAction::KeyRevoked)
                .with_device(&row.device_name),
        );
        Ok(row)
    }

    /// Register `req` unless it is already active; reactivate it if revoked.
    ///
    /// Reactivation here only flips the row back to active: the stored device
    /// name and owner email win over the ones in `req`.
    pub async fn seed(&self, mut req: RegisterRequest) -> Result<(AuthorizedKey, SeedOutcome), RegistryError> {
        let key_id = KeyId::for_public_key(&req.public_key);
        let before = self.storage.get(&key_id)?;
        if let Some(stored) = before.as_ref().filter(|row| !row.is_active) {
            req.device_name = stored.device_name.clone();
            req.owner_email = stored.owner_email.clone();
        }
        match self.register(req).await {
            Ok(row) => {
                let outcome = if before.is_some() {
                    SeedOutcome::Reactivated
                } else {
                    SeedOutcome::Created
                };
                Ok((row, outcome))
            }
            Err(RegistryError::Conflict(id)) => {
                let row = self
                    .storage
                    .get(&id)?
                    .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
                Ok((row, SeedOutcome::AlreadyActive))
            }
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Every active row, newest first: the set a sender must seal for.
    pub async fn active_keys(&self) -> Result<Vec<ActiveKey>, RegistryError> {
        let mut rows: Vec<AuthorizedKey> = self
            .storage
            .list()?
            .into_iter()
            .filter(|k| k.is_active)
            .collect();
        newest_first(&mut rows);
        Ok(rows.into_iter().map(ActiveKey::from).collect())
    }

    /// Every row, newest first, without key material.
    pub async fn all_keys(&self) -> Result<Vec<KeySummary>, RegistryError> {
        let mut rows = self.storage.list()?;
        newest_first(&mut rows);
        Ok(rows.into_iter().map(KeySummary::from).collect())
    }

    pub async fn find_by_key_id(&self, key_id: &KeyId) -> Result<Option<AuthorizedKey>, RegistryError> {
        self.storage.get(key_id)
    }

    /// In-process directory lookup.
    pub async fn lookup(&self) -> DirectoryLookup {
        let active = match self.active_keys().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "registry unavailable for directory lookup");
                return DirectoryLookup::Unavailable(e.to_string());
            }
        };

        let recipients = active
            .into_iter()
            .filter_map(|k| match Recipient::with_key_id(k.key_id.clone(), &k.public_key) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(key_id = %k.key_id, error = %e, "skipping active key with unusable PEM");
                    None
                }
            })
            .collect();
        DirectoryLookup::from_recipients(recipients)
    }
}

fn newest_first(rows: &mut [AuthorizedKey]) {
    rows.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.key_id.cmp(&b.key_id))
    });
}
