//! Credential lifecycle: create, update, decrypt, revoke, activate, delete.
//!
//! Status transitions:
//!
//! ```text
//!   create ──▶ active ◀──activate── revoked
//!                │  │                  ▲
//!                │  └─────revoke───────┘
//!   expires_at   │         ▲
//!     passes     ▼         │ revoke
//!             expired ─────┘
//!                └──activate──▶ active   (only once expires_at is in the future)
//! ```
//!
//! The only write on a read path is the lazy `active -> expired` transition,
//! which is idempotent and best-effort.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    Credential, CredentialData, CredentialStatus, CredentialType, SystemCredential, Usability,
};
use crate::config::CredentialsConfig;
use crate::crypto::{EncryptedSecret, EnvelopeCipher};
use crate::error::{CredentialError, CredentialResult};
use crate::store::{CredentialStore, SystemCredentialStore};

/// Input for [`CredentialManager::create`].
#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    pub name: String,
    pub description: String,
    /// Raw type tag, validated on create
    pub credential_type: String,
    pub data: Option<CredentialData>,
    pub metadata: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for [`CredentialManager::create_system_credential`].
#[derive(Debug, Clone, Default)]
pub struct NewSystemCredential {
    pub name: String,
    pub description: String,
    pub credential_type: String,
    pub data: Option<CredentialData>,
    pub metadata: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// New secret; replaces the old ciphertext entirely
    pub data: Option<CredentialData>,
    pub metadata: Option<Value>,
    /// `Some(None)` clears the expiry
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// A tenant credential together with its opened secret.
#[derive(Debug, Clone)]
pub struct DecryptedCredential {
    pub record: Credential,
    pub data: CredentialData,
}

#[derive(Debug, Clone)]
pub struct DecryptedSystemCredential {
    pub record: SystemCredential,
    pub data: CredentialData,
}

/// Owns credential state transitions and the encrypt/decrypt boundary.
///
/// Holds no mutable state of its own; concurrent callers only contend in
/// the store.
pub struct CredentialManager {
    credentials: Arc<dyn CredentialStore>,
    system: Arc<dyn SystemCredentialStore>,
    cipher: Arc<EnvelopeCipher>,
    settings: CredentialsConfig,
}

impl CredentialManager {
    pub fn new<S>(store: Arc<S>, cipher: Arc<EnvelopeCipher>, settings: CredentialsConfig) -> Self
    where
        S: CredentialStore + SystemCredentialStore + 'static,
    {
        Self {
            credentials: store.clone(),
            system: store,
            cipher,
            settings,
        }
    }

    fn validate_name(&self, name: &str) -> CredentialResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CredentialError::validation("name", "is required"));
        }
        if name.chars().count() > self.settings.max_name_length {
            return Err(CredentialError::validation(
                "name",
                format!("must be at most {} characters", self.settings.max_name_length),
            ));
        }
        if name.chars().any(char::is_control) {
            return Err(CredentialError::validation(
                "name",
                "must not contain control characters",
            ));
        }
        Ok(name.to_string())
    }

    /// Checks type tag and payload together: both present, type known, and
    /// the payload shaped for that type.
    fn validate_payload(
        credential_type: &str,
        data: Option<CredentialData>,
    ) -> CredentialResult<(CredentialType, CredentialData)> {
        if credential_type.trim().is_empty() {
            return Err(CredentialError::validation("credential_type", "is required"));
        }
        let credential_type: CredentialType = credential_type.trim().parse()?;
        let data = data.ok_or_else(|| CredentialError::validation("data", "is required"))?;
        Self::validate_data(credential_type, &data)?;
        Ok((credential_type, data))
    }

    fn validate_data(credential_type: CredentialType, data: &CredentialData) -> CredentialResult<()> {
        if data.credential_type() != credential_type {
            return Err(CredentialError::validation(
                "data",
                format!(
                    "payload is {} but credential type is {}",
                    data.credential_type(),
                    credential_type
                ),
            ));
        }
        data.validate()
    }

    fn seal(&self, name: &str, data: &CredentialData) -> CredentialResult<EncryptedSecret> {
        let encryption_failed = || CredentialError::EncryptionFailed {
            name: name.to_string(),
        };
        let plaintext = data.to_json_bytes().map_err(|_| encryption_failed())?;
        self.cipher
            .encrypt(&plaintext)
            .map_err(|_| encryption_failed())
    }

    fn open(&self, name: &str, secret: &EncryptedSecret) -> CredentialResult<CredentialData> {
        let decryption_failed = || CredentialError::DecryptionFailed {
            name: name.to_string(),
        };
        let plaintext = self.cipher.decrypt(secret).map_err(|_| decryption_failed())?;
        CredentialData::from_json_bytes(&plaintext).map_err(|_| decryption_failed())
    }

    /// Creates an active tenant credential.
    pub fn create(&self, tenant_id: Uuid, input: NewCredential) -> CredentialResult<Credential> {
        let name = self.validate_name(&input.name)?;
        let (credential_type, data) = Self::validate_payload(&input.credential_type, input.data)?;
        let secret = self.seal(&name, &data)?;

        let now = Utc::now();
        let credential = Credential {
            id: Uuid::now_v7(),
            tenant_id,
            name,
            description: input.description,
            credential_type,
            secret,
            metadata: input.metadata.unwrap_or_else(|| Value::Object(Default::default())),
            expires_at: input.expires_at,
            status: CredentialStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.credentials.insert_credential(&credential)?;

        info!(
            tenant_id = %tenant_id,
            credential_id = %credential.id,
            credential = %credential.name,
            credential_type = %credential.credential_type,
            "Credential created"
        );
        Ok(credential)
    }

    /// Loads a credential's record without decrypting it.
    pub fn get(&self, tenant_id: Uuid, id: Uuid) -> CredentialResult<Credential> {
        self.credentials
            .get_credential(tenant_id, id)?
            .ok_or_else(|| CredentialError::not_found("credential", id.to_string()))
    }

    pub fn list(&self, tenant_id: Uuid) -> CredentialResult<Vec<Credential>> {
        Ok(self.credentials.list_credentials(tenant_id)?)
    }

    /// Usable credentials whose expiry falls inside the warning window.
    pub fn list_expiring(&self, tenant_id: Uuid, now: DateTime<Utc>) -> CredentialResult<Vec<Credential>> {
        let horizon = now + Duration::hours(self.settings.expiry_warning_hours);
        Ok(self
            .list(tenant_id)?
            .into_iter()
            .filter(|c| c.usability(now) == Usability::Usable)
            .filter(|c| c.expires_at.is_some_and(|at| at <= horizon))
            .collect())
    }

    /// Applies a partial update. New secret data is re-encrypted under a
    /// fresh data key; the credential's type cannot change.
    pub fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        update: CredentialUpdate,
    ) -> CredentialResult<Credential> {
        let mut credential = self.get(tenant_id, id)?;

        if let Some(name) = update.name {
            credential.name = self.validate_name(&name)?;
        }
        if let Some(description) = update.description {
            credential.description = description;
        }
        if let Some(metadata) = update.metadata {
            credential.metadata = metadata;
        }
        if let Some(expires_at) = update.expires_at {
            credential.expires_at = expires_at;
        }
        let reencrypted = match update.data {
            Some(data) => {
                Self::validate_data(credential.credential_type, &data)?;
                credential.secret = self.seal(&credential.name, &data)?;
                true
            }
            None => false,
        };
        credential.updated_at = Utc::now();

        if !self.credentials.update_credential(&credential)? {
            return Err(CredentialError::not_found("credential", id.to_string()));
        }

        info!(
            tenant_id = %tenant_id,
            credential_id = %id,
            credential = %credential.name,
            reencrypted,
            "Credential updated"
        );
        Ok(credential)
    }

    /// Decrypts a credential after checking it is usable.
    ///
    /// An active credential found past its expiry is marked `expired` on the
    /// way out; that write is best-effort and the caller gets
    /// [`CredentialError::Expired`] either way.
    pub fn get_decrypted(&self, tenant_id: Uuid, id: Uuid) -> CredentialResult<DecryptedCredential> {
        let credential = self.get(tenant_id, id)?;
        let now = Utc::now();

        match credential.usability(now) {
            Usability::Revoked => Err(CredentialError::Revoked {
                name: credential.name,
            }),
            Usability::Expired => {
                if credential.status == CredentialStatus::Active {
                    self.mark_expired(&credential, now);
                }
                Err(CredentialError::Expired {
                    name: credential.name,
                })
            }
            Usability::Usable => {
                let data = self.open(&credential.name, &credential.secret)?;
                debug!(
                    tenant_id = %tenant_id,
                    credential_id = %id,
                    credential = %credential.name,
                    "Credential decrypted"
                );
                Ok(DecryptedCredential {
                    record: credential,
                    data,
                })
            }
        }
    }

    /// Caches a detected expiry. Compare-and-set against the loaded
    /// snapshot, so a concurrent revoke or expiry extension always wins.
    fn mark_expired(&self, credential: &Credential, now: DateTime<Utc>) {
        let Some(expires_at) = credential.expires_at else {
            return;
        };
        match self
            .credentials
            .mark_expired_if(credential.tenant_id, credential.id, expires_at, now)
        {
            Ok(true) => info!(
                tenant_id = %credential.tenant_id,
                credential_id = %credential.id,
                credential = %credential.name,
                "Credential expired"
            ),
            Ok(false) => debug!(
                credential_id = %credential.id,
                "Credential changed since read, expiry not recorded"
            ),
            Err(e) => warn!(
                credential_id = %credential.id,
                error = %e,
                "Failed to record credential expiry"
            ),
        }
    }

    /// Moves a credential to `revoked`. It stays stored but can no longer
    /// authenticate anything.
    pub fn revoke(&self, tenant_id: Uuid, id: Uuid) -> CredentialResult<Credential> {
        let credential = self.get(tenant_id, id)?;
        self.transition(credential, CredentialStatus::Revoked)
    }

    /// Moves a credential back to `active`.
    ///
    /// Fails with [`CredentialError::Expired`] and leaves the status as it
    /// was if `expires_at` has passed; extend the expiry first.
    pub fn activate(&self, tenant_id: Uuid, id: Uuid) -> CredentialResult<Credential> {
        let credential = self.get(tenant_id, id)?;
        if credential.is_past_expiry(Utc::now()) {
            return Err(CredentialError::Expired {
                name: credential.name,
            });
        }
        self.transition(credential, CredentialStatus::Active)
    }

    fn transition(
        &self,
        mut credential: Credential,
        status: CredentialStatus,
    ) -> CredentialResult<Credential> {
        let now = Utc::now();
        if !self.credentials.set_credential_status(
            credential.tenant_id,
            credential.id,
            status,
            now,
        )? {
            return Err(CredentialError::not_found(
                "credential",
                credential.id.to_string(),
            ));
        }
        info!(
            tenant_id = %credential.tenant_id,
            credential_id = %credential.id,
            credential = %credential.name,
            from = %credential.status,
            to = %status,
            "Credential status changed"
        );
        credential.status = status;
        credential.updated_at = now;
        Ok(credential)
    }

    /// Removes a credential and its shares. Ownership is checked through the
    /// tenant key only.
    pub fn delete(&self, tenant_id: Uuid, id: Uuid) -> CredentialResult<()> {
        if !self.credentials.delete_credential(tenant_id, id)? {
            return Err(CredentialError::not_found("credential", id.to_string()));
        }
        info!(tenant_id = %tenant_id, credential_id = %id, "Credential deleted");
        Ok(())
    }

    pub fn create_system_credential(
        &self,
        input: NewSystemCredential,
    ) -> CredentialResult<SystemCredential> {
        let name = self.validate_name(&input.name)?;
        let (credential_type, data) = Self::validate_payload(&input.credential_type, input.data)?;
        let secret = self.seal(&name, &data)?;

        let now = Utc::now();
        let credential = SystemCredential {
            id: Uuid::now_v7(),
            name,
            description: input.description,
            credential_type,
            secret,
            metadata: input.metadata.unwrap_or_else(|| Value::Object(Default::default())),
            expires_at: input.expires_at,
            status: CredentialStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.system.insert_system_credential(&credential)?;

        info!(
            credential = %credential.name,
            credential_type = %credential.credential_type,
            "System credential created"
        );
        Ok(credential)
    }

    pub fn get_system_credential(&self, name: &str) -> CredentialResult<SystemCredential> {
        self.system
            .get_system_credential(name)?
            .ok_or_else(|| CredentialError::not_found("system credential", name))
    }

    /// Decrypts a system credential under the same usability rule as tenant
    /// credentials. Never writes.
    pub fn get_system_decrypted(&self, name: &str) -> CredentialResult<DecryptedSystemCredential> {
        let credential = self.get_system_credential(name)?;
        match credential.usability(Utc::now()) {
            Usability::Revoked => Err(CredentialError::Revoked {
                name: credential.name,
            }),
            Usability::Expired => Err(CredentialError::Expired {
                name: credential.name,
            }),
            Usability::Usable => {
                let data = self.open(&credential.name, &credential.secret)?;
                Ok(DecryptedSystemCredential {
                    record: credential,
                    data,
                })
            }
        }
    }

    pub fn revoke_system_credential(&self, name: &str) -> CredentialResult<()> {
        if !self
            .system
            .set_system_credential_status(name, CredentialStatus::Revoked, Utc::now())?
        {
            return Err(CredentialError::not_found("system credential", name));
        }
        info!(credential = %name, "System credential revoked");
        Ok(())
    }

    pub fn delete_system_credential(&self, name: &str) -> CredentialResult<()> {
        if !self.system.delete_system_credential(name)? {
            return Err(CredentialError::not_found("system credential", name));
        }
        info!(credential = %name, "System credential deleted");
        Ok(())
    }
}
