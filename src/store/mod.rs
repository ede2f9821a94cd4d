//! Persistence boundary for encrypted credential records.
//!
//! The core never sees storage mechanics, only these traits. Adapters hold
//! encrypted records exclusively; nothing passed through here is plaintext.
//!
//! Adapters must enforce uniqueness of `(tenant_id, name)` for tenant
//! credentials and of `name` for system credentials: of two racing inserts,
//! exactly one succeeds and the other gets [`StoreError::Duplicate`].

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::credentials::{Credential, CredentialStatus, SystemCredential};
use crate::sharing::CredentialShare;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record named '{name}' already exists")]
    Duplicate { name: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tenant-scoped credential records. Every lookup is keyed by tenant, so a
/// record owned by another tenant is indistinguishable from a missing one.
pub trait CredentialStore: Send + Sync {
    fn get_credential(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Credential>>;

    /// All credentials of a tenant, ordered by name.
    fn list_credentials(&self, tenant_id: Uuid) -> StoreResult<Vec<Credential>>;

    fn insert_credential(&self, credential: &Credential) -> StoreResult<()>;

    /// Replaces a stored record. Returns `false` if it does not exist.
    fn update_credential(&self, credential: &Credential) -> StoreResult<bool>;

    /// Writes only the status column. Idempotent.
    fn set_credential_status(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: CredentialStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Records a lazily detected expiry. Writes only while the record is
    /// still `active` with exactly `expected_expires_at`, so a concurrent
    /// revoke or expiry extension is never overwritten. Returns whether it
    /// wrote.
    fn mark_expired_if(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Removes the record and every share of it.
    fn delete_credential(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool>;
}

/// Global credentials operated by the platform.
pub trait SystemCredentialStore: Send + Sync {
    fn get_system_credential(&self, name: &str) -> StoreResult<Option<SystemCredential>>;

    fn insert_system_credential(&self, credential: &SystemCredential) -> StoreResult<()>;

    fn set_system_credential_status(
        &self,
        name: &str,
        status: CredentialStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    fn delete_system_credential(&self, name: &str) -> StoreResult<bool>;
}

/// Delegations of a tenant credential to other users.
pub trait ShareStore: Send + Sync {
    /// Inserts or replaces the share for `(credential_id, shared_with_user_id)`.
    ///
    /// On replace the original id and `created_at` are kept. Returns the row
    /// as stored.
    fn upsert_share(&self, share: &CredentialShare) -> StoreResult<CredentialShare>;

    fn get_share(&self, credential_id: Uuid, user_id: Uuid) -> StoreResult<Option<CredentialShare>>;

    /// Shares of a credential, oldest first. Includes expired rows.
    fn list_shares(&self, credential_id: Uuid) -> StoreResult<Vec<CredentialShare>>;

    fn delete_share(&self, credential_id: Uuid, share_id: Uuid) -> StoreResult<bool>;
}
