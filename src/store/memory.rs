//! In-process store backed by concurrent maps.
//!
//! Name uniqueness goes through the `names` index's entry API, which holds
//! the shard lock for the whole check-and-insert, so racing creates of the
//! same name leave exactly one winner.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{CredentialStore, ShareStore, StoreError, StoreResult, SystemCredentialStore};
use crate::credentials::{Credential, CredentialStatus, SystemCredential};
use crate::sharing::CredentialShare;

/// Keeps encrypted records in memory. Used by tests and single-process
/// deployments that do not need durability.
#[derive(Default)]
pub struct MemoryStore {
    /// Primary storage: credential id -> record
    credentials: Arc<DashMap<Uuid, Credential>>,
    /// Secondary index: (tenant_id, name) -> credential id
    names: Arc<DashMap<(Uuid, String), Uuid>>,
    /// System credentials by name
    system: Arc<DashMap<String, SystemCredential>>,
    /// Shares keyed by (credential_id, shared_with_user_id)
    shares: Arc<DashMap<(Uuid, Uuid), CredentialShare>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get_credential(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Credential>> {
        Ok(self
            .credentials
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| c.clone()))
    }

    fn list_credentials(&self, tenant_id: Uuid) -> StoreResult<Vec<Credential>> {
        let mut list: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| c.clone())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn insert_credential(&self, credential: &Credential) -> StoreResult<()> {
        match self
            .names
            .entry((credential.tenant_id, credential.name.clone()))
        {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                name: credential.name.clone(),
            }),
            Entry::Vacant(slot) => {
                self.credentials.insert(credential.id, credential.clone());
                slot.insert(credential.id);
                Ok(())
            }
        }
    }

    // Records are only ever replaced in place through `get_mut`, so an update
    // racing a delete cannot bring the record back. Lock order matches
    // `insert_credential`: name index first, then the record.
    fn update_credential(&self, credential: &Credential) -> StoreResult<bool> {
        let renamed = match self.get_credential(credential.tenant_id, credential.id)? {
            Some(existing) => existing.name != credential.name,
            None => return Ok(false),
        };

        if !renamed {
            return Ok(match self.credentials.get_mut(&credential.id) {
                Some(mut record) if record.tenant_id == credential.tenant_id => {
                    *record = credential.clone();
                    true
                }
                _ => false,
            });
        }

        let previous_name = match self
            .names
            .entry((credential.tenant_id, credential.name.clone()))
        {
            Entry::Occupied(_) => {
                return Err(StoreError::Duplicate {
                    name: credential.name.clone(),
                })
            }
            Entry::Vacant(slot) => {
                let mut record = match self.credentials.get_mut(&credential.id) {
                    Some(record) if record.tenant_id == credential.tenant_id => record,
                    _ => return Ok(false),
                };
                let previous_name = std::mem::replace(&mut *record, credential.clone()).name;
                slot.insert(credential.id);
                previous_name
            }
        };

        if previous_name != credential.name {
            self.names
                .remove_if(&(credential.tenant_id, previous_name), |_, id| {
                    *id == credential.id
                });
        }
        Ok(true)
    }

    fn set_credential_status(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: CredentialStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.credentials.get_mut(&id) {
            Some(mut record) if record.tenant_id == tenant_id => {
                record.status = status;
                record.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn mark_expired_if(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.credentials.get_mut(&id) {
            Some(mut record)
                if record.tenant_id == tenant_id
                    && record.status == CredentialStatus::Active
                    && record.expires_at == Some(expected_expires_at) =>
            {
                record.status = CredentialStatus::Expired;
                record.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_credential(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let removed = self
            .credentials
            .remove_if(&id, |_, c| c.tenant_id == tenant_id);
        match removed {
            Some((_, credential)) => {
                self.names
                    .remove_if(&(tenant_id, credential.name), |_, owner| *owner == id);
                self.shares.retain(|(credential_id, _), _| *credential_id != id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl SystemCredentialStore for MemoryStore {
    fn get_system_credential(&self, name: &str) -> StoreResult<Option<SystemCredential>> {
        Ok(self.system.get(name).map(|c| c.clone()))
    }

    fn insert_system_credential(&self, credential: &SystemCredential) -> StoreResult<()> {
        match self.system.entry(credential.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                name: credential.name.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                Ok(())
            }
        }
    }

    fn set_system_credential_status(
        &self,
        name: &str,
        status: CredentialStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.system.get_mut(name) {
            Some(mut record) => {
                record.status = status;
                record.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_system_credential(&self, name: &str) -> StoreResult<bool> {
        Ok(self.system.remove(name).is_some())
    }
}

impl ShareStore for MemoryStore {
    fn upsert_share(&self, share: &CredentialShare) -> StoreResult<CredentialShare> {
        let key = (share.credential_id, share.shared_with_user_id);
        let stored = match self.shares.entry(key) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.permission = share.permission;
                existing.shared_by_user_id = share.shared_by_user_id;
                existing.note = share.note.clone();
                existing.expires_at = share.expires_at;
                existing.clone()
            }
            Entry::Vacant(slot) => slot.insert(share.clone()).clone(),
        };
        Ok(stored)
    }

    fn get_share(&self, credential_id: Uuid, user_id: Uuid) -> StoreResult<Option<CredentialShare>> {
        Ok(self
            .shares
            .get(&(credential_id, user_id))
            .map(|s| s.clone()))
    }

    fn list_shares(&self, credential_id: Uuid) -> StoreResult<Vec<CredentialShare>> {
        let mut list: Vec<CredentialShare> = self
            .shares
            .iter()
            .filter(|s| s.credential_id == credential_id)
            .map(|s| s.clone())
            .collect();
        list.sort_by_key(|s| s.created_at);
        Ok(list)
    }

    fn delete_share(&self, credential_id: Uuid, share_id: Uuid) -> StoreResult<bool> {
        let key = self
            .shares
            .iter()
            .find(|s| s.credential_id == credential_id && s.id == share_id)
            .map(|s| *s.key());
        Ok(match key {
            Some(key) => self.shares.remove(&key).is_some(),
            None => false,
        })
    }
}
