//! Delegation of tenant credentials to other users.
//!
//! Permissions are a strict ladder, `use < edit < admin`; each level includes
//! the ones below it. View, edit and admin capabilities are derived from the
//! level rather than stored as independent bits, and `use` on its own grants
//! none of them: the holder may run steps with the credential but not look
//! at it. The access-control layer consumes these predicates; this module
//! only computes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::credentials::Credential;
use crate::error::{CredentialError, CredentialResult};
use crate::store::{CredentialStore, ShareStore};

#[cfg(test)]
mod tests;

/// Capability level granted by a share. Ordered: `Use < Edit < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    Use,
    Edit,
    Admin,
}

impl SharePermission {
    pub fn can_view(&self) -> bool {
        matches!(self, SharePermission::Edit | SharePermission::Admin)
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, SharePermission::Edit | SharePermission::Admin)
    }

    pub fn can_admin(&self) -> bool {
        matches!(self, SharePermission::Admin)
    }

    /// Accepts exactly `use`, `edit` and `admin`.
    pub fn is_valid(value: &str) -> bool {
        value.parse::<SharePermission>().is_ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SharePermission::Use => "use",
            SharePermission::Edit => "edit",
            SharePermission::Admin => "admin",
        }
    }
}

impl fmt::Display for SharePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharePermission {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use" => Ok(SharePermission::Use),
            "edit" => Ok(SharePermission::Edit),
            "admin" => Ok(SharePermission::Admin),
            other => Err(CredentialError::validation(
                "permission",
                format!("'{}' is not one of use, edit, admin", other),
            )),
        }
    }
}

/// A grant of one credential to one user.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialShare {
    pub id: Uuid,
    pub credential_id: Uuid,
    pub shared_with_user_id: Uuid,
    pub permission: SharePermission,
    pub shared_by_user_id: Uuid,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialShare {
    /// An expired share is treated exactly like a missing one.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Input for [`SharingService::share`].
#[derive(Debug, Clone)]
pub struct NewShare {
    pub shared_with_user_id: Uuid,
    /// Raw permission string, validated on use
    pub permission: String,
    pub shared_by_user_id: Uuid,
    pub note: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Creates, lists and revokes shares of tenant-owned credentials.
pub struct SharingService {
    credentials: Arc<dyn CredentialStore>,
    shares: Arc<dyn ShareStore>,
}

impl SharingService {
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: CredentialStore + ShareStore + 'static,
    {
        Self {
            credentials: store.clone(),
            shares: store,
        }
    }

    fn owned_credential(&self, tenant_id: Uuid, credential_id: Uuid) -> CredentialResult<Credential> {
        self.credentials
            .get_credential(tenant_id, credential_id)?
            .ok_or_else(|| CredentialError::not_found("credential", credential_id.to_string()))
    }

    /// Shares a credential owned by `tenant_id`. Re-sharing with the same
    /// user replaces the previous grant.
    pub fn share(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        input: NewShare,
    ) -> CredentialResult<CredentialShare> {
        let credential = self.owned_credential(tenant_id, credential_id)?;
        let permission: SharePermission = input.permission.parse()?;

        if input.shared_with_user_id == input.shared_by_user_id {
            return Err(CredentialError::validation(
                "shared_with_user_id",
                "cannot share a credential with yourself",
            ));
        }

        let now = Utc::now();
        if input.expires_at.is_some_and(|at| at <= now) {
            return Err(CredentialError::validation(
                "expires_at",
                "share expiry must be in the future",
            ));
        }

        let share = self.shares.upsert_share(&CredentialShare {
            id: Uuid::now_v7(),
            credential_id,
            shared_with_user_id: input.shared_with_user_id,
            permission,
            shared_by_user_id: input.shared_by_user_id,
            note: input.note,
            created_at: now,
            expires_at: input.expires_at,
        })?;

        info!(
            tenant_id = %tenant_id,
            credential_id = %credential_id,
            credential = %credential.name,
            shared_with = %share.shared_with_user_id,
            permission = %share.permission,
            "Credential shared"
        );
        Ok(share)
    }

    /// Live shares of a credential; expired ones are left out.
    pub fn list_shares(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> CredentialResult<Vec<CredentialShare>> {
        self.owned_credential(tenant_id, credential_id)?;
        let shares = self.shares.list_shares(credential_id)?;
        Ok(shares.into_iter().filter(|s| !s.is_expired(now)).collect())
    }

    pub fn revoke_share(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        share_id: Uuid,
    ) -> CredentialResult<()> {
        self.owned_credential(tenant_id, credential_id)?;
        if !self.shares.delete_share(credential_id, share_id)? {
            return Err(CredentialError::not_found("share", share_id.to_string()));
        }
        info!(credential_id = %credential_id, share_id = %share_id, "Credential share revoked");
        Ok(())
    }

    /// Permission `user_id` currently holds on a credential through a share,
    /// or `None` if there is no live share.
    pub fn effective_permission(
        &self,
        credential_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> CredentialResult<Option<SharePermission>> {
        let share = self.shares.get_share(credential_id, user_id)?;
        Ok(share
            .filter(|s| !s.is_expired(now))
            .map(|s| s.permission))
    }
}
