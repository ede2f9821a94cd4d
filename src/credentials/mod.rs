//! Tenant and system credential records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialManager                  │
//! │  - CRUD + status transitions             │
//! │  - Lazy expiry on read                   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       EnvelopeCipher                     │
//! │  - Per-record data key                   │
//! │  - Data key wrapped by master key        │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Store adapter (SQLite / memory)    │
//! │  - Encrypted records only                │
//! │  - UNIQUE(tenant_id, name)               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Whether a credential may be used is a pure function of its status, its
//! expiry and the current time ([`usability`]). The persisted `expired`
//! status is only a cache of that answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::crypto::EncryptedSecret;
use crate::error::CredentialError;

mod data;
mod manager;


pub use data::{AuthSecret, CredentialData, TokenSecret};
pub use manager::{
    CredentialManager, CredentialUpdate, DecryptedCredential, DecryptedSystemCredential,
    NewCredential, NewSystemCredential,
};

/// Declared auth scheme of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "api_key")]
    ApiKey,
    #[serde(rename = "bearer")]
    Bearer,
    #[serde(rename = "oauth2")]
    OAuth2,
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "custom")]
    Custom,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::ApiKey => "api_key",
            CredentialType::Bearer => "bearer",
            CredentialType::OAuth2 => "oauth2",
            CredentialType::Basic => "basic",
            CredentialType::Custom => "custom",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(CredentialType::ApiKey),
            "bearer" => Ok(CredentialType::Bearer),
            "oauth2" => Ok(CredentialType::OAuth2),
            "basic" => Ok(CredentialType::Basic),
            "custom" => Ok(CredentialType::Custom),
            other => Err(CredentialError::validation(
                "credential_type",
                format!("unknown credential type '{}'", other),
            )),
        }
    }
}

/// Persisted lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Expired,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialStatus {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CredentialStatus::Active),
            "expired" => Ok(CredentialStatus::Expired),
            "revoked" => Ok(CredentialStatus::Revoked),
            other => Err(CredentialError::validation(
                "status",
                format!("unknown credential status '{}'", other),
            )),
        }
    }
}

/// Outcome of the usability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usability {
    Usable,
    Expired,
    Revoked,
}

/// Decides whether a credential may be used at `now`.
///
/// Revocation wins over expiry. A credential is expired once `now` reaches
/// `expires_at`, whatever its stored status says.
pub fn usability(
    status: CredentialStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Usability {
    match status {
        CredentialStatus::Revoked => Usability::Revoked,
        CredentialStatus::Expired => Usability::Expired,
        CredentialStatus::Active if expires_at.is_some_and(|at| at <= now) => Usability::Expired,
        CredentialStatus::Active => Usability::Usable,
    }
}

/// Tenant-owned credential. The secret is only ever held encrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Unique within the tenant
    pub name: String,
    pub description: String,
    pub credential_type: CredentialType,
    pub secret: EncryptedSecret,
    /// Opaque caller metadata
    pub metadata: Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn usability(&self, now: DateTime<Utc>) -> Usability {
        usability(self.status, self.expires_at, now)
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Platform-operated credential, looked up by name rather than tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemCredential {
    pub id: Uuid,
    /// Globally unique
    pub name: String,
    pub description: String,
    pub credential_type: CredentialType,
    pub secret: EncryptedSecret,
    pub metadata: Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SystemCredential {
    pub fn usability(&self, now: DateTime<Utc>) -> Usability {
        usability(self.status, self.expires_at, now)
    }
}
