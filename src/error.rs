//! Error taxonomy shared by the lifecycle manager, sharing service and resolver.
//!
//! Messages name the credential involved but never carry secret material.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Bad caller input. Never worth retrying.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("credential '{name}' has expired")]
    Expired { name: String },

    #[error("credential '{name}' has been revoked")]
    Revoked { name: String },

    /// A step does not bind a credential the block requires.
    #[error("no credential bound for required credential '{name}'")]
    MissingBinding { name: String },

    /// Corrupted ciphertext or the wrong master key.
    #[error("failed to decrypt credential '{name}'")]
    DecryptionFailed { name: String },

    #[error("failed to encrypt credential '{name}'")]
    EncryptionFailed { name: String },

    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("a credential named '{name}' already exists")]
    Duplicate { name: String },

    #[error("credential store failure: {0:#}")]
    Store(anyhow::Error),
}

impl CredentialError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// True for errors that end a credential's usefulness until someone
    /// re-authorizes or extends it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired { .. } | Self::Revoked { .. })
    }
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { name } => Self::Duplicate { name },
            StoreError::Backend(source) => Self::Store(source),
        }
    }
}

pub type CredentialResult<T> = Result<T, CredentialError>;
