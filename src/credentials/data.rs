//! Plaintext credential payloads and their JSON blob encoding.
//!
//! The blob is what gets sealed by the envelope cipher. Its format is stable:
//!
//! ```json
//! {"type": "api_key", "api_key": "abc123", "header_prefix": "Bearer ", "custom": {"region": "eu"}}
//! ```
//!
//! Known fields are written only when non-empty. Unknown top-level keys are
//! folded into `custom` on read so provider-specific extras survive a round
//! trip. A missing or unrecognized `type` reads back as `custom`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use super::CredentialType;
use crate::error::{CredentialError, CredentialResult};

/// Token material shared by the `bearer` and `oauth2` shapes.
#[derive(Clone, PartialEq, Default)]
pub struct TokenSecret {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl TokenSecret {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }
}

/// The primary auth shape. Exactly one is populated per record and the
/// variant decides which fields mean anything.
#[derive(Clone, PartialEq)]
pub enum AuthSecret {
    ApiKey {
        key: String,
        header_name: Option<String>,
        header_prefix: Option<String>,
    },
    Bearer(TokenSecret),
    OAuth2(TokenSecret),
    Basic {
        username: String,
        password: String,
    },
    Custom,
}

impl AuthSecret {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            AuthSecret::ApiKey { .. } => CredentialType::ApiKey,
            AuthSecret::Bearer(_) => CredentialType::Bearer,
            AuthSecret::OAuth2(_) => CredentialType::OAuth2,
            AuthSecret::Basic { .. } => CredentialType::Basic,
            AuthSecret::Custom => CredentialType::Custom,
        }
    }

    fn wipe(&mut self) {
        match self {
            AuthSecret::ApiKey { key, .. } => key.zeroize(),
            AuthSecret::Bearer(token) | AuthSecret::OAuth2(token) => {
                token.access_token.zeroize();
                token.refresh_token.zeroize();
            }
            AuthSecret::Basic { username, password } => {
                username.zeroize();
                password.zeroize();
            }
            AuthSecret::Custom => {}
        }
    }
}

/// Decrypted secret fields of a credential.
///
/// Never persisted in this form. Secret strings are wiped on drop and `Debug`
/// prints only the type and the names of custom fields.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireData", into = "WireData")]
pub struct CredentialData {
    pub secret: AuthSecret,
    /// Provider-specific extras, kept in key order.
    pub custom: BTreeMap<String, Value>,
}

impl CredentialData {
    pub fn new(secret: AuthSecret) -> Self {
        Self {
            secret,
            custom: BTreeMap::new(),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new(AuthSecret::ApiKey {
            key: key.into(),
            header_name: None,
            header_prefix: None,
        })
    }

    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::new(AuthSecret::Bearer(TokenSecret::new(access_token)))
    }

    pub fn oauth2(token: TokenSecret) -> Self {
        Self::new(AuthSecret::OAuth2(token))
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(AuthSecret::Basic {
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn custom(fields: BTreeMap<String, Value>) -> Self {
        Self {
            secret: AuthSecret::Custom,
            custom: fields,
        }
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }

    pub fn credential_type(&self) -> CredentialType {
        self.secret.credential_type()
    }

    /// Checks that the field the type tag makes authoritative is filled in.
    pub fn validate(&self) -> CredentialResult<()> {
        let missing = match &self.secret {
            AuthSecret::ApiKey { key, .. } => key.is_empty().then_some("api_key"),
            AuthSecret::Bearer(token) | AuthSecret::OAuth2(token) => {
                token.access_token.is_empty().then_some("access_token")
            }
            AuthSecret::Basic { username, .. } => username.is_empty().then_some("username"),
            AuthSecret::Custom => self.custom.is_empty().then_some("custom"),
        };
        match missing {
            Some(field) => Err(CredentialError::validation(
                "data",
                format!("{} credential requires {}", self.credential_type(), field),
            )),
            None => Ok(()),
        }
    }

    /// Encodes the blob that gets sealed. The buffer is wiped on drop.
    pub fn to_json_bytes(&self) -> serde_json::Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec(self).map(Zeroizing::new)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl Drop for CredentialData {
    fn drop(&mut self) {
        self.secret.wipe();
    }
}

impl fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialData")
            .field("type", &self.credential_type())
            .field("custom_keys", &self.custom.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Flat on-disk shape. Every known field is optional.
#[derive(Serialize, Deserialize, Default)]
struct WireData {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    custom: BTreeMap<String, Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn non_empty_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(non_empty)
}

impl From<&CredentialData> for WireData {
    fn from(data: &CredentialData) -> Self {
        let mut wire = WireData {
            kind: Some(data.credential_type().as_str().to_string()),
            custom: data.custom.clone(),
            ..WireData::default()
        };
        match &data.secret {
            AuthSecret::ApiKey {
                key,
                header_name,
                header_prefix,
            } => {
                wire.api_key = non_empty(key);
                wire.header_name = non_empty_opt(header_name);
                wire.header_prefix = non_empty_opt(header_prefix);
            }
            AuthSecret::Bearer(token) | AuthSecret::OAuth2(token) => {
                wire.access_token = non_empty(&token.access_token);
                wire.refresh_token = non_empty_opt(&token.refresh_token);
                wire.token_type = non_empty_opt(&token.token_type);
                wire.expires_at = token.expires_at;
                wire.scopes = token.scopes.clone();
            }
            AuthSecret::Basic { username, password } => {
                wire.username = non_empty(username);
                wire.password = non_empty(password);
            }
            AuthSecret::Custom => {}
        }
        wire
    }
}

// CredentialData implements Drop, so its fields cannot be moved out.
impl From<CredentialData> for WireData {
    fn from(data: CredentialData) -> Self {
        WireData::from(&data)
    }
}

impl From<WireData> for CredentialData {
    fn from(wire: WireData) -> Self {
        let kind = wire
            .kind
            .as_deref()
            .and_then(|k| k.parse::<CredentialType>().ok())
            .unwrap_or(CredentialType::Custom);

        let token = || TokenSecret {
            access_token: wire.access_token.clone().unwrap_or_default(),
            refresh_token: wire.refresh_token.clone(),
            token_type: wire.token_type.clone(),
            expires_at: wire.expires_at,
            scopes: wire.scopes.clone(),
        };
        let secret = match kind {
            CredentialType::ApiKey => AuthSecret::ApiKey {
                key: wire.api_key.clone().unwrap_or_default(),
                header_name: wire.header_name.clone(),
                header_prefix: wire.header_prefix.clone(),
            },
            CredentialType::Bearer => AuthSecret::Bearer(token()),
            CredentialType::OAuth2 => AuthSecret::OAuth2(token()),
            CredentialType::Basic => AuthSecret::Basic {
                username: wire.username.clone().unwrap_or_default(),
                password: wire.password.clone().unwrap_or_default(),
            },
            CredentialType::Custom => AuthSecret::Custom,
        };

        let mut custom = wire.custom;
        for (key, value) in wire.extra {
            custom.entry(key).or_insert(value);
        }
        CredentialData { secret, custom }
    }
}
