use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;

use crate::credentials::{AuthSecret, CredentialData};

#[cfg(test)]
mod tests;

/// Header used when a credential does not name its own
pub const DEFAULT_HEADER_NAME: &str = "Authorization";

/// A single outbound authentication header.
///
/// Both fields empty means "no auth applied", which is not an error.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

impl AuthHeader {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.value.is_empty()
    }

    fn authorization(value: String) -> Self {
        Self {
            name: DEFAULT_HEADER_NAME.to_string(),
            value,
        }
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Build the wire-level auth header for a decrypted credential
///
/// - api_key: `{header_name or Authorization}: {header_prefix}{api_key}`
/// - bearer: `Authorization: Bearer {access_token}`
/// - oauth2: `Authorization: {token_type or Bearer} {access_token}`
/// - basic: `Authorization: Basic base64(username:password)`
/// - custom: no header
///
/// Total: a credential missing its primary secret also yields no header.
pub fn get_auth_header(data: &CredentialData) -> AuthHeader {
    match &data.secret {
        AuthSecret::ApiKey {
            key,
            header_name,
            header_prefix,
        } => {
            if key.is_empty() {
                return AuthHeader::none();
            }
            let name = header_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_HEADER_NAME);
            AuthHeader {
                name: name.to_string(),
                value: format!("{}{}", header_prefix.as_deref().unwrap_or(""), key),
            }
        }
        AuthSecret::Bearer(token) => {
            if token.access_token.is_empty() {
                return AuthHeader::none();
            }
            AuthHeader::authorization(format!("Bearer {}", token.access_token))
        }
        AuthSecret::OAuth2(token) => {
            if token.access_token.is_empty() {
                return AuthHeader::none();
            }
            let scheme = token
                .token_type
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or("Bearer");
            AuthHeader::authorization(format!("{} {}", scheme, token.access_token))
        }
        AuthSecret::Basic { username, password } => {
            if username.is_empty() {
                return AuthHeader::none();
            }
            let encoded = BASE64.encode(format!("{}:{}", username, password));
            AuthHeader::authorization(format!("Basic {}", encoded))
        }
        AuthSecret::Custom => AuthHeader::none(),
    }
}
