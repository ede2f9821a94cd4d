use super::*;
use crate::credentials::TokenSecret;
use serde_json::json;

#[cfg(test)]
mod api_key_tests {
    use super::*;

    fn api_key(key: &str, header_name: Option<&str>, header_prefix: Option<&str>) -> CredentialData {
        CredentialData::new(AuthSecret::ApiKey {
            key: key.to_string(),
            header_name: header_name.map(str::to_string),
            header_prefix: header_prefix.map(str::to_string),
        })
    }

    #[test]
    fn defaults_to_authorization_without_prefix() {
        let header = get_auth_header(&CredentialData::api_key("abc123"));
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "abc123");
    }

    #[test]
    fn applies_prefix() {
        let header = get_auth_header(&api_key("abc123", None, Some("Bearer ")));
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Bearer abc123");
    }

    #[test]
    fn custom_header_name() {
        let header = get_auth_header(&api_key("abc123", Some("X-API-Key"), None));
        assert_eq!(header.name, "X-API-Key");
        assert_eq!(header.value, "abc123");
    }

    #[test]
    fn empty_header_name_falls_back() {
        let header = get_auth_header(&api_key("abc123", Some(""), Some("Token ")));
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Token abc123");
    }

    #[test]
    fn empty_key_yields_no_header() {
        assert!(get_auth_header(&api_key("", Some("X-API-Key"), None)).is_empty());
    }
}

#[cfg(test)]
mod token_tests {
    use super::*;

    #[test]
    fn bearer() {
        let header = get_auth_header(&CredentialData::bearer("tok-1"));
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Bearer tok-1");
    }

    #[test]
    fn bearer_ignores_token_type() {
        let token = TokenSecret {
            token_type: Some("MAC".to_string()),
            ..TokenSecret::new("tok-1")
        };
        let header = get_auth_header(&CredentialData::new(AuthSecret::Bearer(token)));
        assert_eq!(header.value, "Bearer tok-1");
    }

    #[test]
    fn oauth2_defaults_to_bearer() {
        let header = get_auth_header(&CredentialData::oauth2(TokenSecret::new("at")));
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Bearer at");
    }

    #[test]
    fn oauth2_uses_token_type() {
        let token = TokenSecret {
            token_type: Some("DPoP".to_string()),
            ..TokenSecret::new("at")
        };
        let header = get_auth_header(&CredentialData::oauth2(token));
        assert_eq!(header.value, "DPoP at");
    }

    #[test]
    fn missing_access_token_yields_no_header() {
        assert!(get_auth_header(&CredentialData::bearer("")).is_empty());
        assert!(get_auth_header(&CredentialData::oauth2(TokenSecret::default())).is_empty());
    }
}

#[cfg(test)]
mod basic_tests {
    use super::*;

    #[test]
    fn encodes_username_and_password() {
        let header = get_auth_header(&CredentialData::basic("alice", "secret"));
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Basic YWxpY2U6c2VjcmV0");
    }

    #[test]
    fn empty_password_still_encodes_colon() {
        let header = get_auth_header(&CredentialData::basic("alice", ""));
        assert_eq!(header.value, "Basic YWxpY2U6");
    }
}

#[test]
fn custom_type_yields_no_header() {
    let data = CredentialData::custom([("token".to_string(), json!("x"))].into_iter().collect());
    let header = get_auth_header(&data);
    assert!(header.is_empty());
    assert_eq!(header, AuthHeader::none());
}

#[test]
fn unknown_type_from_blob_yields_no_header() {
    let data: CredentialData =
        serde_json::from_value(json!({"type": "hmac", "api_key": "k"})).unwrap();
    assert!(get_auth_header(&data).is_empty());
}

#[test]
fn debug_redacts_value() {
    let header = get_auth_header(&CredentialData::bearer("tok-secret"));
    let rendered = format!("{:?}", header);
    assert!(rendered.contains("Authorization"));
    assert!(!rendered.contains("tok-secret"));
}
