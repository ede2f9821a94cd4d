// End-to-end: SQLite-backed store -> manager -> resolver -> auth header

use std::sync::Arc;

use credvault::auth::get_auth_header;
use credvault::config::CredentialsConfig;
use credvault::credentials::{
    AuthSecret, CredentialData, CredentialManager, NewCredential, NewSystemCredential,
};
use credvault::crypto::{EnvelopeCipher, MasterKey};
use credvault::error::CredentialError;
use credvault::resolver::{
    Block, CredentialBindings, CredentialResolver, CredentialScope, RequiredCredential, Step,
};
use credvault::sharing::{NewShare, SharePermission, SharingService};
use credvault::store::SqliteStore;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    manager: Arc<CredentialManager>,
    resolver: CredentialResolver,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("credentials.db")).unwrap());
    let cipher = Arc::new(EnvelopeCipher::new(&MasterKey::generate()));
    let manager = Arc::new(CredentialManager::new(
        store.clone(),
        cipher,
        CredentialsConfig::default(),
    ));
    Harness {
        _dir: dir,
        store,
        resolver: CredentialResolver::new(manager.clone()),
        manager,
    }
}

fn prefixed_api_key(key: &str, prefix: &str) -> CredentialData {
    CredentialData::new(AuthSecret::ApiKey {
        key: key.to_string(),
        header_name: None,
        header_prefix: Some(prefix.to_string()),
    })
}

#[test]
fn test_api_key_resolves_to_authorization_header() {
    let h = harness();
    let tenant = Uuid::new_v4();

    let credential = h
        .manager
        .create(
            tenant,
            NewCredential {
                name: "github".to_string(),
                credential_type: "api_key".to_string(),
                data: Some(prefixed_api_key("abc123", "Bearer ")),
                ..Default::default()
            },
        )
        .unwrap();

    let block = Block::new(
        "http-request",
        json!({"credentials": [{"name": "github", "scope": "tenant", "required": true}]}),
    );
    let step = Step::new(
        "call-github",
        json!({"credentials": {"github": credential.id.to_string()}}),
    );

    let resolved = h.resolver.resolve_for_step(&block, &step, tenant).unwrap();
    let header = get_auth_header(&resolved["github"]);
    assert_eq!(header.name, "Authorization");
    assert_eq!(header.value, "Bearer abc123");
}

#[test]
fn test_optional_only_block_without_bindings() {
    let h = harness();
    let required = vec![
        RequiredCredential::optional("github", CredentialScope::Tenant),
        RequiredCredential::optional("openai", CredentialScope::System),
    ];
    let resolved = h
        .resolver
        .resolve(&required, &CredentialBindings::new(), Uuid::new_v4())
        .unwrap();
    assert!(resolved.is_empty());
}

#[test]
fn test_unbound_required_credential_is_reported_by_name() {
    let h = harness();
    let block = Block::new("b", json!([{"name": "stripe", "required": true}]));
    let step = Step::new("s", json!({}));

    let err = h
        .resolver
        .resolve_for_step(&block, &step, Uuid::new_v4())
        .unwrap_err();
    assert!(matches!(err, CredentialError::MissingBinding { ref name } if name == "stripe"));
    assert!(err.to_string().contains("stripe"));
}

#[test]
fn test_system_credential_header() {
    let h = harness();
    h.manager
        .create_system_credential(NewSystemCredential {
            name: "openai".to_string(),
            credential_type: "api_key".to_string(),
            data: Some(CredentialData::new(AuthSecret::ApiKey {
                key: "sk-live".to_string(),
                header_name: Some("X-API-Key".to_string()),
                header_prefix: None,
            })),
            ..Default::default()
        })
        .unwrap();

    let required = vec![RequiredCredential::required("openai", CredentialScope::System)];
    let resolved = h
        .resolver
        .resolve(&required, &CredentialBindings::new(), Uuid::new_v4())
        .unwrap();
    let header = get_auth_header(&resolved["openai"]);
    assert_eq!(header.name, "X-API-Key");
    assert_eq!(header.value, "sk-live");
}

#[test]
fn test_deleting_credential_drops_shares() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let sharing = SharingService::new(h.store.clone());

    let credential = h
        .manager
        .create(
            tenant,
            NewCredential {
                name: "slack".to_string(),
                credential_type: "basic".to_string(),
                data: Some(CredentialData::basic("bot", "hunter2")),
                ..Default::default()
            },
        )
        .unwrap();

    let user = Uuid::new_v4();
    sharing
        .share(
            tenant,
            credential.id,
            NewShare {
                shared_with_user_id: user,
                permission: "edit".to_string(),
                shared_by_user_id: Uuid::new_v4(),
                note: "on-call".to_string(),
                expires_at: None,
            },
        )
        .unwrap();
    assert_eq!(
        sharing
            .effective_permission(credential.id, user, chrono::Utc::now())
            .unwrap(),
        Some(SharePermission::Edit)
    );

    h.manager.delete(tenant, credential.id).unwrap();
    assert_eq!(
        sharing
            .effective_permission(credential.id, user, chrono::Utc::now())
            .unwrap(),
        None
    );
}
