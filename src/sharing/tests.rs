use super::*;
use crate::credentials::{CredentialStatus, CredentialType};
use crate::crypto::EncryptedSecret;
use crate::store::MemoryStore;
use chrono::Duration;
use serde_json::json;

fn setup() -> (Arc<MemoryStore>, SharingService, Uuid, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let tenant = Uuid::new_v4();
    let now = Utc::now();
    let credential = Credential {
        id: Uuid::now_v7(),
        tenant_id: tenant,
        name: "github".to_string(),
        description: String::new(),
        credential_type: CredentialType::Bearer,
        secret: EncryptedSecret::default(),
        metadata: json!({}),
        expires_at: None,
        status: CredentialStatus::Active,
        created_at: now,
        updated_at: now,
    };
    store.insert_credential(&credential).unwrap();
    let service = SharingService::new(store.clone());
    (store, service, tenant, credential.id)
}

fn share_input(user: Uuid, permission: &str) -> NewShare {
    NewShare {
        shared_with_user_id: user,
        permission: permission.to_string(),
        shared_by_user_id: Uuid::new_v4(),
        note: String::new(),
        expires_at: None,
    }
}

#[test]
fn test_use_grants_no_view() {
    let p = SharePermission::Use;
    assert!(!p.can_view());
    assert!(!p.can_edit());
    assert!(!p.can_admin());
}

#[test]
fn test_edit_predicates() {
    let p = SharePermission::Edit;
    assert!(p.can_view());
    assert!(p.can_edit());
    assert!(!p.can_admin());
}

#[test]
fn test_admin_predicates() {
    let p = SharePermission::Admin;
    assert!(p.can_view());
    assert!(p.can_edit());
    assert!(p.can_admin());
}

#[test]
fn test_permission_ladder() {
    assert!(SharePermission::Use < SharePermission::Edit);
    assert!(SharePermission::Edit < SharePermission::Admin);
    assert!(SharePermission::Use < SharePermission::Admin);
}

#[test]
fn test_is_valid() {
    assert!(SharePermission::is_valid("use"));
    assert!(SharePermission::is_valid("edit"));
    assert!(SharePermission::is_valid("admin"));
    assert!(!SharePermission::is_valid("view"));
    assert!(!SharePermission::is_valid("Admin"));
    assert!(!SharePermission::is_valid(""));
}

#[test]
fn test_share_and_effective_permission() {
    let (_, service, tenant, credential_id) = setup();
    let user = Uuid::new_v4();

    let share = service
        .share(tenant, credential_id, share_input(user, "edit"))
        .unwrap();
    assert_eq!(share.permission, SharePermission::Edit);
    assert_eq!(share.credential_id, credential_id);

    let permission = service
        .effective_permission(credential_id, user, Utc::now())
        .unwrap();
    assert_eq!(permission, Some(SharePermission::Edit));
    assert_eq!(
        service
            .effective_permission(credential_id, Uuid::new_v4(), Utc::now())
            .unwrap(),
        None
    );
}

#[test]
fn test_reshare_replaces_permission() {
    let (_, service, tenant, credential_id) = setup();
    let user = Uuid::new_v4();

    let first = service
        .share(tenant, credential_id, share_input(user, "use"))
        .unwrap();
    let second = service
        .share(tenant, credential_id, share_input(user, "admin"))
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.permission, SharePermission::Admin);
    assert_eq!(
        service
            .list_shares(tenant, credential_id, Utc::now())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_share_validation() {
    let (_, service, tenant, credential_id) = setup();

    assert!(matches!(
        service.share(tenant, credential_id, share_input(Uuid::new_v4(), "owner")),
        Err(CredentialError::Validation { field, .. }) if field == "permission"
    ));

    let me = Uuid::new_v4();
    let self_share = NewShare {
        shared_by_user_id: me,
        ..share_input(me, "use")
    };
    assert!(matches!(
        service.share(tenant, credential_id, self_share),
        Err(CredentialError::Validation { .. })
    ));

    let already_expired = NewShare {
        expires_at: Some(Utc::now() - Duration::minutes(1)),
        ..share_input(Uuid::new_v4(), "use")
    };
    assert!(matches!(
        service.share(tenant, credential_id, already_expired),
        Err(CredentialError::Validation { field, .. }) if field == "expires_at"
    ));
}

#[test]
fn test_share_requires_tenant_ownership() {
    let (_, service, _, credential_id) = setup();
    assert!(matches!(
        service.share(Uuid::new_v4(), credential_id, share_input(Uuid::new_v4(), "use")),
        Err(CredentialError::NotFound { .. })
    ));
}

#[test]
fn test_expired_share_is_absent() {
    let (_, service, tenant, credential_id) = setup();
    let user = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::hours(1);

    service
        .share(
            tenant,
            credential_id,
            NewShare {
                expires_at: Some(expires_at),
                ..share_input(user, "admin")
            },
        )
        .unwrap();

    let later = expires_at + Duration::seconds(1);
    assert_eq!(
        service.effective_permission(credential_id, user, later).unwrap(),
        None
    );
    assert!(service
        .list_shares(tenant, credential_id, later)
        .unwrap()
        .is_empty());

    // Still live before the deadline
    assert_eq!(
        service
            .effective_permission(credential_id, user, Utc::now())
            .unwrap(),
        Some(SharePermission::Admin)
    );
}

#[test]
fn test_revoke_share() {
    let (_, service, tenant, credential_id) = setup();
    let user = Uuid::new_v4();
    let share = service
        .share(tenant, credential_id, share_input(user, "use"))
        .unwrap();

    service.revoke_share(tenant, credential_id, share.id).unwrap();
    assert_eq!(
        service
            .effective_permission(credential_id, user, Utc::now())
            .unwrap(),
        None
    );
    assert!(matches!(
        service.revoke_share(tenant, credential_id, share.id),
        Err(CredentialError::NotFound { .. })
    ));
}
