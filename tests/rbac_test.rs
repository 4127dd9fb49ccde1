//! Modelo RBAC: permissões efetivas, snapshot no token e isolamento entre
//! tenants.

mod common;

use common::{register, spawn_app};
use tenant_auth::{
    common::error::AppError,
    models::{
        auth::VerifiedIdentity,
        rbac::{CreatePermissionPayload, CreateRolePayload},
    },
    services::rbac_service::{RbacService, ROLE_ADMIN, ROLE_USER},
};

fn role(name: &str, permissions: &[&str]) -> CreateRolePayload {
    CreateRolePayload {
        name: name.into(),
        description: None,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

#[tokio::test]
async fn new_tenant_is_seeded_with_default_roles() {
    let app = spawn_app();
    let session = register(&app, "acme", "ana").await;

    let roles = app.state.rbac_service.list_roles("acme").await.unwrap();
    let names: Vec<&str> = roles.iter().map(|r| r.role.name.as_str()).collect();
    assert!(names.contains(&ROLE_USER));
    assert!(names.contains(&ROLE_ADMIN));

    let admin = roles.iter().find(|r| r.role.name == ROLE_ADMIN).unwrap();
    assert!(admin.permissions.contains(&"RBAC:MANAGE".to_string()));
    assert_eq!(admin.permissions.len(), 21);

    let permissions = app
        .state
        .rbac_service
        .effective_permissions("acme", session.tokens.user_id)
        .await
        .unwrap();
    assert!(permissions.contains("BOOKING:READ"));
    assert!(!permissions.contains("RBAC:MANAGE"));

    // Um segundo registro não duplica nada
    register(&app, "acme", "bia").await;
    assert_eq!(app.state.rbac_service.list_roles("acme").await.unwrap().len(), 2);
}

#[tokio::test]
async fn effective_permissions_are_the_union_of_active_roles() {
    let app = spawn_app();
    let session = register(&app, "acme", "caio").await;
    let user_id = session.tokens.user_id;
    let rbac = &app.state.rbac_service;

    rbac.create_role_with_permissions("acme", role("role_finance", &["payment:read", "PAYMENT:UPDATE"]))
        .await
        .unwrap();
    rbac.assign_role("acme", user_id, "ROLE_FINANCE").await.unwrap();

    let permissions = rbac.effective_permissions("acme", user_id).await.unwrap();
    assert!(permissions.contains("BOOKING:READ"));
    assert!(permissions.contains("PAYMENT:READ"));
    assert!(permissions.contains("PAYMENT:UPDATE"));

    let snapshot = rbac.snapshot_for_user("acme", user_id).await.unwrap();
    assert!(snapshot.roles.contains("ROLE_FINANCE"));
    assert!(snapshot.roles.contains(ROLE_USER));
}

#[tokio::test]
async fn inactive_roles_and_permissions_do_not_count() {
    let app = spawn_app();
    let session = register(&app, "acme", "duda").await;
    let user_id = session.tokens.user_id;
    let rbac = &app.state.rbac_service;

    let finance = rbac
        .create_role_with_permissions("acme", role("ROLE_FINANCE", &["PAYMENT:READ"]))
        .await
        .unwrap();
    rbac.assign_role("acme", user_id, "ROLE_FINANCE").await.unwrap();

    rbac.set_role_active("acme", finance.role.id, false).await.unwrap();
    let snapshot = rbac.snapshot_for_user("acme", user_id).await.unwrap();
    assert!(!snapshot.roles.contains("ROLE_FINANCE"));
    assert!(!snapshot.permissions.contains("PAYMENT:READ"));

    let booking_read = rbac
        .list_permissions("acme")
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.full_name() == "BOOKING:READ")
        .unwrap();
    rbac.set_permission_active("acme", booking_read.id, false)
        .await
        .unwrap();
    let permissions = rbac.effective_permissions("acme", user_id).await.unwrap();
    assert!(!permissions.contains("BOOKING:READ"));
}

#[tokio::test]
async fn role_changes_reach_the_token_only_after_refresh() {
    let app = spawn_app();
    let session = register(&app, "acme", "edu").await;
    let user_id = session.tokens.user_id;

    app.state
        .rbac_service
        .assign_role("acme", user_id, ROLE_ADMIN)
        .await
        .unwrap();

    // O token antigo continua com o snapshot da emissão
    let claims = app
        .state
        .token_service
        .validate_access_token(&session.tokens.access.token)
        .unwrap();
    let stale = VerifiedIdentity::from(claims);
    assert!(!RbacService::has_permission(&stale, "RBAC", "MANAGE"));

    let refreshed = app
        .state
        .auth_service
        .refresh(&session.tokens.refresh.token)
        .await
        .unwrap();
    let claims = app
        .state
        .token_service
        .validate_access_token(&refreshed.tokens.access.token)
        .unwrap();
    let fresh = VerifiedIdentity::from(claims);
    assert!(RbacService::has_permission(&fresh, "RBAC", "MANAGE"));
    assert!(fresh.roles.contains(ROLE_ADMIN));
}

#[tokio::test]
async fn role_and_permission_names_are_unique_per_tenant() {
    let app = spawn_app();
    register(&app, "acme", "fred").await;
    register(&app, "globex", "fred").await;
    let rbac = &app.state.rbac_service;

    rbac.create_role_with_permissions("acme", role("ROLE_AGENT", &[]))
        .await
        .unwrap();
    let duplicate = rbac
        .create_role_with_permissions("acme", role("role_agent", &[]))
        .await;
    assert!(matches!(duplicate, Err(AppError::DuplicateRole)));
    rbac.create_role_with_permissions("globex", role("ROLE_AGENT", &[]))
        .await
        .unwrap();

    let existing = rbac
        .create_permission(
            "acme",
            CreatePermissionPayload {
                name: None,
                resource: "booking".into(),
                action: "read".into(),
                description: None,
            },
        )
        .await;
    assert!(matches!(existing, Err(AppError::DuplicatePermission)));

    let created = rbac
        .create_permission(
            "acme",
            CreatePermissionPayload {
                name: None,
                resource: "report".into(),
                action: "export".into(),
                description: Some("Exportar relatórios".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.name, "REPORT_EXPORT");
    assert_eq!(created.full_name(), "REPORT:EXPORT");
}

#[tokio::test]
async fn unknown_permissions_abort_role_creation() {
    let app = spawn_app();
    register(&app, "acme", "gil").await;
    let rbac = &app.state.rbac_service;

    let result = rbac
        .create_role_with_permissions("acme", role("ROLE_X", &["BOOKING:READ", "NOPE:READ"]))
        .await;
    assert!(matches!(result, Err(AppError::InvalidName(_))));

    // Nada foi criado
    let roles = rbac.list_roles("acme").await.unwrap();
    assert!(roles.iter().all(|r| r.role.name != "ROLE_X"));
}

#[tokio::test]
async fn roles_never_cross_tenants() {
    let app = spawn_app();
    let acme_user = register(&app, "acme", "hana").await;
    register(&app, "globex", "ivo").await;
    let rbac = &app.state.rbac_service;

    rbac.create_role_with_permissions("globex", role("ROLE_GLOBEX_ONLY", &["PAYMENT:READ"]))
        .await
        .unwrap();

    // O usuário de acme não existe em globex
    let result = rbac
        .assign_role("globex", acme_user.tokens.user_id, "ROLE_GLOBEX_ONLY")
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // E o cargo de globex não existe em acme
    let result = rbac
        .assign_role("acme", acme_user.tokens.user_id, "ROLE_GLOBEX_ONLY")
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let snapshot = rbac
        .snapshot_for_user("globex", acme_user.tokens.user_id)
        .await
        .unwrap();
    assert!(snapshot.roles.is_empty());
}

#[tokio::test]
async fn deactivated_role_lingers_in_the_token_until_reissued() {
    let app = spawn_app();
    let session = register(&app, "acme", "joana").await;
    let user_id = session.tokens.user_id;
    let rbac = &app.state.rbac_service;

    rbac.create_permission(
        "acme",
        CreatePermissionPayload {
            name: None,
            resource: "BOOKING".into(),
            action: "WRITE".into(),
            description: None,
        },
    )
    .await
    .unwrap();
    rbac.create_role_with_permissions("acme", role("R1", &["BOOKING:READ"]))
        .await
        .unwrap();
    let r2 = rbac
        .create_role_with_permissions("acme", role("R2", &["BOOKING:WRITE"]))
        .await
        .unwrap();
    rbac.assign_role("acme", user_id, "R1").await.unwrap();
    rbac.assign_role("acme", user_id, "R2").await.unwrap();

    let permissions = rbac.effective_permissions("acme", user_id).await.unwrap();
    assert!(permissions.contains("BOOKING:READ"));
    assert!(permissions.contains("BOOKING:WRITE"));

    let issued = app
        .state
        .auth_service
        .refresh(&session.tokens.refresh.token)
        .await
        .unwrap();

    rbac.set_role_active("acme", r2.role.id, false).await.unwrap();

    // O token emitido antes da desativação ainda carrega BOOKING:WRITE
    let before = VerifiedIdentity::from(
        app.state
            .token_service
            .validate_access_token(&issued.tokens.access.token)
            .unwrap(),
    );
    assert!(RbacService::has_permission(&before, "BOOKING", "WRITE"));

    let reissued = app
        .state
        .auth_service
        .refresh(&issued.tokens.refresh.token)
        .await
        .unwrap();
    let after = VerifiedIdentity::from(
        app.state
            .token_service
            .validate_access_token(&reissued.tokens.access.token)
            .unwrap(),
    );
    assert!(!RbacService::has_permission(&after, "BOOKING", "WRITE"));
    assert!(RbacService::has_permission(&after, "BOOKING", "READ"));
}
