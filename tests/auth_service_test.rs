//! Fluxos do AuthService sobre os repositórios em memória.

mod common;

use common::{credentials, register, registration, spawn_app, spawn_app_with, test_settings, PASSWORD};
use tenant_auth::{
    common::error::AppError,
    config::{AuthSettings, Settings},
    services::rbac_service::ROLE_USER,
};

#[tokio::test]
async fn login_then_validate_returns_same_user_and_tenant() {
    let app = spawn_app();
    let registered = register(&app, "acme", "ana").await;

    let session = app
        .state
        .auth_service
        .login("acme", credentials("ana", PASSWORD))
        .await
        .unwrap();

    let claims = app
        .state
        .token_service
        .validate_access_token(&session.tokens.access.token)
        .unwrap();
    assert_eq!(claims.sub, registered.tokens.user_id);
    assert_eq!(claims.tenant_id, "acme");
    assert!(claims.roles.contains(&ROLE_USER.to_string()));

    let user = session.user.expect("login devolve o usuário");
    assert_eq!(user.username, "ana");
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn login_accepts_email_case_insensitively() {
    let app = spawn_app();
    register(&app, "acme", "bruno").await;

    let session = app
        .state
        .auth_service
        .login("acme", credentials("  BRUNO@Example.com ", PASSWORD))
        .await
        .unwrap();
    assert_eq!(session.tokens.tenant_id, "acme");
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = spawn_app();
    register(&app, "acme", "carla").await;

    let wrong = app
        .state
        .auth_service
        .login("acme", credentials("carla", "outra-senha1"))
        .await;
    assert!(matches!(wrong, Err(AppError::InvalidCredentials)));

    let unknown = app
        .state
        .auth_service
        .login("acme", credentials("ninguem", PASSWORD))
        .await;
    assert!(matches!(unknown, Err(AppError::InvalidCredentials)));

    // O usuário existe, mas em outro tenant
    let other_tenant = app
        .state
        .auth_service
        .login("globex", credentials("carla", PASSWORD))
        .await;
    assert!(matches!(other_tenant, Err(AppError::InvalidCredentials)));
}

#[tokio::test]
async fn username_is_unique_per_tenant_only() {
    let app = spawn_app();
    register(&app, "acme", "davi").await;

    let mut same_name = registration("davi");
    same_name.email = "outro@example.com".into();
    let duplicate = app.state.auth_service.register("acme", same_name).await;
    assert!(matches!(duplicate, Err(AppError::DuplicateUsername)));

    let mut same_email = registration("davi2");
    same_email.email = "DAVI@example.com".into();
    let duplicate = app.state.auth_service.register("acme", same_email).await;
    assert!(matches!(duplicate, Err(AppError::DuplicateEmail)));

    // Outro tenant aceita o mesmo nome e e-mail
    register(&app, "globex", "davi").await;
}

#[tokio::test]
async fn weak_password_is_rejected_at_registration() {
    let app = spawn_app();
    let mut payload = registration("eva");
    payload.password = "curta1".into();

    let result = app.state.auth_service.register("acme", payload).await;
    assert!(matches!(result, Err(AppError::WeakPassword(_))));
}

#[tokio::test]
async fn registration_queues_email_verification() {
    let app = spawn_app();
    let session = register(&app, "acme", "fabio").await;

    let sent = app.notifier.all();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind(), "email_verification");
    assert_eq!(sent[0].email(), "fabio@example.com");

    let token = app.notifier.last_token("email_verification").unwrap();
    app.state.auth_service.verify_email(&token).await.unwrap();

    let again = app.state.auth_service.verify_email(&token).await;
    assert!(matches!(again, Err(AppError::AlreadyUsed)));

    let user = session.user.unwrap();
    assert!(!user.is_email_verified);
}

#[tokio::test]
async fn unverified_email_blocks_login_only_when_required() {
    let app = spawn_app_with(Settings {
        auth: AuthSettings {
            require_verified_email: true,
            ..test_settings().auth
        },
        ..test_settings()
    });
    register(&app, "acme", "gabi").await;

    let blocked = app
        .state
        .auth_service
        .login("acme", credentials("gabi", PASSWORD))
        .await;
    assert!(matches!(blocked, Err(AppError::EmailUnverified)));

    let token = app.notifier.last_token("email_verification").unwrap();
    app.state.auth_service.verify_email(&token).await.unwrap();

    let session = app
        .state
        .auth_service
        .login("acme", credentials("gabi", PASSWORD))
        .await
        .unwrap();
    assert!(session.user.unwrap().is_email_verified);
}

#[tokio::test]
async fn concurrent_refresh_has_exactly_one_winner() {
    let app = spawn_app();
    let session = register(&app, "acme", "hugo").await;
    let token = session.tokens.refresh.token.clone();

    let service = &app.state.auth_service;
    let (first, second) = tokio::join!(service.refresh(&token), service.refresh(&token));

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::RevokedToken))));
}

#[tokio::test]
async fn refresh_rotates_and_old_token_is_revoked() {
    let app = spawn_app();
    let session = register(&app, "acme", "iris").await;

    let rotated = app
        .state
        .auth_service
        .refresh(&session.tokens.refresh.token)
        .await
        .unwrap();
    assert_ne!(rotated.tokens.refresh.token_id, session.tokens.refresh.token_id);
    assert_eq!(rotated.tokens.tenant_id, "acme");
    assert!(rotated.user.is_none());

    let reused = app
        .state
        .auth_service
        .refresh(&session.tokens.refresh.token)
        .await;
    assert!(matches!(reused, Err(AppError::RevokedToken)));

    // O token girado continua válido
    app.state
        .auth_service
        .refresh(&rotated.tokens.refresh.token)
        .await
        .unwrap();
}

#[tokio::test]
async fn access_token_cannot_be_used_as_refresh_token() {
    let app = spawn_app();
    let session = register(&app, "acme", "joao").await;

    let result = app
        .state
        .auth_service
        .refresh(&session.tokens.access.token)
        .await;
    assert!(matches!(result, Err(AppError::InvalidToken)));
}

#[tokio::test]
async fn logout_is_idempotent_and_revokes() {
    let app = spawn_app();
    let session = register(&app, "acme", "karen").await;
    let token = &session.tokens.refresh.token;

    app.state.auth_service.logout(token).await.unwrap();
    app.state.auth_service.logout(token).await.unwrap();

    let result = app.state.auth_service.refresh(token).await;
    assert!(matches!(result, Err(AppError::RevokedToken)));
}

#[tokio::test]
async fn reset_password_swaps_credentials_and_ends_sessions() {
    let app = spawn_app();
    let session = register(&app, "acme", "lucas").await;

    app.state
        .auth_service
        .forgot_password("acme", "LUCAS@example.com")
        .await
        .unwrap();
    let token = app.notifier.last_token("password_reset").unwrap();

    app.state
        .auth_service
        .reset_password(&token, "nova-senha-2025")
        .await
        .unwrap();

    let old = app
        .state
        .auth_service
        .login("acme", credentials("lucas", PASSWORD))
        .await;
    assert!(matches!(old, Err(AppError::InvalidCredentials)));

    app.state
        .auth_service
        .login("acme", credentials("lucas", "nova-senha-2025"))
        .await
        .unwrap();

    // Refresh tokens emitidos antes do reset morreram
    let refresh = app
        .state
        .auth_service
        .refresh(&session.tokens.refresh.token)
        .await;
    assert!(matches!(refresh, Err(AppError::RevokedToken)));

    // E o token de reset é de uso único
    let reuse = app
        .state
        .auth_service
        .reset_password(&token, "mais-uma-senha-3")
        .await;
    assert!(matches!(reuse, Err(AppError::AlreadyUsed)));
}

#[tokio::test]
async fn weak_new_password_does_not_burn_the_reset_token() {
    let app = spawn_app();
    register(&app, "acme", "marta").await;
    app.state
        .auth_service
        .forgot_password("acme", "marta@example.com")
        .await
        .unwrap();
    let token = app.notifier.last_token("password_reset").unwrap();

    let weak = app.state.auth_service.reset_password(&token, "123").await;
    assert!(matches!(weak, Err(AppError::WeakPassword(_))));

    app.state
        .auth_service
        .reset_password(&token, "senha-forte-99")
        .await
        .unwrap();
}

#[tokio::test]
async fn new_reset_request_invalidates_the_previous_one() {
    let app = spawn_app();
    register(&app, "acme", "nina").await;

    app.state
        .auth_service
        .forgot_password("acme", "nina@example.com")
        .await
        .unwrap();
    let first = app.notifier.last_token("password_reset").unwrap();

    app.state
        .auth_service
        .forgot_password("acme", "nina@example.com")
        .await
        .unwrap();
    let second = app.notifier.last_token("password_reset").unwrap();
    assert_ne!(first, second);

    let stale = app
        .state
        .auth_service
        .reset_password(&first, "senha-nova-01")
        .await;
    assert!(matches!(stale, Err(AppError::AlreadyUsed)));

    app.state
        .auth_service
        .reset_password(&second, "senha-nova-01")
        .await
        .unwrap();
}

#[tokio::test]
async fn forgot_password_is_silent_for_unknown_email() {
    let app = spawn_app();
    register(&app, "acme", "otto").await;
    let before = app.notifier.all().len();

    app.state
        .auth_service
        .forgot_password("acme", "ninguem@example.com")
        .await
        .unwrap();
    // Mesmo e-mail, tenant errado
    app.state
        .auth_service
        .forgot_password("globex", "otto@example.com")
        .await
        .unwrap();

    assert_eq!(app.notifier.all().len(), before);
}

#[tokio::test]
async fn unknown_one_time_tokens_are_invalid() {
    let app = spawn_app();
    let verify = app.state.auth_service.verify_email("nao-existe").await;
    assert!(matches!(verify, Err(AppError::InvalidToken)));

    let reset = app
        .state
        .auth_service
        .reset_password("nao-existe", "senha-forte-99")
        .await;
    assert!(matches!(reset, Err(AppError::InvalidToken)));
}

#[tokio::test]
async fn deactivated_user_cannot_log_in_or_refresh() {
    let app = spawn_app();
    let session = register(&app, "acme", "paula").await;
    let user_id = session.tokens.user_id;

    app.state
        .auth_service
        .deactivate_user("acme", user_id)
        .await
        .unwrap();

    let login = app
        .state
        .auth_service
        .login("acme", credentials("paula", PASSWORD))
        .await;
    assert!(matches!(login, Err(AppError::AccountInactive)));

    let refresh = app
        .state
        .auth_service
        .refresh(&session.tokens.refresh.token)
        .await;
    assert!(matches!(refresh, Err(AppError::RevokedToken)));
}

#[tokio::test]
async fn configured_default_role_is_seeded_before_the_first_user() {
    let app = spawn_app_with(Settings {
        auth: AuthSettings {
            default_role: "role_customer".into(),
            ..test_settings().auth
        },
        ..test_settings()
    });

    let session = register(&app, "acme", "quiteria").await;
    let user = session.user.unwrap();
    assert!(user.roles.contains("ROLE_CUSTOMER"));

    let permissions = app
        .state
        .rbac_service
        .effective_permissions("acme", session.tokens.user_id)
        .await
        .unwrap();
    assert!(permissions.contains("BOOKING:READ"));

    // Um segundo usuário recebe o mesmo cargo
    let second = register(&app, "acme", "rui").await;
    assert!(second.user.unwrap().roles.contains("ROLE_CUSTOMER"));
}
