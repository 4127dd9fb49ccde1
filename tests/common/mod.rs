//! Infra compartilhada dos testes de integração: estado em memória e um
//! notificador que guarda o que recebeu.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tenant_auth::{
    config::{AppState, AuthSettings, Settings, TenantPolicy},
    models::auth::{LoginUserPayload, RegisterUserPayload},
    services::{
        notifier::{Notification, Notifier},
        AuthSession,
    },
};

pub const TEST_SECRET: &str = "segredo-dos-testes-de-integracao-0123456789";
pub const PASSWORD: &str = "viagem2024";

#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl CapturingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Token bruto da última notificação do tipo pedido.
    pub fn last_token(&self, kind: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|n| n.kind() == kind)
            .map(|n| n.token().to_owned())
    }
}

impl Notifier for CapturingNotifier {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub struct TestApp {
    pub state: AppState,
    pub notifier: Arc<CapturingNotifier>,
}

pub fn test_settings() -> Settings {
    Settings {
        auth: AuthSettings {
            jwt_secret: TEST_SECRET.into(),
            jwt_issuer: "tenant-auth-test".into(),
            // Custo mínimo do bcrypt para os testes rodarem rápido
            bcrypt_cost: 4,
            ..AuthSettings::default()
        },
        ..Settings::default()
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_settings())
}

pub fn spawn_app_with_policy(policy: TenantPolicy) -> TestApp {
    spawn_app_with(Settings {
        tenant_policy: policy,
        ..test_settings()
    })
}

pub fn spawn_app_with(settings: Settings) -> TestApp {
    let notifier = Arc::new(CapturingNotifier::default());
    let state = AppState::in_memory(settings, notifier.clone()).expect("estado em memória");
    TestApp { state, notifier }
}

pub fn registration(username: &str) -> RegisterUserPayload {
    RegisterUserPayload {
        username: username.into(),
        email: format!("{username}@example.com"),
        password: PASSWORD.into(),
        first_name: "Test".into(),
        last_name: "User".into(),
        preferred_language: None,
        timezone: None,
    }
}

pub fn credentials(identifier: &str, password: &str) -> LoginUserPayload {
    LoginUserPayload {
        username: identifier.into(),
        password: password.into(),
    }
}

pub async fn register(app: &TestApp, tenant_id: &str, username: &str) -> AuthSession {
    app.state
        .auth_service
        .register(tenant_id, registration(username))
        .await
        .expect("registro")
}
