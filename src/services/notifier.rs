// src/services/notifier.rs
//
// Canal de notificações (e-mail de verificação, redefinição de senha).
// O caminho da requisição só enfileira; a entrega roda numa task à parte.

use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, PartialEq, Eq)]
pub enum Notification {
    EmailVerification {
        tenant_id: String,
        user_id: Uuid,
        email: String,
        token: String,
    },
    PasswordReset {
        tenant_id: String,
        user_id: Uuid,
        email: String,
        token: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::EmailVerification { .. } => "email_verification",
            Notification::PasswordReset { .. } => "password_reset",
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Notification::EmailVerification { token, .. }
            | Notification::PasswordReset { token, .. } => token,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Notification::EmailVerification { email, .. }
            | Notification::PasswordReset { email, .. } => email,
        }
    }
}

// O token bruto nunca aparece em logs
impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind())
            .field("email", &self.email())
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Não bloqueia: quem chama não espera pela entrega.
pub trait Notifier: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn dispatch(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            // Só acontece se o worker já terminou (shutdown)
            tracing::warn!(kind = e.0.kind(), "Fila de notificações fechada, descartando");
        }
    }
}

/// Drena a fila até todos os remetentes serem descartados.
/// A entrega de e-mail fica fora deste serviço; aqui apenas registramos.
pub async fn run_notification_worker(mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        match &notification {
            Notification::EmailVerification { tenant_id, user_id, .. } => {
                tracing::info!(%tenant_id, %user_id, "📧 E-mail de verificação enfileirado para entrega");
            }
            Notification::PasswordReset { tenant_id, user_id, .. } => {
                tracing::info!(%tenant_id, %user_id, "📧 E-mail de redefinição de senha enfileirado para entrega");
            }
        }
    }
    tracing::debug!("Worker de notificações encerrado");
}
