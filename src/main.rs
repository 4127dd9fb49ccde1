// src/main.rs

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tenant_auth::{
    config::{AppState, Settings},
    services::notifier::{run_notification_worker, ChannelNotifier},
    services::token_service::TokenService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Inicializa o logger (RUST_LOG, padrão "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(
        bind_addr = %settings.bind_addr,
        tenant_policy = ?settings.tenant_policy,
        postgres = settings.database_url.is_some(),
        auth = ?settings.auth,
        "Configuração carregada"
    );

    // Fila de notificações e o worker que a drena
    let (notifier, notifications) = ChannelNotifier::channel();
    tokio::spawn(run_notification_worker(notifications));

    let app_state = AppState::new(settings, Arc::new(notifier)).await?;

    spawn_token_sweeper(
        app_state.token_service.clone(),
        app_state.settings.token_sweep_interval,
    );

    let app = tenant_auth::router(app_state.clone());

    let listener = TcpListener::bind(&app_state.settings.bind_addr)
        .await
        .with_context(|| format!("Falha ao abrir {}", app_state.settings.bind_addr))?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Servidor encerrado");
    Ok(())
}

// Remove periodicamente refresh tokens e tokens de uso único vencidos
fn spawn_token_sweeper(token_service: TokenService, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match token_service.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Tokens vencidos removidos"),
                Err(e) => tracing::error!(error = %e, "Falha ao limpar tokens vencidos"),
            }
        }
    });
}

// Ctrl+C ou SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Falha ao instalar o handler de Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Falha ao instalar o handler de SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C recebido, encerrando..."),
        _ = terminate => tracing::info!("SIGTERM recebido, encerrando..."),
    }
}
