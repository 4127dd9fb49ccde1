// src/app.rs

use axum::{
    middleware as axum_middleware,
    routing::{any, get, patch, post},
    Router,
};

use crate::{config::AppState, handlers, middleware::auth::edge_auth};

pub fn router(app_state: AppState) -> Router {
    // Define as rotas de autenticação (públicas)
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout))
        .route("/verify-email", post(handlers::auth::verify_email))
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .route("/reset-password", post(handlers::auth::reset_password));

    // Tudo em /api passa pelo filtro de borda
    let api_routes = Router::new()
        .route("/users/me", get(handlers::users::get_me))
        .route("/users/me/permissions", get(handlers::users::get_my_permissions))
        .route(
            "/rbac/permissions",
            get(handlers::rbac::list_permissions).post(handlers::rbac::create_permission),
        )
        .route(
            "/rbac/permissions/{permission_id}",
            patch(handlers::rbac::set_permission_active),
        )
        .route(
            "/rbac/roles",
            get(handlers::rbac::list_roles).post(handlers::rbac::create_role),
        )
        .route("/rbac/roles/{role_id}", patch(handlers::rbac::set_role_active))
        .route("/rbac/users/{user_id}/roles", post(handlers::rbac::assign_role))
        .route(
            "/rbac/users/{user_id}/deactivate",
            post(handlers::rbac::deactivate_user),
        )
        // O resto segue para o serviço de destino
        .route("/{*rest}", any(handlers::gateway::forward))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            edge_auth,
        ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .with_state(app_state)
}
