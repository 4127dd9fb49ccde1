// src/middleware/rbac.rs

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    common::error::AppError,
    middleware::auth::AuthenticatedUser,
    models::rbac::full_permission_name,
    services::rbac_service::RbacService,
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn resource() -> &'static str;
    fn action() -> &'static str;
}

/// 2. O Extractor (Guardião)
pub struct RequirePermission<T>(pub PhantomData<T>);

// 3. Verifica contra o snapshot do token, sem consultar o banco
impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(identity) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !RbacService::has_permission(&identity, T::resource(), T::action()) {
            return Err(AppError::Forbidden(full_permission_name(
                T::resource(),
                T::action(),
            )));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

pub struct PermRbacManage;
impl PermissionDef for PermRbacManage {
    fn resource() -> &'static str { "RBAC" }
    fn action() -> &'static str { "MANAGE" }
}

pub struct PermUserUpdate;
impl PermissionDef for PermUserUpdate {
    fn resource() -> &'static str { "USER" }
    fn action() -> &'static str { "UPDATE" }
}
