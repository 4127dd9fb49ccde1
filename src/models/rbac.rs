// src/models/rbac.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// O que sai do banco (Tabela roles)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// O que sai do banco (Tabela permissions)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Nome completo determinístico, ex.: `BOOKING:READ`.
    pub fn full_name(&self) -> String {
        full_permission_name(&self.resource, &self.action)
    }
}

pub fn full_permission_name(resource: &str, action: &str) -> String {
    format!("{resource}:{action}")
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

// Um cargo do usuário com as permissões ligadas a ele
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

// O Payload para criar um cargo
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRolePayload {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>, // Nomes completos ("BOOKING:READ")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionPayload {
    pub name: Option<String>,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActivePayload {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolePayload {
    pub role: String,
}

// Resposta completa (Cargo + Lista de Permissões)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}
