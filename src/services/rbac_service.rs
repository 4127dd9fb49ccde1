// src/services/rbac_service.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{RbacRepository, UserRepository},
    models::{
        auth::{IdentitySnapshot, VerifiedIdentity},
        rbac::{
            full_permission_name, CreatePermissionPayload, CreateRolePayload, NewPermission,
            NewRole, Permission, Role, RoleResponse,
        },
    },
};

pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

// Catálogo semeado em cada tenant novo
const CATALOG_RESOURCES: [&str; 5] = ["USER", "TRAVEL", "BOOKING", "PAYMENT", "ANALYTICS"];
const CATALOG_ACTIONS: [&str; 4] = ["READ", "CREATE", "UPDATE", "DELETE"];
const RBAC_MANAGE: (&str, &str) = ("RBAC", "MANAGE");

const USER_ROLE_DEFAULTS: [&str; 4] = ["USER:READ", "TRAVEL:READ", "BOOKING:READ", "BOOKING:CREATE"];

// Limites das colunas em `roles` e `permissions`
const MAX_ROLE_NAME_LENGTH: usize = 50;
const MAX_PERMISSION_NAME_LENGTH: usize = 100;
// `{RESOURCE}_{ACTION}` precisa caber em MAX_PERMISSION_NAME_LENGTH
const MAX_PERMISSION_PART_LENGTH: usize = 49;
const MAX_DESCRIPTION_LENGTH: usize = 255;

#[derive(Clone)]
pub struct RbacService {
    repo: Arc<dyn RbacRepository>,
    users: Arc<dyn UserRepository>,
    default_role: Arc<str>,
}

impl RbacService {
    /// `default_role` é o cargo dado a todo usuário novo; é semeado em cada
    /// tenant junto com os cargos fixos.
    pub fn new(
        repo: Arc<dyn RbacRepository>,
        users: Arc<dyn UserRepository>,
        default_role: &str,
    ) -> Result<Self, AppError> {
        let default_role = normalize_role_name(default_role)?;
        Ok(Self {
            repo,
            users,
            default_role: Arc::from(default_role),
        })
    }

    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    /// Verificação contra o snapshot do token. Sem ida ao banco: mudanças
    /// de cargo só aparecem após novo login ou refresh.
    pub fn has_permission(identity: &VerifiedIdentity, resource: &str, action: &str) -> bool {
        identity
            .permissions
            .contains(&full_permission_name(resource, action))
    }

    /// Garante os cargos e o catálogo padrão do tenant. Seguro sob
    /// concorrência: duplicatas viram leitura do registro existente.
    pub async fn ensure_tenant_defaults(&self, tenant_id: &str) -> Result<(), AppError> {
        let mut missing = false;
        for name in [ROLE_USER, ROLE_ADMIN, self.default_role()] {
            if self.repo.find_role_by_name(tenant_id, name).await?.is_none() {
                missing = true;
                break;
            }
        }
        if !missing {
            return Ok(());
        }

        tracing::info!(%tenant_id, "Semeando cargos e permissões padrão do tenant");

        // 1. Catálogo de permissões
        let mut catalog = Vec::new();
        for resource in CATALOG_RESOURCES {
            for action in CATALOG_ACTIONS {
                catalog.push(self.get_or_create_permission(tenant_id, resource, action).await?);
            }
        }
        catalog.push(
            self.get_or_create_permission(tenant_id, RBAC_MANAGE.0, RBAC_MANAGE.1)
                .await?,
        );

        // 2. Cargo de usuário comum
        let user_role = self
            .get_or_create_role(tenant_id, ROLE_USER, "Usuário padrão da plataforma")
            .await?;
        for permission in catalog
            .iter()
            .filter(|p| USER_ROLE_DEFAULTS.contains(&p.full_name().as_str()))
        {
            self.repo
                .assign_permission(tenant_id, user_role.id, permission.id)
                .await?;
        }

        // 3. Cargo padrão configurado, quando não é um dos fixos
        if self.default_role() != ROLE_USER && self.default_role() != ROLE_ADMIN {
            let default_role = self
                .get_or_create_role(tenant_id, self.default_role(), "Cargo padrão de novos usuários")
                .await?;
            for permission in catalog
                .iter()
                .filter(|p| USER_ROLE_DEFAULTS.contains(&p.full_name().as_str()))
            {
                self.repo
                    .assign_permission(tenant_id, default_role.id, permission.id)
                    .await?;
            }
        }

        // 4. Administrador recebe tudo
        let admin_role = self
            .get_or_create_role(tenant_id, ROLE_ADMIN, "Administrador do tenant")
            .await?;
        for permission in &catalog {
            self.repo
                .assign_permission(tenant_id, admin_role.id, permission.id)
                .await?;
        }

        Ok(())
    }

    async fn get_or_create_permission(
        &self,
        tenant_id: &str,
        resource: &str,
        action: &str,
    ) -> Result<Permission, AppError> {
        let new_permission = NewPermission {
            name: format!("{resource}_{action}"),
            resource: resource.to_owned(),
            action: action.to_owned(),
            description: None,
        };
        match self.repo.create_permission(tenant_id, new_permission).await {
            Err(AppError::DuplicatePermission) => self
                .repo
                .find_permissions_by_full_names(tenant_id, &[full_permission_name(resource, action)])
                .await?
                .into_iter()
                .next()
                .ok_or(AppError::DuplicatePermission),
            other => other,
        }
    }

    async fn get_or_create_role(
        &self,
        tenant_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Role, AppError> {
        let new_role = NewRole {
            name: name.to_owned(),
            description: Some(description.to_owned()),
        };
        match self.repo.create_role(tenant_id, new_role).await {
            Err(AppError::DuplicateRole) => self
                .repo
                .find_role_by_name(tenant_id, name)
                .await?
                .ok_or(AppError::DuplicateRole),
            other => other,
        }
    }

    pub async fn create_permission(
        &self,
        tenant_id: &str,
        payload: CreatePermissionPayload,
    ) -> Result<Permission, AppError> {
        let resource = normalize_identifier(&payload.resource, "recurso", MAX_PERMISSION_PART_LENGTH)?;
        let action = normalize_identifier(&payload.action, "ação", MAX_PERMISSION_PART_LENGTH)?;
        let name = match payload.name {
            Some(name) => normalize_identifier(&name, "nome", MAX_PERMISSION_NAME_LENGTH)?,
            None => format!("{resource}_{action}"),
        };
        check_description(payload.description.as_deref())?;

        let permission = self
            .repo
            .create_permission(
                tenant_id,
                NewPermission {
                    name,
                    resource,
                    action,
                    description: payload.description,
                },
            )
            .await?;

        tracing::info!(%tenant_id, permission = %permission.full_name(), "Permissão criada");
        Ok(permission)
    }

    pub async fn create_role_with_permissions(
        &self,
        tenant_id: &str,
        payload: CreateRolePayload,
    ) -> Result<RoleResponse, AppError> {
        let name = normalize_role_name(&payload.name)?;
        check_description(payload.description.as_deref())?;

        // 1. Resolve os nomes completos antes de criar qualquer coisa
        let requested: BTreeSet<String> = payload
            .permissions
            .iter()
            .map(|p| p.trim().to_ascii_uppercase())
            .collect();
        let requested: Vec<String> = requested.into_iter().collect();
        let permissions = self
            .repo
            .find_permissions_by_full_names(tenant_id, &requested)
            .await?;

        if permissions.len() != requested.len() {
            let found: BTreeSet<String> = permissions.iter().map(Permission::full_name).collect();
            let missing: Vec<&str> = requested
                .iter()
                .filter(|p| !found.contains(*p))
                .map(String::as_str)
                .collect();
            return Err(AppError::InvalidName(format!(
                "permissões desconhecidas: {}",
                missing.join(", ")
            )));
        }

        // 2. Cria o cargo
        let role = self
            .repo
            .create_role(
                tenant_id,
                NewRole {
                    name,
                    description: payload.description,
                },
            )
            .await?;

        // 3. Vincula as permissões
        for permission in &permissions {
            self.repo
                .assign_permission(tenant_id, role.id, permission.id)
                .await?;
        }

        tracing::info!(%tenant_id, role = %role.name, count = permissions.len(), "Cargo criado");
        Ok(RoleResponse {
            role,
            permissions: permissions.iter().map(Permission::full_name).collect(),
        })
    }

    pub async fn list_roles(&self, tenant_id: &str) -> Result<Vec<RoleResponse>, AppError> {
        let roles = self.repo.list_roles(tenant_id).await?;
        let mut responses = Vec::with_capacity(roles.len());
        for role in roles {
            let permissions = self.repo.permissions_for_role(tenant_id, role.id).await?;
            responses.push(RoleResponse {
                role,
                permissions: permissions.iter().map(Permission::full_name).collect(),
            });
        }
        Ok(responses)
    }

    pub async fn list_permissions(&self, tenant_id: &str) -> Result<Vec<Permission>, AppError> {
        self.repo.list_permissions(tenant_id).await
    }

    pub async fn find_role(&self, tenant_id: &str, role_name: &str) -> Result<Role, AppError> {
        self.repo
            .find_role_by_name(tenant_id, role_name.trim())
            .await?
            .ok_or(AppError::NotFound("Cargo"))
    }

    /// Atribui um cargo (pelo nome) a um usuário do mesmo tenant.
    pub async fn assign_role(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        role_name: &str,
    ) -> Result<(), AppError> {
        self.users
            .find_by_id(tenant_id, user_id)
            .await?
            .ok_or(AppError::NotFound("Usuário"))?;

        let role = self.find_role(tenant_id, role_name).await?;

        self.repo.assign_role(tenant_id, user_id, role.id).await?;
        tracing::info!(%tenant_id, %user_id, role = %role.name, "Cargo atribuído");
        Ok(())
    }

    pub async fn set_role_active(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        active: bool,
    ) -> Result<Role, AppError> {
        self.repo.set_role_active(tenant_id, role_id, active).await
    }

    pub async fn set_permission_active(
        &self,
        tenant_id: &str,
        permission_id: Uuid,
        active: bool,
    ) -> Result<Permission, AppError> {
        self.repo
            .set_permission_active(tenant_id, permission_id, active)
            .await
    }

    /// Leitura ao vivo dos cargos ativos e da união das suas permissões
    /// ativas. É o que vai para o snapshot de um token novo.
    pub async fn snapshot_for_user(
        &self,
        tenant_id: &str,
        user_id: Uuid,
    ) -> Result<IdentitySnapshot, AppError> {
        let grants = self.repo.grants_for_user(tenant_id, user_id).await?;

        let mut snapshot = IdentitySnapshot::default();
        for grant in grants.into_iter().filter(|g| g.role.is_active) {
            snapshot.roles.insert(grant.role.name);
            snapshot.permissions.extend(
                grant
                    .permissions
                    .iter()
                    .filter(|p| p.is_active)
                    .map(Permission::full_name),
            );
        }
        Ok(snapshot)
    }

    pub async fn effective_permissions(
        &self,
        tenant_id: &str,
        user_id: Uuid,
    ) -> Result<BTreeSet<String>, AppError> {
        Ok(self.snapshot_for_user(tenant_id, user_id).await?.permissions)
    }
}

pub fn normalize_role_name(value: &str) -> Result<String, AppError> {
    normalize_identifier(value, "nome do cargo", MAX_ROLE_NAME_LENGTH)
}

// Identificadores de RBAC: maiúsculas, dígitos e '_'
fn normalize_identifier(value: &str, field: &str, max_length: usize) -> Result<String, AppError> {
    let normalized = value.trim().to_ascii_uppercase();
    if normalized.is_empty() || normalized.len() > max_length {
        return Err(AppError::InvalidName(format!(
            "{field} deve ter entre 1 e {max_length} caracteres"
        )));
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::InvalidName(format!(
            "{field} aceita apenas letras, números e '_'"
        )));
    }
    Ok(normalized)
}

fn check_description(description: Option<&str>) -> Result<(), AppError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => Err(AppError::InvalidName(format!(
            "descrição aceita no máximo {MAX_DESCRIPTION_LENGTH} caracteres"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_upper_cased_and_checked() {
        assert_eq!(normalize_identifier(" booking ", "recurso", 49).unwrap(), "BOOKING");
        assert_eq!(normalize_role_name("role_agent").unwrap(), "ROLE_AGENT");
        assert!(matches!(normalize_role_name("  "), Err(AppError::InvalidName(_))));
        assert!(matches!(normalize_role_name("A:B"), Err(AppError::InvalidName(_))));
    }

    #[test]
    fn name_limits_match_the_table_columns() {
        assert!(normalize_role_name(&"R".repeat(MAX_ROLE_NAME_LENGTH)).is_ok());
        assert!(matches!(
            normalize_role_name(&"R".repeat(MAX_ROLE_NAME_LENGTH + 1)),
            Err(AppError::InvalidName(_))
        ));

        // Nome derivado no pior caso ainda cabe na coluna
        let part = "X".repeat(MAX_PERMISSION_PART_LENGTH);
        assert!(format!("{part}_{part}").len() <= MAX_PERMISSION_NAME_LENGTH);

        assert!(check_description(Some(&"é".repeat(MAX_DESCRIPTION_LENGTH))).is_ok());
        assert!(check_description(Some(&"é".repeat(MAX_DESCRIPTION_LENGTH + 1))).is_err());
    }

    #[test]
    fn has_permission_reads_the_snapshot_only() {
        let identity = VerifiedIdentity {
            user_id: Uuid::new_v4(),
            tenant_id: "acme".into(),
            roles: [ROLE_USER.to_string()].into_iter().collect(),
            permissions: ["BOOKING:READ".to_string()].into_iter().collect(),
        };
        assert!(RbacService::has_permission(&identity, "BOOKING", "READ"));
        assert!(!RbacService::has_permission(&identity, "BOOKING", "DELETE"));
    }
}
