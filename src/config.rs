// src/config.rs

use std::{env, fmt, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{
        InMemoryRbacRepository, InMemoryTokenRepository, InMemoryUserRepository,
        PgRbacRepository, PgTokenRepository, PgUserRepository, RbacRepository, TokenRepository,
        UserRepository,
    },
    services::{
        auth::AuthService,
        notifier::Notifier,
        rbac_service::{normalize_role_name, RbacService},
        token_service::TokenService,
    },
};

/// Quem manda no tenant quando o token e a requisição discordam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantPolicy {
    /// Tenant resolvido diferente do tenant do token: 401.
    Enforce,
    /// Encaminha mesmo assim; o tenant resolvido serve só para roteamento.
    Advisory,
}

impl FromStr for TenantPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(TenantPolicy::Enforce),
            "advisory" => Ok(TenantPolicy::Advisory),
            other => anyhow::bail!("TENANT_POLICY inválida: '{other}' (use enforce ou advisory)"),
        }
    }
}

/// Usuário que recebe `ROLE_ADMIN` ao se registrar no seu tenant.
/// Formato em `BOOTSTRAP_ADMINS`: `tenant:username`, separados por vírgula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub tenant_id: String,
    pub username: String,
}

impl BootstrapAdmin {
    pub fn matches(&self, tenant_id: &str, username: &str) -> bool {
        self.tenant_id == tenant_id && self.username == username
    }
}

impl FromStr for BootstrapAdmin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tenant_id, username) = s
            .split_once(':')
            .map(|(t, u)| (t.trim(), u.trim()))
            .filter(|(t, u)| !t.is_empty() && !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("'{s}' não está no formato tenant:username"))?;
        Ok(Self {
            tenant_id: tenant_id.to_owned(),
            username: username.to_owned(),
        })
    }
}

// Parâmetros de emissão de tokens e de credenciais
#[derive(Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub verification_token_ttl_secs: i64,
    pub reset_token_ttl_secs: i64,
    pub min_password_length: usize,
    pub bcrypt_cost: u32,
    pub require_verified_email: bool,
    pub default_role: String,
    pub bootstrap_admins: Vec<BootstrapAdmin>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "tenant-auth".into(),
            access_token_ttl_secs: 86_400,
            refresh_token_ttl_secs: 604_800,
            verification_token_ttl_secs: 86_400,
            reset_token_ttl_secs: 3_600,
            min_password_length: 8,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            require_verified_email: false,
            default_role: "ROLE_USER".into(),
            bootstrap_admins: Vec::new(),
        }
    }
}

// O segredo nunca aparece em logs
impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("verification_token_ttl_secs", &self.verification_token_ttl_secs)
            .field("reset_token_ttl_secs", &self.reset_token_ttl_secs)
            .field("min_password_length", &self.min_password_length)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("require_verified_email", &self.require_verified_email)
            .field("default_role", &self.default_role)
            .field("bootstrap_admins", &self.bootstrap_admins)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub auth: AuthSettings,
    pub default_tenant: String,
    pub tenant_policy: TenantPolicy,
    pub upstream_url: Option<String>,
    pub token_sweep_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            database_url: None,
            auth: AuthSettings::default(),
            default_tenant: "default".into(),
            tenant_policy: TenantPolicy::Enforce,
            upstream_url: None,
            token_sweep_interval: Duration::from_secs(300),
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET não pode ser vazio");
        }

        let auth = AuthSettings {
            jwt_secret,
            jwt_issuer: env_or("JWT_ISSUER", defaults.auth.jwt_issuer)?,
            access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL_SECS", defaults.auth.access_token_ttl_secs)?,
            refresh_token_ttl_secs: env_or("REFRESH_TOKEN_TTL_SECS", defaults.auth.refresh_token_ttl_secs)?,
            verification_token_ttl_secs: env_or(
                "VERIFICATION_TOKEN_TTL_SECS",
                defaults.auth.verification_token_ttl_secs,
            )?,
            reset_token_ttl_secs: env_or("RESET_TOKEN_TTL_SECS", defaults.auth.reset_token_ttl_secs)?,
            min_password_length: env_or("MIN_PASSWORD_LENGTH", defaults.auth.min_password_length)?,
            bcrypt_cost: env_or("BCRYPT_COST", defaults.auth.bcrypt_cost)?,
            require_verified_email: env_or("REQUIRE_VERIFIED_EMAIL", defaults.auth.require_verified_email)?,
            default_role: env_or("DEFAULT_ROLE", defaults.auth.default_role)?,
            bootstrap_admins: env::var("BOOTSTRAP_ADMINS")
                .ok()
                .map(|raw| parse_bootstrap_admins(&raw))
                .transpose()?
                .unwrap_or_default(),
        };
        normalize_role_name(&auth.default_role)
            .map_err(|e| anyhow::anyhow!("DEFAULT_ROLE inválido: {e}"))?;

        let sweep_secs: u64 = env_or(
            "TOKEN_SWEEP_INTERVAL_SECS",
            defaults.token_sweep_interval.as_secs(),
        )?;
        if sweep_secs == 0 {
            anyhow::bail!("TOKEN_SWEEP_INTERVAL_SECS deve ser maior que zero");
        }

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr)?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            auth,
            default_tenant: env_or("DEFAULT_TENANT", defaults.default_tenant)?,
            tenant_policy: env_or("TENANT_POLICY", defaults.tenant_policy)?,
            upstream_url: env::var("UPSTREAM_URL").ok().filter(|v| !v.trim().is_empty()),
            token_sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} inválida ('{raw}'): {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_bootstrap_admins(raw: &str) -> anyhow::Result<Vec<BootstrapAdmin>> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            entry
                .parse::<BootstrapAdmin>()
                .context("BOOTSTRAP_ADMINS inválida")
        })
        .collect()
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth_service: AuthService,
    pub rbac_service: RbacService,
    pub token_service: TokenService,
    pub http: reqwest::Client,
}

impl AppState {
    /// Postgres quando `DATABASE_URL` está definida; memória caso contrário.
    pub async fn new(settings: Settings, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let Some(database_url) = settings.database_url.clone() else {
            tracing::warn!("DATABASE_URL ausente: usando armazenamento em memória");
            return Self::in_memory(settings, notifier);
        };

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        sqlx::migrate!()
            .run(&db_pool)
            .await
            .context("Falha ao rodar as migrações do banco de dados")?;
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

        Self::assemble(
            settings,
            Arc::new(PgUserRepository::new(db_pool.clone())),
            Arc::new(PgRbacRepository::new(db_pool.clone())),
            Arc::new(PgTokenRepository::new(db_pool)),
            notifier,
        )
    }

    pub fn in_memory(settings: Settings, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        Self::assemble(
            settings,
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryRbacRepository::new()),
            Arc::new(InMemoryTokenRepository::new()),
            notifier,
        )
    }

    // --- Monta o gráfico de dependências ---
    fn assemble(
        settings: Settings,
        user_repo: Arc<dyn UserRepository>,
        rbac_repo: Arc<dyn RbacRepository>,
        token_repo: Arc<dyn TokenRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let token_service = TokenService::new(token_repo, &settings.auth);
        let rbac_service = RbacService::new(rbac_repo, user_repo.clone(), &settings.auth.default_role)
            .context("DEFAULT_ROLE inválido")?;
        let auth_service = AuthService::new(
            user_repo,
            rbac_service.clone(),
            token_service.clone(),
            notifier,
            &settings.auth,
        )
        .context("Falha ao inicializar o AuthService")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Falha ao criar o cliente HTTP")?;

        Ok(Self {
            settings: Arc::new(settings),
            auth_service,
            rbac_service,
            token_service,
            http,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_policy_parses_case_insensitively() {
        assert_eq!("Enforce".parse::<TenantPolicy>().unwrap(), TenantPolicy::Enforce);
        assert_eq!(" advisory ".parse::<TenantPolicy>().unwrap(), TenantPolicy::Advisory);
        assert!("strict".parse::<TenantPolicy>().is_err());
    }

    #[test]
    fn debug_redacts_the_secret() {
        let settings = AuthSettings {
            jwt_secret: "super-secreto".into(),
            ..AuthSettings::default()
        };
        assert!(!format!("{settings:?}").contains("super-secreto"));
    }

    #[test]
    fn bootstrap_admins_are_tenant_qualified() {
        let admins = parse_bootstrap_admins("acme:ana, globex : root ,").unwrap();
        assert_eq!(admins.len(), 2);
        assert!(admins[0].matches("acme", "ana"));
        assert!(!admins[0].matches("globex", "ana"));
        assert!(admins[1].matches("globex", "root"));

        assert!(parse_bootstrap_admins("ana").is_err());
        assert!(parse_bootstrap_admins("acme:").is_err());
    }

    #[test]
    fn invalid_default_role_fails_assembly() {
        let settings = Settings {
            auth: AuthSettings {
                jwt_secret: "segredo".into(),
                bcrypt_cost: 4,
                default_role: "cargo com espaço".into(),
                ..AuthSettings::default()
            },
            ..Settings::default()
        };
        let notifier = Arc::new(crate::services::notifier::ChannelNotifier::channel().0);
        assert!(AppState::in_memory(settings, notifier).is_err());
    }
}
