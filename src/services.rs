pub mod auth;
pub use auth::{AuthService, AuthSession};
pub mod notifier;
pub mod password;
pub mod rbac_service;
pub use rbac_service::RbacService;
pub mod token_service;
pub use token_service::{IdentitySource, TokenService};
