pub mod auth;
pub mod gateway;
pub mod rbac;
pub mod users;
