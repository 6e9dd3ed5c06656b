//! Request middleware and extractors

pub mod auth;
pub mod capability;

pub use auth::{auth_middleware, AuthUser, CurrentUser};
pub use capability::{Action, CapabilityCheck, Module, PermissionList};
