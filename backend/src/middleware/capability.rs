//! Capability checks
//!
//! Handlers ask one injected [`CapabilityCheck`] whether the caller may run
//! an operation before anything reaches the ledger engine.

use std::fmt;

use super::auth::AuthUser;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Stock,
    Fault,
    Repair,
    Transfer,
    Report,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Stock => "stock",
            Module::Fault => "fault",
            Module::Repair => "repair",
            Module::Transfer => "transfer",
            Module::Report => "report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Approve,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Approve => "approve",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait CapabilityCheck: Send + Sync {
    fn require(&self, user: &AuthUser, module: Module, action: Action) -> AppResult<()>;
}

/// Grants an operation when the token lists `"module:action"`
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionList;

impl CapabilityCheck for PermissionList {
    fn require(&self, user: &AuthUser, module: Module, action: Action) -> AppResult<()> {
        if user.has_permission(module.as_str(), action.as_str()) {
            Ok(())
        } else {
            tracing::debug!(user_id = %user.user_id, %module, %action, "Capability denied");
            Err(AppError::InsufficientPermissions(format!("{}:{}", module, action)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_list_check() {
        let user = AuthUser {
            user_id: uuid::Uuid::nil(),
            permissions: vec!["transfer:approve".to_string(), "report:read".to_string()],
        };
        let check = PermissionList;
        assert!(check.require(&user, Module::Transfer, Action::Approve).is_ok());
        assert!(check.require(&user, Module::Report, Action::Read).is_ok());
        assert!(matches!(
            check.require(&user, Module::Stock, Action::Create),
            Err(AppError::InsufficientPermissions(p)) if p == "stock:create"
        ));
    }
}
