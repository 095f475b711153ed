use thiserror::Error;

use medledger_core::{AccountId, DomainError};

use crate::{Role, RoleGrants};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("account {account} lacks the {role} role")]
    MissingRole { account: AccountId, role: Role },

    #[error("the zero account cannot hold a role")]
    ZeroAccount,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::MissingRole { .. } => DomainError::unauthorized(value.to_string()),
            AuthzError::ZeroAccount => DomainError::validation(value.to_string()),
        }
    }
}

/// Check that `account` holds `role` in `grants`.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(grants: &RoleGrants, account: &AccountId, role: Role) -> Result<(), AuthzError> {
    if grants.has_role(account, role) {
        Ok(())
    } else {
        tracing::debug!(%account, %role, "authorization denied");
        Err(AuthzError::MissingRole {
            account: *account,
            role,
        })
    }
}

/// Reject the zero/empty account as a grant or revoke target.
pub fn ensure_assignable(account: &AccountId) -> Result<(), AuthzError> {
    if account.is_zero() {
        Err(AuthzError::ZeroAccount)
    } else {
        Ok(())
    }
}
