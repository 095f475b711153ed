use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use medledger_core::AccountId;

/// Ledger role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages roles and pause state, soft-deletes procedures.
    Administrator,
    /// Records procedures and updates consent on the procedures it created.
    Practitioner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Practitioner => "practitioner",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role-set value owned by a ledger.
///
/// An account may hold both roles. Mutation is plain set insert/remove; whether
/// a change is allowed (caller is an administrator, last administrator stays)
/// is decided by the ledger before it touches this value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrants {
    administrators: BTreeSet<AccountId>,
    practitioners: BTreeSet<AccountId>,
}

impl RoleGrants {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, role: Role) -> &BTreeSet<AccountId> {
        match role {
            Role::Administrator => &self.administrators,
            Role::Practitioner => &self.practitioners,
        }
    }

    fn set_mut(&mut self, role: Role) -> &mut BTreeSet<AccountId> {
        match role {
            Role::Administrator => &mut self.administrators,
            Role::Practitioner => &mut self.practitioners,
        }
    }

    pub fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.set(role).contains(account)
    }

    /// Returns `true` if the grant was new.
    pub fn grant(&mut self, account: AccountId, role: Role) -> bool {
        self.set_mut(role).insert(account)
    }

    /// Returns `true` if the account held the role.
    pub fn revoke(&mut self, account: &AccountId, role: Role) -> bool {
        self.set_mut(role).remove(account)
    }

    /// Number of accounts holding `role`.
    pub fn count(&self, role: Role) -> usize {
        self.set(role).len()
    }

    /// Accounts holding `role`, in a stable order.
    pub fn members(&self, role: Role) -> impl Iterator<Item = &AccountId> {
        self.set(role).iter()
    }

    /// Roles held by `account`.
    pub fn roles_of(&self, account: &AccountId) -> Vec<Role> {
        [Role::Administrator, Role::Practitioner]
            .into_iter()
            .filter(|r| self.has_role(account, *r))
            .collect()
    }
}
