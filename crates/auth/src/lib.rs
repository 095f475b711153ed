//! `medledger-auth`: role-based authorization for the ledger.
//!
//! Credential verification happens upstream; this crate only answers "does this
//! already-resolved account hold the role the operation needs?". Decoupled from
//! transport and storage.

pub mod authorize;
pub mod roles;

pub use authorize::{AuthzError, authorize, ensure_assignable};
pub use roles::{Role, RoleGrants};
