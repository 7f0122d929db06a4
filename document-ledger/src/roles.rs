//! Identity & Role Store
//!
//! Membership reads plus the pure transition rules for Issuer grants. The
//! writer actor is the only place role changes are committed; this module
//! decides what a grant or removal turns a role set into.

use crate::storage::Storage;
use crate::types::{Identity, Role, RoleSet};
use crate::{Error, Result};
use std::sync::Arc;

/// Read access to committed role assignments
#[derive(Debug, Clone)]
pub struct RoleStore {
    storage: Arc<Storage>,
}

impl RoleStore {
    /// Wrap storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// All roles held by `identity`
    pub fn roles_of(&self, identity: &Identity) -> Result<RoleSet> {
        if identity.is_zero() {
            return Ok(RoleSet::EMPTY);
        }
        self.storage.get_roles(identity)
    }

    /// Membership test for one role
    pub fn has_role(&self, identity: &Identity, role: Role) -> Result<bool> {
        Ok(self.roles_of(identity)?.contains(role))
    }

    /// True if `identity` holds Admin
    pub fn is_admin(&self, identity: &Identity) -> Result<bool> {
        self.has_role(identity, Role::Admin)
    }

    /// True if `identity` holds Issuer
    pub fn is_issuer(&self, identity: &Identity) -> Result<bool> {
        self.has_role(identity, Role::Issuer)
    }
}

/// Outcome of applying a role change to a current set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTransition {
    /// Set before the change
    pub before: RoleSet,
    /// Set after the change
    pub after: RoleSet,
}

impl RoleTransition {
    /// False when the change is a no-op
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

fn check_target(target: &Identity) -> Result<()> {
    if target.is_zero() {
        return Err(Error::InvalidInput(
            "role target must not be the zero identity".to_string(),
        ));
    }
    Ok(())
}

/// Add Issuer to `current` (idempotent)
pub fn grant_issuer(target: &Identity, current: RoleSet) -> Result<RoleTransition> {
    check_target(target)?;
    Ok(RoleTransition {
        before: current,
        after: current.with(Role::Issuer),
    })
}

/// Remove Issuer from `current` (idempotent). Admin is never touched.
pub fn revoke_issuer(target: &Identity, current: RoleSet) -> Result<RoleTransition> {
    check_target(target)?;
    Ok(RoleTransition {
        before: current,
        after: current.without(Role::Issuer),
    })
}
