//! A user directory fixture: who exists, what they can prove, what roles
//! they hold, and who they may delegate to.

use std::collections::{HashMap, HashSet};

use legate_core::{Credential, Principal, RoleSet, SecurityIdentity};

use crate::policy::AccessError;

/// What a principal may delegate as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationGrant {
    /// May run calls as any registered principal.
    Any,
    /// May run calls only as the listed principals.
    To(HashSet<Principal>),
}

#[derive(Debug, Clone)]
struct UserRecord {
    credential: Credential,
    roles: RoleSet,
}

/// In-memory registry of users, roles, and delegation grants.
///
/// Built once per test with the `with_*` builders, then consulted by the
/// in-memory server for authentication, role lookup, and delegation
/// decisions.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<Principal, UserRecord>,
    grants: HashMap<Principal, DelegationGrant>,
}

impl UserDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with a password and roles.
    #[must_use]
    pub fn with_user(mut self, name: &str, password: &str, roles: &[&str]) -> Self {
        self.users.insert(
            Principal::new(name),
            UserRecord {
                credential: Credential::from_password(password),
                roles: roles.iter().map(|role| (*role).to_string()).collect(),
            },
        );
        self
    }

    /// Allow `from` to run calls as any registered principal.
    #[must_use]
    pub fn with_delegation_any(mut self, from: &str) -> Self {
        self.grants.insert(Principal::new(from), DelegationGrant::Any);
        self
    }

    /// Allow `from` to run calls as `to`, in addition to earlier grants.
    #[must_use]
    pub fn with_delegation(mut self, from: &str, to: &str) -> Self {
        let from = Principal::new(from);
        let to = Principal::new(to);
        match self.grants.entry(from) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if let DelegationGrant::To(targets) = entry.get_mut() {
                    targets.insert(to);
                }
                // An existing Any grant already covers `to`.
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(DelegationGrant::To(HashSet::from([to])));
            }
        }
        self
    }

    /// Verify an identity against the directory.
    ///
    /// Credential comparison is constant-time; unknown principals and wrong
    /// passwords are reported distinctly so tests can assert on the cause.
    pub fn authenticate(&self, identity: &SecurityIdentity) -> Result<(), AccessError> {
        let record = self.users.get(identity.principal()).ok_or_else(|| {
            AccessError::UnknownPrincipal {
                principal: identity.principal().to_string(),
            }
        })?;
        if &record.credential != identity.credential() {
            return Err(AccessError::BadCredentials {
                principal: identity.principal().to_string(),
            });
        }
        Ok(())
    }

    /// The roles granted to `principal`, if the principal exists.
    #[must_use]
    pub fn roles_of(&self, principal: &Principal) -> Option<&RoleSet> {
        self.users.get(principal).map(|record| &record.roles)
    }

    /// Whether `from` may run calls as `to`.
    ///
    /// Delegating to an unregistered principal is never allowed, even under
    /// an `Any` grant.
    #[must_use]
    pub fn may_delegate(&self, from: &Principal, to: &Principal) -> bool {
        if !self.users.contains_key(to) {
            return false;
        }
        match self.grants.get(from) {
            Some(DelegationGrant::Any) => true,
            Some(DelegationGrant::To(targets)) => targets.contains(to),
            None => false,
        }
    }
}
