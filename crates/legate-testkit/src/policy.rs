//! Declarative operation-level access policy, and the errors the in-memory
//! enforcement point raises.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use legate_core::{Principal, RoleSet};

/// Failures raised by the in-memory enforcement point.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// The principal is not in the directory.
    #[error("unknown principal `{principal}`")]
    UnknownPrincipal {
        /// The principal that failed to authenticate.
        principal: String,
    },

    /// The credential did not match the directory's record.
    #[error("authentication failed for principal `{principal}`")]
    BadCredentials {
        /// The principal that failed to authenticate.
        principal: String,
    },

    /// The connection user holds no grant covering the requested identity.
    #[error("principal `{from}` may not run calls as `{to}`")]
    DelegationNotPermitted {
        /// The authenticated connection user.
        from: String,
        /// The identity the call asked for.
        to: String,
    },

    /// The effective caller's roles do not satisfy the operation's policy.
    #[error("access to operation `{operation}` denied for principal `{principal}`")]
    AccessDenied {
        /// The operation that was refused.
        operation: String,
        /// The effective caller.
        principal: String,
    },
}

/// Access policy for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Any authenticated caller may invoke the operation.
    PermitAll,
    /// Nobody may invoke the operation.
    DenyAll,
    /// Only callers holding at least one of the listed roles.
    RolesAllowed(HashSet<String>),
}

impl AccessPolicy {
    /// Policy allowing the listed roles.
    #[must_use]
    pub fn roles(roles: &[&str]) -> Self {
        Self::RolesAllowed(roles.iter().map(|role| (*role).to_string()).collect())
    }
}

/// Operation name -> policy table.
///
/// Operations without an entry are denied: the table is closed by default,
/// so a test that forgets to declare a policy fails loudly instead of
/// passing against an accidental permit.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, AccessPolicy>,
}

impl PolicyTable {
    /// An empty table denying every operation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the policy for `operation`.
    #[must_use]
    pub fn with_operation(mut self, operation: &str, policy: AccessPolicy) -> Self {
        self.policies.insert(operation.to_string(), policy);
        self
    }

    /// The declared policy for `operation`, if any.
    #[must_use]
    pub fn policy_for(&self, operation: &str) -> Option<&AccessPolicy> {
        self.policies.get(operation)
    }

    /// Check whether `principal`, holding `roles`, may invoke `operation`.
    pub fn check(
        &self,
        operation: &str,
        principal: &Principal,
        roles: &RoleSet,
    ) -> Result<(), AccessError> {
        let denied = || AccessError::AccessDenied {
            operation: operation.to_string(),
            principal: principal.to_string(),
        };
        match self.policies.get(operation) {
            Some(AccessPolicy::PermitAll) => Ok(()),
            Some(AccessPolicy::DenyAll) | None => Err(denied()),
            Some(AccessPolicy::RolesAllowed(allowed)) => {
                if allowed.iter().any(|role| roles.contains(role)) {
                    Ok(())
                } else {
                    Err(denied())
                }
            }
        }
    }
}
