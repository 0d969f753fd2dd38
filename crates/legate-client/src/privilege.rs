//! Privilege boundary for ambient security state.
//!
//! Every read or write of the thread's ambient security context or connection
//! binding funnels through [`elevate`], which consults the process-wide
//! [`PrivilegePolicy`] if one is installed. A successful check yields an
//! [`AmbientAccess`] proof; the modules owning ambient state require that
//! proof, so there is exactly one place where access can be refused.
//!
//! With no policy installed, access is granted without ceremony. Embedders
//! that sandbox plugin or tenant code install a policy once at startup;
//! [`install_policy`] is first-write-wins and the policy is never replaced.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use legate_core::{DelegationError, DelegationResult};

/// Ambient-state operations subject to the privilege check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmbientOp {
    /// Read the thread's ambient security context.
    ReadIdentity,
    /// Install or replace the thread's ambient security context.
    SwapIdentity,
    /// Read the thread's connection binding.
    ReadConnection,
    /// Install the thread's connection binding.
    BindConnection,
    /// Clear the thread's connection binding.
    ClearConnection,
}

impl AmbientOp {
    /// Stable name used in errors and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadIdentity => "read-identity",
            Self::SwapIdentity => "swap-identity",
            Self::ReadConnection => "read-connection",
            Self::BindConnection => "bind-connection",
            Self::ClearConnection => "clear-connection",
        }
    }
}

impl fmt::Display for AmbientOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide policy consulted before any ambient-state access.
///
/// Implementations return `Err` with a human-readable reason to refuse the
/// operation for the calling thread.
pub trait PrivilegePolicy: Send + Sync {
    /// Decide whether the calling thread may perform `op`.
    fn check(&self, op: AmbientOp) -> Result<(), String>;
}

/// Proof that the privilege check passed for one ambient access.
///
/// The only way to obtain one is a successful check, and it is consumed by
/// the access it authorizes. Guards capture their proof at bracket entry, so
/// the restore half of a bracket can never be refused.
#[derive(Debug)]
pub struct AmbientAccess {
    _private: (),
}

static POLICY: OnceCell<Arc<dyn PrivilegePolicy>> = OnceCell::new();

/// Install the process-wide privilege policy.
///
/// Returns `false` if a policy was already installed; the existing policy is
/// kept. There is deliberately no way to remove or replace a policy: code
/// running after installation can never escape it.
pub fn install_policy(policy: Arc<dyn PrivilegePolicy>) -> bool {
    let installed = POLICY.set(policy).is_ok();
    if installed {
        tracing::debug!("privilege policy installed");
    } else {
        tracing::warn!("privilege policy already installed; keeping the existing one");
    }
    installed
}

/// Whether a privilege policy has been installed.
#[must_use]
pub fn policy_installed() -> bool {
    POLICY.get().is_some()
}

/// Run the privilege check for `op`, producing the access proof.
pub(crate) fn elevate(op: AmbientOp) -> DelegationResult<AmbientAccess> {
    if let Some(policy) = POLICY.get() {
        policy.check(op).map_err(|reason| {
            tracing::warn!(op = %op, %reason, "ambient access denied");
            DelegationError::PrivilegeDenied {
                operation: op.as_str().to_string(),
                reason,
            }
        })?;
    }
    Ok(AmbientAccess { _private: () })
}
