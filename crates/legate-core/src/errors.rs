//! Error taxonomy shared by the selector, the delegation guard, and the
//! configuration layer.
//!
//! Selector and configuration failures surface as [`ContextError`]; failures
//! at the ambient-state privilege boundary surface as [`DelegationError`].
//! Both are plain data so callers can match on the variant and carry them
//! across threads.

use thiserror::Error;

/// Errors raised by scoped-context registration, resolution, and context
/// construction from configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// A scope token was unusable, e.g. empty.
    #[error("invalid scope token: {reason}")]
    InvalidScope {
        /// What made the token unusable.
        reason: String,
    },

    /// A context is already registered for the scope on the calling thread.
    ///
    /// Re-registration is rejected rather than silently replacing the
    /// earlier context; the caller must unregister first.
    #[error("an invocation context is already registered for scope `{scope}` on this thread")]
    DuplicateScope {
        /// The scope that was already taken.
        scope: String,
    },

    /// An invocation context could not be built from its configuration.
    #[error("invocation context construction failed: {reason}")]
    ContextConstruction {
        /// The missing or malformed setting.
        reason: String,
    },

    /// The calling thread's current scope has no registered context.
    ///
    /// A dangling scope never falls back to the default context: the thread
    /// asked for a specific scope, and answering with the default would
    /// silently issue calls under the wrong identity.
    #[error("scope `{scope}` has no invocation context registered on this thread")]
    UnresolvedScope {
        /// The scope that failed to resolve.
        scope: String,
    },
}

/// Errors raised at the privilege boundary guarding ambient security state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DelegationError {
    /// The installed privilege policy refused an ambient-state access.
    #[error("privilege denied for {operation}: {reason}")]
    PrivilegeDenied {
        /// The ambient operation that was attempted.
        operation: String,
        /// The policy's stated reason for refusing.
        reason: String,
    },
}

/// Result alias for selector and configuration operations.
pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Result alias for ambient-state operations.
pub type DelegationResult<T> = std::result::Result<T, DelegationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_scope() {
        let err = ContextError::DuplicateScope {
            scope: "alice".to_string(),
        };
        assert!(err.to_string().contains("`alice`"));

        let err = ContextError::UnresolvedScope {
            scope: "bob".to_string(),
        };
        assert!(err.to_string().contains("`bob`"));
    }

    #[test]
    fn test_privilege_denied_display_names_operation_and_reason() {
        let err = DelegationError::PrivilegeDenied {
            operation: "swap-identity".to_string(),
            reason: "untrusted caller".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("swap-identity"));
        assert!(rendered.contains("untrusted caller"));
    }
}
