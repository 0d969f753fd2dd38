//! Principals, credentials, and the security context a thread acts under.
//!
//! A [`SecurityIdentity`] pairs a [`Principal`] with the [`Credential`] that
//! proves it. Credential bytes are zeroized on drop, compared in constant
//! time, and never appear in `Debug` output, so identities can flow through
//! logs and error paths without leaking secrets.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The name an invocation claims to act as.
///
/// Principals are opaque to this crate; the remote enforcement point decides
/// what they mean.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The principal's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Principal {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Secret material proving a principal.
///
/// The bytes are wiped when the credential is dropped and equality runs in
/// constant time. `Debug` prints a redaction marker, never the secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential(Vec<u8>);

impl Credential {
    /// Create a credential from raw secret bytes.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Create a credential from a password string.
    #[must_use]
    pub fn from_password(password: &str) -> Self {
        Self(password.as_bytes().to_vec())
    }

    /// The secret bytes.
    ///
    /// Callers holding these bytes take over the hygiene obligations; avoid
    /// copying them into long-lived buffers.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Whether the credential is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Who an invocation acts as: a principal plus the credential proving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityIdentity {
    principal: Principal,
    credential: Credential,
}

impl SecurityIdentity {
    /// Pair a principal with its credential.
    #[must_use]
    pub fn new(principal: Principal, credential: Credential) -> Self {
        Self {
            principal,
            credential,
        }
    }

    /// Convenience constructor for username/password identities.
    #[must_use]
    pub fn from_password(name: &str, password: &str) -> Self {
        Self::new(Principal::new(name), Credential::from_password(password))
    }

    /// The claimed principal.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The credential proving the principal.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// How a thread's ambient security context came to be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityOrigin {
    /// The identity that authenticated this execution in the first place.
    PrimaryLogin,
    /// Installed by a delegation bracket for the duration of one swap.
    Delegation,
}

/// The security context associated with a thread of execution.
///
/// Distinguishing [`IdentityOrigin::Delegation`] from
/// [`IdentityOrigin::PrimaryLogin`] lets downstream layers treat a
/// temporarily assumed identity differently from the one that logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    identity: SecurityIdentity,
    origin: IdentityOrigin,
}

impl SecurityContext {
    /// A context established by the primary login pipeline.
    #[must_use]
    pub fn primary(identity: SecurityIdentity) -> Self {
        Self {
            identity,
            origin: IdentityOrigin::PrimaryLogin,
        }
    }

    /// A context installed by a delegation bracket.
    #[must_use]
    pub fn delegated(identity: SecurityIdentity) -> Self {
        Self {
            identity,
            origin: IdentityOrigin::Delegation,
        }
    }

    /// The identity this context carries.
    #[must_use]
    pub fn identity(&self) -> &SecurityIdentity {
        &self.identity
    }

    /// The principal this context acts as.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        self.identity.principal()
    }

    /// How the context was installed.
    #[must_use]
    pub fn origin(&self) -> IdentityOrigin {
        self.origin
    }

    /// Whether this context was installed by a delegation bracket.
    #[must_use]
    pub fn is_delegated(&self) -> bool {
        self.origin == IdentityOrigin::Delegation
    }
}

/// A set of role names, as granted to a principal by a user directory.
pub type RoleSet = HashSet<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_secret() {
        let credential = Credential::from_password("quickstartPwd1!");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("quickstartPwd1!"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_credential_equality_is_by_content() {
        let a = Credential::from_password("secret");
        let b = Credential::from_password("secret");
        let c = Credential::from_password("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_credentials_of_different_lengths_are_unequal() {
        let short = Credential::new(vec![1, 2]);
        let long = Credential::new(vec![1, 2, 3]);
        assert_ne!(short, long);
    }

    #[test]
    fn test_security_identity_debug_redacts_credential() {
        let identity = SecurityIdentity::from_password("alice", "alicePwd1!");
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("alicePwd1!"));
    }

    #[test]
    fn test_origin_distinguishes_delegated_contexts() {
        let identity = SecurityIdentity::from_password("bob", "pwd");
        let primary = SecurityContext::primary(identity.clone());
        let delegated = SecurityContext::delegated(identity);
        assert!(!primary.is_delegated());
        assert!(delegated.is_delegated());
        assert_eq!(primary.origin(), IdentityOrigin::PrimaryLogin);
        assert_eq!(delegated.origin(), IdentityOrigin::Delegation);
    }

    #[test]
    fn test_principal_display_is_the_name() {
        let principal = Principal::from("alice");
        assert_eq!(principal.to_string(), "alice");
        assert_eq!(principal.name(), "alice");
    }
}
