//! Client-side interceptor chain for outbound invocations.
//!
//! Interceptors see every envelope after context resolution and before
//! dispatch, in ascending order of their registration order value. The
//! stock [`SecurityInterceptor`] stamps the calling thread's desired
//! identity onto the envelope so the remote enforcement point can decide
//! whether to honor the delegation.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use legate_core::{InvocationEnvelope, Principal, DELEGATED_IDENTITY_ATTACHMENT};

/// Hook invoked over each outbound envelope before dispatch.
pub trait ClientInterceptor: Send + Sync {
    /// Inspect or amend `envelope` before it is handed to the transport.
    fn handle_invocation(&self, envelope: &mut InvocationEnvelope);
}

/// Chain position for [`SecurityInterceptor`], late enough that application
/// interceptors using small order values run first.
pub const SECURITY_INTERCEPTOR_ORDER: i32 = 0x0009_9999;

/// Ordered chain of client interceptors.
///
/// Lower order values run earlier; interceptors registered with the same
/// order run in registration order.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    entries: Vec<(i32, Arc<dyn ClientInterceptor>)>,
}

impl InterceptorChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `interceptor` at `order`.
    pub fn register(&mut self, order: i32, interceptor: Arc<dyn ClientInterceptor>) {
        let at = self.entries.partition_point(|(existing, _)| *existing <= order);
        self.entries.insert(at, (order, interceptor));
    }

    /// How many interceptors are registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every interceptor over `envelope`, in order.
    pub fn apply(&self, envelope: &mut InvocationEnvelope) {
        for (_, interceptor) in &self.entries {
            interceptor.handle_invocation(envelope);
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let orders: Vec<i32> = self.entries.iter().map(|(order, _)| *order).collect();
        f.debug_struct("InterceptorChain")
            .field("orders", &orders)
            .finish()
    }
}

thread_local! {
    static DESIRED_IDENTITY: RefCell<Option<Principal>> = const { RefCell::new(None) };
}

/// Stamps the calling thread's desired identity onto outbound envelopes.
///
/// The desired identity is thread-confined, like everything else ambient in
/// this crate: one worker asking to act as another principal never affects
/// its neighbors. The stamp is advisory; the enforcement point checks the
/// connection identity's delegation grants before honoring it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityInterceptor;

impl SecurityInterceptor {
    /// Create the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Ask that subsequent calls from this thread present `principal`.
    pub fn set_desired_identity(principal: Principal) {
        tracing::debug!(principal = %principal, "setting desired identity");
        DESIRED_IDENTITY.with(|cell| *cell.borrow_mut() = Some(principal));
    }

    /// Stop requesting delegation for this thread's calls. Idempotent.
    pub fn clear_desired_identity() {
        DESIRED_IDENTITY.with(|cell| *cell.borrow_mut() = None);
    }

    /// The identity this thread currently asks calls to present, if any.
    #[must_use]
    pub fn desired_identity() -> Option<Principal> {
        DESIRED_IDENTITY.with(|cell| cell.borrow().clone())
    }
}

impl ClientInterceptor for SecurityInterceptor {
    fn handle_invocation(&self, envelope: &mut InvocationEnvelope) {
        if let Some(principal) = Self::desired_identity() {
            tracing::trace!(
                principal = %principal,
                operation = envelope.operation(),
                "stamping delegated identity"
            );
            envelope.attach(DELEGATED_IDENTITY_ATTACHMENT, principal.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagger(&'static str);

    impl ClientInterceptor for Tagger {
        fn handle_invocation(&self, envelope: &mut InvocationEnvelope) {
            let mut trail = envelope.attachment("trail").unwrap_or("").to_string();
            trail.push_str(self.0);
            envelope.attach("trail", trail);
        }
    }

    #[test]
    fn test_chain_runs_in_ascending_order() {
        let mut chain = InterceptorChain::new();
        chain.register(10, Arc::new(Tagger("b")));
        chain.register(0, Arc::new(Tagger("a")));
        chain.register(SECURITY_INTERCEPTOR_ORDER, Arc::new(Tagger("c")));

        let mut envelope = InvocationEnvelope::new("ping");
        chain.apply(&mut envelope);
        assert_eq!(envelope.attachment("trail"), Some("abc"));
    }

    #[test]
    fn test_equal_orders_run_in_registration_order() {
        let mut chain = InterceptorChain::new();
        chain.register(5, Arc::new(Tagger("x")));
        chain.register(5, Arc::new(Tagger("y")));

        let mut envelope = InvocationEnvelope::new("ping");
        chain.apply(&mut envelope);
        assert_eq!(envelope.attachment("trail"), Some("xy"));
    }

    #[test]
    fn test_security_interceptor_stamps_only_when_identity_desired() {
        SecurityInterceptor::clear_desired_identity();
        let interceptor = SecurityInterceptor::new();

        let mut envelope = InvocationEnvelope::new("whoami");
        interceptor.handle_invocation(&mut envelope);
        assert_eq!(envelope.delegated_identity(), None);

        SecurityInterceptor::set_desired_identity(Principal::new("bob"));
        let mut envelope = InvocationEnvelope::new("whoami");
        interceptor.handle_invocation(&mut envelope);
        assert_eq!(envelope.delegated_identity(), Some("bob"));

        SecurityInterceptor::clear_desired_identity();
        let mut envelope = InvocationEnvelope::new("whoami");
        interceptor.handle_invocation(&mut envelope);
        assert_eq!(envelope.delegated_identity(), None);
    }

    #[test]
    fn test_desired_identity_is_thread_confined() {
        SecurityInterceptor::clear_desired_identity();
        SecurityInterceptor::set_desired_identity(Principal::new("bob"));
        let other = std::thread::spawn(SecurityInterceptor::desired_identity)
            .join()
            .unwrap();
        assert!(other.is_none());
        SecurityInterceptor::clear_desired_identity();
    }
}
