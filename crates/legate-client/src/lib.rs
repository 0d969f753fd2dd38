//! Thread-scoped context selection and identity delegation for remote
//! invocations.
//!
//! Two pieces cooperate here:
//!
//! - the [`ScopedContextSelector`](selector::ScopedContextSelector) lets each
//!   thread choose which invocation context its outbound calls use, with a
//!   shared default for threads that never opt in
//! - the delegation machinery ([`DelegationGuard`](delegation::DelegationGuard),
//!   [`run_as`](delegation::run_as), and the connection
//!   [`binding`](binding) accessors) swaps the thread's ambient identity for
//!   the duration of a bracket and guarantees the displaced context comes
//!   back, behind a single privilege boundary
//!
//! All mutable state is thread-confined. Handles ([`RemoteInvoker`](invoker::RemoteInvoker),
//! the selector) are cheap to clone and safe to share; what a call observes
//! depends only on the calling thread's own registrations, scope, and
//! brackets.
//!
//! ```rust,ignore
//! let selector = ScopedContextSelector::from_config(&default_config)?;
//! selector.register_config(ScopeToken::from("alice"), &alice_config)?;
//! selector.set_current_scope(ScopeToken::from("alice"))?;
//! let response = invoker.invoke(InvocationEnvelope::new("ledger/read"))?;
//! selector.clear_current_scope();
//! selector.unregister_all();
//! ```

#![forbid(unsafe_code)]

pub mod binding;
pub mod delegation;
pub mod interceptor;
pub mod invoker;
pub mod privilege;
pub mod selector;

pub use binding::{
    bind_connection, clear_connection_binding, connection_binding_is_set,
    read_connection_binding, ConnectionGuard,
};
pub use delegation::{
    current_identity, restore_identity, run_as, set_ambient_context, swap_identity,
    DelegationGuard, PriorContext,
};
pub use interceptor::{
    ClientInterceptor, InterceptorChain, SecurityInterceptor, SECURITY_INTERCEPTOR_ORDER,
};
pub use invoker::{InvocationTransport, InvokeError, RemoteInvoker};
pub use privilege::{install_policy, policy_installed, AmbientOp, PrivilegePolicy};
pub use selector::{ScopeToken, ScopedContextSelector};

pub use legate_core::{
    ConnectionBinding, ContextConfig, ContextError, ContextResult, Credential, DelegationError,
    DelegationResult, IdentityOrigin, InvocationContext, InvocationEnvelope, InvocationResponse,
    Principal, SecurityContext, SecurityIdentity,
};
