//! Test utilities for the legate crates.
//!
//! Provides the collaborators production code is deliberately missing: an
//! in-memory [`InMemoryServer`] enforcement point with a [`UserDirectory`]
//! and a declarative [`PolicyTable`], plus fixtures wiring a secured
//! invoker against it. Mocks and fixtures live here, never in the
//! production crates.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod directory;
pub mod policy;
pub mod server;

pub use directory::{DelegationGrant, UserDirectory};
pub use policy::{AccessError, AccessPolicy, PolicyTable};
pub use server::{HandledCall, InMemoryServer};

use std::sync::Arc;

use legate_client::interceptor::{SecurityInterceptor, SECURITY_INTERCEPTOR_ORDER};
use legate_client::invoker::RemoteInvoker;
use legate_client::selector::ScopedContextSelector;
use legate_core::ContextConfig;

/// Initialise fmt tracing for tests; safe to call repeatedly.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The configuration bundle a test client uses to reach the in-memory
/// server as `user`.
#[must_use]
pub fn connection_config(user: &str, password: &str) -> ContextConfig {
    ContextConfig::for_connection(user, "localhost", 4447, user, password)
}

/// A directory of ledger-service users: auditors read, treasurers write,
/// and `alice` may run calls as `bob`.
#[must_use]
pub fn ledger_directory() -> UserDirectory {
    UserDirectory::new()
        .with_user("alice", "alicePwd1!", &["auditor"])
        .with_user("bob", "bobPwd1!", &["treasurer"])
        .with_user("carol", "carolPwd1!", &["auditor"])
        .with_user("dave", "davePwd1!", &["treasurer"])
        .with_delegation("alice", "bob")
}

/// Policies for the ledger service operations.
#[must_use]
pub fn ledger_policies() -> PolicyTable {
    PolicyTable::new()
        .with_operation("ping", AccessPolicy::PermitAll)
        .with_operation("ledger/read", AccessPolicy::roles(&["auditor"]))
        .with_operation("ledger/write", AccessPolicy::roles(&["treasurer"]))
        .with_operation("maintenance/reset", AccessPolicy::DenyAll)
}

/// An in-memory ledger server over [`ledger_directory`] and
/// [`ledger_policies`].
#[must_use]
pub fn ledger_server() -> Arc<InMemoryServer> {
    Arc::new(InMemoryServer::new(ledger_directory(), ledger_policies()))
}

/// An invoker dispatching to `server` with the security interceptor
/// registered, defaulting to the connection described by `default_config`.
pub fn secured_invoker(
    server: &Arc<InMemoryServer>,
    default_config: &ContextConfig,
) -> RemoteInvoker<Arc<InMemoryServer>> {
    let selector = ScopedContextSelector::from_config(default_config)
        .expect("test configuration must build");
    let mut invoker = RemoteInvoker::new(selector, Arc::clone(server));
    invoker.register_interceptor(SECURITY_INTERCEPTOR_ORDER, Arc::new(SecurityInterceptor::new()));
    invoker
}
