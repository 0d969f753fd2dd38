//! Thread-scoped selection of invocation contexts.
//!
//! One process often needs to issue remote calls under several different
//! identities at once, from different threads. The selector answers the
//! question "which invocation context should the calling thread's next call
//! use?" without any cross-thread coordination:
//!
//! - each thread owns a private registry of scope token -> context entries
//!   and a private current-scope marker, both in thread-local storage
//! - the only cross-thread state is the immutable default context shared
//!   behind `Arc`
//!
//! No lock is taken anywhere on the resolution path. A thread that never
//! touches scopes transparently resolves to the default context; a thread
//! that sets a scope gets exactly the context it registered for that scope,
//! or an error if the scope is dangling. Falling back to the default for a
//! dangling scope would silently issue calls under the wrong identity, so
//! resolution refuses instead.
//!
//! Registrations are keyed per thread: registering a scope on one thread
//! says nothing about any other thread, and worker threads are expected to
//! clean up with [`ScopedContextSelector::unregister_all`] before being
//! returned to a pool.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use legate_core::{ContextConfig, ContextError, ContextResult, InvocationContext};

/// Caller-chosen key naming which registered context a thread wants.
///
/// Tokens are opaque: the selector only ever compares them. Cloning is cheap;
/// the text is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeToken(Arc<str>);

impl ScopeToken {
    /// Create a scope token.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// The token's text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

thread_local! {
    static SCOPED_CONTEXTS: RefCell<HashMap<ScopeToken, Arc<InvocationContext>>> =
        RefCell::new(HashMap::new());
    static CURRENT_SCOPE: RefCell<Option<ScopeToken>> = const { RefCell::new(None) };
}

/// Process-wide selector of thread-scoped invocation contexts.
///
/// The selector itself is a cheap handle: it carries only the shared default
/// context. The mutable registry and current-scope marker are thread-local,
/// so handles can be cloned freely across threads and all handles observe
/// the same per-thread scope state.
#[derive(Debug, Clone)]
pub struct ScopedContextSelector {
    default_context: Arc<InvocationContext>,
}

impl ScopedContextSelector {
    /// Create a selector with `default_context` as the fallback for threads
    /// that have no current scope.
    #[must_use]
    pub fn new(default_context: Arc<InvocationContext>) -> Self {
        Self { default_context }
    }

    /// Build the default context from a configuration bundle.
    pub fn from_config(config: &ContextConfig) -> ContextResult<Self> {
        Ok(Self::new(Arc::new(config.build_context()?)))
    }

    /// The fallback context used by threads with no current scope.
    #[must_use]
    pub fn default_context(&self) -> &Arc<InvocationContext> {
        &self.default_context
    }

    /// Mark `token` as the calling thread's active scope.
    ///
    /// No registry check happens here: the scope may be set before or after
    /// the matching registration, and resolution is where a dangling scope
    /// is discovered.
    pub fn set_current_scope(&self, token: ScopeToken) -> ContextResult<()> {
        Self::validate(&token)?;
        tracing::debug!(scope = %token, "setting current scope");
        CURRENT_SCOPE.with(|cell| *cell.borrow_mut() = Some(token));
        Ok(())
    }

    /// Remove the calling thread's active-scope marker. Idempotent.
    ///
    /// Subsequent resolutions fall back to the default context. Registered
    /// contexts are untouched.
    pub fn clear_current_scope(&self) {
        CURRENT_SCOPE.with(|cell| {
            if cell.borrow_mut().take().is_some() {
                tracing::debug!("cleared current scope");
            }
        });
    }

    /// The calling thread's active scope, if any.
    #[must_use]
    pub fn current_scope(&self) -> Option<ScopeToken> {
        CURRENT_SCOPE.with(|cell| cell.borrow().clone())
    }

    /// Register `context` under `token` on the calling thread.
    ///
    /// At most one context per token per thread: a second registration for
    /// the same token is rejected with [`ContextError::DuplicateScope`]
    /// rather than silently replacing the first.
    pub fn register_context(
        &self,
        token: ScopeToken,
        context: Arc<InvocationContext>,
    ) -> ContextResult<()> {
        Self::validate(&token)?;
        SCOPED_CONTEXTS.with(|cell| {
            let mut registry = cell.borrow_mut();
            if registry.contains_key(&token) {
                return Err(ContextError::DuplicateScope {
                    scope: token.to_string(),
                });
            }
            tracing::debug!(scope = %token, context = %context.id(), "registered scoped context");
            registry.insert(token, context);
            Ok(())
        })
    }

    /// Build a context from `config` and register it under `token`.
    ///
    /// The token is validated before construction is attempted, and a
    /// construction failure registers nothing.
    pub fn register_config(&self, token: ScopeToken, config: &ContextConfig) -> ContextResult<()> {
        Self::validate(&token)?;
        let context = Arc::new(config.build_context()?);
        self.register_context(token, context)
    }

    /// Discard every context registered by the calling thread. Idempotent.
    ///
    /// Deliberately not selective: the cleanup points that call this (worker
    /// teardown, thread-pool return) want a clean slate, not bookkeeping.
    /// The current-scope marker is left alone; a scope that remains set
    /// afterwards is dangling and will fail resolution.
    pub fn unregister_all(&self) {
        SCOPED_CONTEXTS.with(|cell| {
            let mut registry = cell.borrow_mut();
            if !registry.is_empty() {
                tracing::debug!(scopes = registry.len(), "unregistered all scoped contexts");
                registry.clear();
            }
        });
    }

    /// Resolve the invocation context the calling thread should use now.
    ///
    /// With no current scope this is the default context. With a current
    /// scope it is exactly the context registered under that scope on this
    /// thread; a dangling scope is an error, never a silent fallback.
    pub fn resolve_current(&self) -> ContextResult<Arc<InvocationContext>> {
        match self.current_scope() {
            None => Ok(Arc::clone(&self.default_context)),
            Some(token) => SCOPED_CONTEXTS.with(|cell| {
                cell.borrow().get(&token).cloned().ok_or_else(|| {
                    tracing::warn!(scope = %token, "current scope has no registered context");
                    ContextError::UnresolvedScope {
                        scope: token.to_string(),
                    }
                })
            }),
        }
    }

    fn validate(token: &ScopeToken) -> ContextResult<()> {
        if token.as_str().is_empty() {
            return Err(ContextError::InvalidScope {
                reason: "scope token must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use legate_core::{Endpoint, SecurityIdentity};

    use super::*;

    fn context_for(user: &str) -> Arc<InvocationContext> {
        Arc::new(InvocationContext::new(
            user,
            Endpoint::new("localhost", 4447),
            SecurityIdentity::from_password(user, "pwd"),
        ))
    }

    fn fresh_selector() -> ScopedContextSelector {
        let selector = ScopedContextSelector::new(context_for("default"));
        // Thread-local state can survive from an earlier test on this thread.
        selector.clear_current_scope();
        selector.unregister_all();
        selector
    }

    #[test]
    fn test_resolution_uses_the_registered_context_for_the_current_scope() {
        let selector = fresh_selector();
        let alice = context_for("alice");
        let bob = context_for("bob");
        selector
            .register_context(ScopeToken::from("alice"), Arc::clone(&alice))
            .unwrap();
        selector
            .register_context(ScopeToken::from("bob"), Arc::clone(&bob))
            .unwrap();

        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        assert_eq!(selector.resolve_current().unwrap().id(), alice.id());

        selector.set_current_scope(ScopeToken::from("bob")).unwrap();
        assert_eq!(selector.resolve_current().unwrap().id(), bob.id());
    }

    #[test]
    fn test_no_scope_falls_back_to_the_default_context() {
        let selector = fresh_selector();
        let resolved = selector.resolve_current().unwrap();
        assert_eq!(resolved.id(), selector.default_context().id());
    }

    #[test]
    fn test_scope_may_be_set_before_registration() {
        let selector = fresh_selector();
        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        let alice = context_for("alice");
        selector
            .register_context(ScopeToken::from("alice"), Arc::clone(&alice))
            .unwrap();
        assert_eq!(selector.resolve_current().unwrap().id(), alice.id());
    }

    #[test]
    fn test_dangling_scope_fails_resolution_instead_of_falling_back() {
        let selector = fresh_selector();
        selector.set_current_scope(ScopeToken::from("ghost")).unwrap();
        assert_matches!(
            selector.resolve_current(),
            Err(ContextError::UnresolvedScope { scope }) if scope == "ghost"
        );
    }

    #[test]
    fn test_unregister_all_leaves_the_current_scope_dangling() {
        let selector = fresh_selector();
        selector
            .register_context(ScopeToken::from("alice"), context_for("alice"))
            .unwrap();
        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        assert!(selector.resolve_current().is_ok());

        selector.unregister_all();
        assert_matches!(
            selector.resolve_current(),
            Err(ContextError::UnresolvedScope { .. })
        );

        // Clearing the scope restores default resolution.
        selector.clear_current_scope();
        assert_eq!(
            selector.resolve_current().unwrap().id(),
            selector.default_context().id()
        );
    }

    #[test]
    fn test_duplicate_registration_is_rejected_and_keeps_the_original() {
        let selector = fresh_selector();
        let first = context_for("alice");
        selector
            .register_context(ScopeToken::from("alice"), Arc::clone(&first))
            .unwrap();
        let err = selector
            .register_context(ScopeToken::from("alice"), context_for("impostor"))
            .unwrap_err();
        assert_matches!(err, ContextError::DuplicateScope { scope } if scope == "alice");

        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        assert_eq!(selector.resolve_current().unwrap().id(), first.id());
    }

    #[test]
    fn test_empty_token_is_rejected_everywhere() {
        let selector = fresh_selector();
        let empty = ScopeToken::from("");
        assert_matches!(
            selector.set_current_scope(empty.clone()),
            Err(ContextError::InvalidScope { .. })
        );
        assert_matches!(
            selector.register_context(empty.clone(), context_for("x")),
            Err(ContextError::InvalidScope { .. })
        );
        assert_matches!(
            selector.register_config(empty, &ContextConfig::new()),
            Err(ContextError::InvalidScope { .. })
        );
    }

    #[test]
    fn test_clear_current_scope_is_idempotent() {
        let selector = fresh_selector();
        selector.clear_current_scope();
        selector.clear_current_scope();
        assert!(selector.current_scope().is_none());
    }

    #[test]
    fn test_unregister_all_is_idempotent() {
        let selector = fresh_selector();
        selector.unregister_all();
        selector.unregister_all();
        assert!(selector.resolve_current().is_ok());
    }

    #[test]
    fn test_register_config_builds_and_registers() {
        let selector = fresh_selector();
        let config =
            ContextConfig::for_connection("alice", "localhost", 4447, "alice", "alicePwd1!");
        selector
            .register_config(ScopeToken::from("alice"), &config)
            .unwrap();
        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        let resolved = selector.resolve_current().unwrap();
        assert_eq!(resolved.identity().principal().name(), "alice");
    }

    #[test]
    fn test_register_config_propagates_construction_failure() {
        let selector = fresh_selector();
        let config = ContextConfig::new();
        assert_matches!(
            selector.register_config(ScopeToken::from("alice"), &config),
            Err(ContextError::ContextConstruction { .. })
        );
        // Nothing was registered.
        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        assert_matches!(
            selector.resolve_current(),
            Err(ContextError::UnresolvedScope { .. })
        );
    }

    #[test]
    fn test_scope_lifecycle_from_registration_to_teardown() {
        let selector = fresh_selector();
        let alice = context_for("alice");
        let bob = context_for("bob");
        selector
            .register_context(ScopeToken::from("alice"), Arc::clone(&alice))
            .unwrap();
        selector
            .register_context(ScopeToken::from("bob"), Arc::clone(&bob))
            .unwrap();

        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        assert_eq!(selector.resolve_current().unwrap().id(), alice.id());

        selector.set_current_scope(ScopeToken::from("bob")).unwrap();
        assert_eq!(selector.resolve_current().unwrap().id(), bob.id());

        selector.clear_current_scope();
        assert_eq!(
            selector.resolve_current().unwrap().id(),
            selector.default_context().id()
        );

        selector.unregister_all();
        selector.set_current_scope(ScopeToken::from("alice")).unwrap();
        assert_matches!(
            selector.resolve_current(),
            Err(ContextError::UnresolvedScope { scope }) if scope == "alice"
        );
    }

    #[test]
    fn test_same_token_on_two_threads_resolves_to_each_threads_context() {
        let selector = fresh_selector();
        let token = ScopeToken::from("shared-name");
        let mine = context_for("mine");
        selector
            .register_context(token.clone(), Arc::clone(&mine))
            .unwrap();
        selector.set_current_scope(token.clone()).unwrap();

        let sibling = selector.clone();
        let theirs_id = std::thread::spawn(move || {
            let theirs = context_for("theirs");
            sibling
                .register_context(token.clone(), Arc::clone(&theirs))
                .unwrap();
            sibling.set_current_scope(token).unwrap();
            let resolved = sibling.resolve_current().unwrap();
            assert_eq!(resolved.id(), theirs.id());
            resolved.id()
        })
        .join()
        .unwrap();

        let mine_id = selector.resolve_current().unwrap().id();
        assert_ne!(mine_id, theirs_id);
        assert_eq!(mine_id, mine.id());
    }

    #[test]
    fn test_registrations_are_thread_confined() {
        let selector = fresh_selector();
        selector
            .register_context(ScopeToken::from("alice"), context_for("alice"))
            .unwrap();
        selector.set_current_scope(ScopeToken::from("alice")).unwrap();

        let sibling = selector.clone();
        let outcome = std::thread::spawn(move || {
            // The sibling handle shares the default, not the registry.
            assert!(sibling.current_scope().is_none());
            sibling.set_current_scope(ScopeToken::from("alice")).unwrap();
            sibling.resolve_current()
        })
        .join()
        .unwrap();
        assert_matches!(outcome, Err(ContextError::UnresolvedScope { .. }));

        // This thread's registration is untouched.
        assert!(selector.resolve_current().is_ok());
    }
}
