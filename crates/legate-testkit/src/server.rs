//! An in-memory enforcement point standing in for the remote container.
//!
//! The server authenticates the connection identity carried by the
//! invocation context, decides whether to honor a delegated-identity
//! attachment against the directory's grants, evaluates the operation's
//! access policy for the effective caller, and answers with who the call
//! actually ran as. It exercises the real ambient machinery: the arrival
//! connection is installed with [`bind_connection`] and honored delegations
//! run inside a real [`DelegationGuard`].
//!
//! Dispatch runs on the calling thread, so ambient state installed while a
//! call is handled is always unwound before the client regains control.

use parking_lot::RwLock;
use serde_json::json;

use legate_client::binding::{
    bind_connection, clear_connection_binding, read_connection_binding,
};
use legate_client::delegation::{current_identity, DelegationGuard};
use legate_client::invoker::InvocationTransport;
use legate_core::{
    ConnectionBinding, ConnectionId, Credential, InvocationContext, InvocationEnvelope,
    InvocationResponse, Principal, PINNED_CONNECTION_ATTACHMENT,
};

use crate::directory::UserDirectory;
use crate::policy::{AccessError, PolicyTable};

/// One invocation as observed by the enforcement point.
#[derive(Debug, Clone)]
pub struct HandledCall {
    /// The operation invoked.
    pub operation: String,
    /// The principal the call ran as.
    pub caller: Principal,
    /// Whether that principal came from a delegation rather than the
    /// connection identity.
    pub delegated: bool,
    /// The connection the client asked to pin the call to, if any.
    pub pinned: Option<String>,
}

/// In-memory server enforcing authentication, delegation grants, and
/// operation policies.
#[derive(Debug)]
pub struct InMemoryServer {
    directory: UserDirectory,
    policies: PolicyTable,
    journal: RwLock<Vec<HandledCall>>,
}

impl InMemoryServer {
    /// Create a server over a directory and a policy table.
    #[must_use]
    pub fn new(directory: UserDirectory, policies: PolicyTable) -> Self {
        Self {
            directory,
            policies,
            journal: RwLock::new(Vec::new()),
        }
    }

    /// Every call handled so far, in order.
    #[must_use]
    pub fn handled_calls(&self) -> Vec<HandledCall> {
        self.journal.read().clone()
    }

    /// Forget the journal.
    pub fn clear_journal(&self) {
        self.journal.write().clear();
    }

    fn authorize(&self, principal: &Principal, operation: &str) -> Result<(), AccessError> {
        let roles = self
            .directory
            .roles_of(principal)
            .ok_or_else(|| AccessError::UnknownPrincipal {
                principal: principal.to_string(),
            })?;
        self.policies.check(operation, principal, roles)
    }

    fn handle(
        &self,
        context: &InvocationContext,
        envelope: InvocationEnvelope,
    ) -> anyhow::Result<InvocationResponse> {
        self.directory.authenticate(context.identity())?;

        // The request "arrives over" a connection authenticated as the
        // context's identity; expose it the way a transport layer would.
        let arrival = ConnectionBinding::new(
            ConnectionId::new(),
            context.endpoint().clone(),
            context.identity().principal().clone(),
        );
        let _arrival_guard = bind_connection(arrival)?;
        let connection_user = read_connection_binding()?
            .ok_or_else(|| anyhow::anyhow!("connection binding missing during handling"))?
            .authenticated_as()
            .clone();

        let delegate = match envelope.delegated_identity() {
            Some(wanted) if wanted != connection_user.name() => {
                let wanted = Principal::new(wanted);
                if !self.directory.may_delegate(&connection_user, &wanted) {
                    tracing::warn!(
                        from = %connection_user,
                        to = %wanted,
                        "refusing delegation without a grant"
                    );
                    return Err(AccessError::DelegationNotPermitted {
                        from: connection_user.to_string(),
                        to: wanted.to_string(),
                    }
                    .into());
                }
                Some(wanted)
            }
            _ => None,
        };

        // The connection association has served the delegation decision;
        // the operation itself must not observe it.
        clear_connection_binding()?;

        let operation = envelope.operation().to_string();
        let pinned = envelope
            .attachment(PINNED_CONNECTION_ATTACHMENT)
            .map(str::to_string);

        let (caller, delegated) = match delegate {
            Some(delegate) => {
                // The delegated context's credential records which
                // authenticated identity the delegation rode in on.
                let _bracket = DelegationGuard::assume(
                    delegate,
                    Credential::new(connection_user.name().as_bytes()),
                )?;
                let ambient = current_identity()?.ok_or_else(|| {
                    anyhow::anyhow!("ambient identity missing inside delegation bracket")
                })?;
                let caller = ambient.principal().clone();
                self.authorize(&caller, &operation)?;
                (caller, true)
            }
            None => {
                self.authorize(&connection_user, &operation)?;
                (connection_user, false)
            }
        };

        tracing::debug!(%caller, delegated, operation = %operation, "handled invocation");
        self.journal.write().push(HandledCall {
            operation,
            caller: caller.clone(),
            delegated,
            pinned,
        });

        Ok(InvocationResponse::new(
            envelope.request_id(),
            json!({
                "caller": caller.name(),
                "delegated": delegated,
            }),
        ))
    }
}

impl InvocationTransport for InMemoryServer {
    fn dispatch(
        &self,
        context: &InvocationContext,
        envelope: InvocationEnvelope,
    ) -> anyhow::Result<InvocationResponse> {
        self.handle(context, envelope)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use legate_core::{ContextConfig, DELEGATED_IDENTITY_ATTACHMENT};

    use crate::policy::AccessPolicy;

    use super::*;

    fn server() -> InMemoryServer {
        let directory = UserDirectory::new()
            .with_user("alice", "alicePwd1!", &["auditor"])
            .with_user("bob", "bobPwd1!", &["treasurer"])
            .with_delegation("alice", "bob");
        let policies = PolicyTable::new()
            .with_operation("ping", AccessPolicy::PermitAll)
            .with_operation("ledger/read", AccessPolicy::roles(&["auditor"]))
            .with_operation("ledger/write", AccessPolicy::roles(&["treasurer"]));
        InMemoryServer::new(directory, policies)
    }

    fn context_for(user: &str, password: &str) -> InvocationContext {
        ContextConfig::for_connection(user, "localhost", 4447, user, password)
            .build_context()
            .unwrap()
    }

    #[test]
    fn test_authenticated_call_runs_as_the_connection_user() {
        let server = server();
        let context = context_for("alice", "alicePwd1!");
        let response = server
            .handle(&context, InvocationEnvelope::new("ledger/read"))
            .unwrap();
        assert_eq!(response.payload()["caller"], "alice");
        assert_eq!(response.payload()["delegated"], false);
    }

    #[test]
    fn test_bad_password_is_rejected_before_anything_else() {
        let server = server();
        let context = context_for("alice", "wrong");
        let err = server
            .handle(&context, InvocationEnvelope::new("ping"))
            .unwrap_err();
        assert_matches!(
            err.downcast_ref::<AccessError>(),
            Some(AccessError::BadCredentials { .. })
        );
        assert!(server.handled_calls().is_empty());
    }

    #[test]
    fn test_granted_delegation_switches_the_caller() {
        let server = server();
        let context = context_for("alice", "alicePwd1!");
        let mut envelope = InvocationEnvelope::new("ledger/write");
        envelope.attach(DELEGATED_IDENTITY_ATTACHMENT, "bob");

        let response = server.handle(&context, envelope).unwrap();
        assert_eq!(response.payload()["caller"], "bob");
        assert_eq!(response.payload()["delegated"], true);

        let calls = server.handled_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].delegated);
        assert_eq!(calls[0].caller, Principal::new("bob"));
    }

    #[test]
    fn test_delegation_without_grant_is_refused() {
        let server = server();
        let context = context_for("bob", "bobPwd1!");
        let mut envelope = InvocationEnvelope::new("ping");
        envelope.attach(DELEGATED_IDENTITY_ATTACHMENT, "alice");

        let err = server.handle(&context, envelope).unwrap_err();
        assert_matches!(
            err.downcast_ref::<AccessError>(),
            Some(AccessError::DelegationNotPermitted { .. })
        );
    }

    #[test]
    fn test_delegation_to_self_is_a_plain_call() {
        let server = server();
        let context = context_for("alice", "alicePwd1!");
        let mut envelope = InvocationEnvelope::new("ledger/read");
        envelope.attach(DELEGATED_IDENTITY_ATTACHMENT, "alice");

        let response = server.handle(&context, envelope).unwrap();
        assert_eq!(response.payload()["delegated"], false);
    }

    #[test]
    fn test_role_check_uses_the_effective_caller() {
        let server = server();
        // alice alone cannot write.
        let context = context_for("alice", "alicePwd1!");
        let err = server
            .handle(&context, InvocationEnvelope::new("ledger/write"))
            .unwrap_err();
        assert_matches!(
            err.downcast_ref::<AccessError>(),
            Some(AccessError::AccessDenied { .. })
        );

        // Delegating to bob makes bob's roles apply.
        let mut envelope = InvocationEnvelope::new("ledger/write");
        envelope.attach(DELEGATED_IDENTITY_ATTACHMENT, "bob");
        assert!(server.handle(&context, envelope).is_ok());
    }

    #[test]
    fn test_ambient_state_does_not_leak_out_of_handling() {
        let server = server();
        let context = context_for("alice", "alicePwd1!");
        let mut envelope = InvocationEnvelope::new("ledger/write");
        envelope.attach(DELEGATED_IDENTITY_ATTACHMENT, "bob");
        server.handle(&context, envelope).unwrap();

        assert!(current_identity().unwrap().is_none());
        assert!(read_connection_binding().unwrap().is_none());
    }
}
