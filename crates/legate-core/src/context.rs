//! Invocation contexts: the connection and identity state behind remote calls.
//!
//! An [`InvocationContext`] is an immutable bundle describing one remote
//! target: where it is, which identity authenticates the connection, and any
//! transport options. Contexts are built once (usually from a
//! [`ContextConfig`](crate::config::ContextConfig)) and shared behind `Arc`;
//! nothing mutates them after construction, which is what makes the
//! thread-scoped registry safe without locks.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Principal, SecurityIdentity};

/// Unique identifier for an invocation context.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh context identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// Unique identifier for an established connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Network endpoint of a remote enforcement point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable bundle of connection and identity state for one remote target.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    id: ContextId,
    connection_name: String,
    endpoint: Endpoint,
    identity: SecurityIdentity,
    transport_options: HashMap<String, String>,
}

impl InvocationContext {
    /// Create a context for `connection_name` reaching `endpoint` as `identity`.
    #[must_use]
    pub fn new(
        connection_name: impl Into<String>,
        endpoint: Endpoint,
        identity: SecurityIdentity,
    ) -> Self {
        Self {
            id: ContextId::new(),
            connection_name: connection_name.into(),
            endpoint,
            identity,
            transport_options: HashMap::new(),
        }
    }

    /// Attach transport options, replacing any present.
    #[must_use]
    pub fn with_transport_options(mut self, options: HashMap<String, String>) -> Self {
        self.transport_options = options;
        self
    }

    /// The context's unique identifier.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The symbolic name of the connection this context describes.
    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Where the remote enforcement point listens.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The identity that authenticates the connection.
    #[must_use]
    pub fn identity(&self) -> &SecurityIdentity {
        &self.identity
    }

    /// All transport options.
    #[must_use]
    pub fn transport_options(&self) -> &HashMap<String, String> {
        &self.transport_options
    }

    /// Look up a single transport option.
    #[must_use]
    pub fn transport_option(&self, key: &str) -> Option<&str> {
        self.transport_options.get(key).map(String::as_str)
    }
}

/// An established connection that ambient state can pin invocations to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBinding {
    id: ConnectionId,
    endpoint: Endpoint,
    authenticated_as: Principal,
}

impl ConnectionBinding {
    /// Describe an established connection.
    #[must_use]
    pub fn new(id: ConnectionId, endpoint: Endpoint, authenticated_as: Principal) -> Self {
        Self {
            id,
            endpoint,
            authenticated_as,
        }
    }

    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote endpoint the connection reaches.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The principal the connection was authenticated as.
    #[must_use]
    pub fn authenticated_as(&self) -> &Principal {
        &self.authenticated_as
    }
}
