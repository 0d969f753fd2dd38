//! Configuration bundles from which invocation contexts are built.
//!
//! A [`ContextConfig`] is a flat key/value bundle, the shape configuration
//! files and environment plumbing naturally produce. [`ContextConfig::build_context`]
//! validates it strictly: a missing or malformed required setting fails
//! construction instead of producing a context that fails later at dispatch.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{Endpoint, InvocationContext};
use crate::errors::{ContextError, ContextResult};
use crate::identity::SecurityIdentity;

/// Setting key: symbolic name of the connection.
pub const CONNECTION_NAME: &str = "connection.name";
/// Setting key: host of the remote endpoint.
pub const CONNECTION_HOST: &str = "connection.host";
/// Setting key: port of the remote endpoint.
pub const CONNECTION_PORT: &str = "connection.port";
/// Setting key: principal that authenticates the connection.
pub const CONNECTION_USERNAME: &str = "connection.username";
/// Setting key: password proving the principal.
pub const CONNECTION_PASSWORD: &str = "connection.password";

/// Flat key/value settings describing one connection.
///
/// Keys outside the `connection.*` family are passed through to the built
/// context as transport options, uninterpreted.
///
/// `Debug` output redacts the password setting. Serialization does not: a
/// serialized bundle round-trips the credential.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    settings: HashMap<String, String>,
}

impl ContextConfig {
    /// An empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing settings map.
    #[must_use]
    pub fn from_settings(settings: HashMap<String, String>) -> Self {
        Self { settings }
    }

    /// The bundle for a username/password connection, with the five required
    /// settings filled in.
    #[must_use]
    pub fn for_connection(
        name: &str,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Self {
        Self::new()
            .with(CONNECTION_NAME, name)
            .with(CONNECTION_HOST, host)
            .with(CONNECTION_PORT, port.to_string())
            .with(CONNECTION_USERNAME, username)
            .with(CONNECTION_PASSWORD, password)
    }

    /// Add or replace a setting.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Look up a setting.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Build an invocation context from this bundle.
    ///
    /// All five `connection.*` settings are required and must be non-empty;
    /// the port must parse as a non-zero `u16`. Every other setting is
    /// carried into the context as a transport option.
    pub fn build_context(&self) -> ContextResult<InvocationContext> {
        let name = self.require(CONNECTION_NAME)?;
        let host = self.require(CONNECTION_HOST)?;
        let port = self.require_port()?;
        let username = self.require(CONNECTION_USERNAME)?;
        let password = self.require(CONNECTION_PASSWORD)?;

        let passthrough: HashMap<String, String> = self
            .settings
            .iter()
            .filter(|(key, _)| !Self::is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let identity = SecurityIdentity::from_password(username, password);
        Ok(
            InvocationContext::new(name, Endpoint::new(host, port), identity)
                .with_transport_options(passthrough),
        )
    }

    fn is_reserved(key: &str) -> bool {
        matches!(
            key,
            CONNECTION_NAME
                | CONNECTION_HOST
                | CONNECTION_PORT
                | CONNECTION_USERNAME
                | CONNECTION_PASSWORD
        )
    }

    fn require(&self, key: &str) -> ContextResult<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(ContextError::ContextConstruction {
                reason: format!("setting `{key}` is empty"),
            }),
            None => Err(ContextError::ContextConstruction {
                reason: format!("missing required setting `{key}`"),
            }),
        }
    }

    fn require_port(&self) -> ContextResult<u16> {
        let raw = self.require(CONNECTION_PORT)?;
        let port: u16 = raw.parse().map_err(|_| ContextError::ContextConstruction {
            reason: format!("setting `{CONNECTION_PORT}` is not a valid port: `{raw}`"),
        })?;
        if port == 0 {
            return Err(ContextError::ContextConstruction {
                reason: format!("setting `{CONNECTION_PORT}` must be non-zero"),
            });
        }
        Ok(port)
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.settings {
            if key.as_str() == CONNECTION_PASSWORD {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}
