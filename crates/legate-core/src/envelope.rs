//! Invocation envelopes handed across the transport seam.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attachment key carrying the identity a call asks to be executed as.
pub const DELEGATED_IDENTITY_ATTACHMENT: &str = "legate.delegated-identity";

/// Attachment key pinning a call to an established connection.
pub const PINNED_CONNECTION_ATTACHMENT: &str = "legate.pinned-connection";

/// Unique identifier for a single invocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh request identifier.
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

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

/// One outbound invocation: the operation, its payload, and string
/// attachments interceptors may amend before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationEnvelope {
    request_id: RequestId,
    operation: String,
    payload: serde_json::Value,
    attachments: HashMap<String, String>,
}

impl InvocationEnvelope {
    /// Create an envelope for `operation` with an empty payload.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            operation: operation.into(),
            payload: serde_json::Value::Null,
            attachments: HashMap::new(),
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The envelope's request identifier.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The operation being invoked.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Add or replace an attachment.
    pub fn attach(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    /// Look up an attachment.
    #[must_use]
    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    /// All attachments.
    #[must_use]
    pub fn attachments(&self) -> &HashMap<String, String> {
        &self.attachments
    }

    /// The identity this call asks to be executed as, if any.
    #[must_use]
    pub fn delegated_identity(&self) -> Option<&str> {
        self.attachment(DELEGATED_IDENTITY_ATTACHMENT)
    }
}

/// The reply to a dispatched invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResponse {
    request_id: RequestId,
    payload: serde_json::Value,
}

impl InvocationResponse {
    /// Create a response answering `request_id`.
    #[must_use]
    pub fn new(request_id: RequestId, payload: serde_json::Value) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// The request this response answers.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}
