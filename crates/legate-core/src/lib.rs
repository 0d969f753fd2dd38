//! Core types for scoped invocation contexts and delegated identities.
//!
//! This crate defines the data model the client layer operates on:
//!
//! - [`InvocationContext`]: the immutable connection/identity bundle behind
//!   each remote target, built from a [`ContextConfig`]
//! - [`SecurityIdentity`] and [`SecurityContext`]: principals, zeroized
//!   credentials, and the ambient context a thread acts under
//! - [`InvocationEnvelope`] / [`InvocationResponse`]: what crosses the
//!   transport seam
//! - [`ContextError`] and [`DelegationError`]: the failure taxonomy
//!
//! Everything here is plain data with no thread-local or global state; the
//! stateful machinery lives in `legate-client`.

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod identity;

pub use config::ContextConfig;
pub use context::{ConnectionBinding, ConnectionId, ContextId, Endpoint, InvocationContext};
pub use envelope::{
    InvocationEnvelope, InvocationResponse, RequestId, DELEGATED_IDENTITY_ATTACHMENT,
    PINNED_CONNECTION_ATTACHMENT,
};
pub use errors::{ContextError, ContextResult, DelegationError, DelegationResult};
pub use identity::{
    Credential, IdentityOrigin, Principal, RoleSet, SecurityContext, SecurityIdentity,
};
