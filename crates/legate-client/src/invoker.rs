//! The remote-call issuance point.
//!
//! [`RemoteInvoker`] ties the pieces together: it resolves the calling
//! thread's invocation context through the selector, lets the interceptor
//! chain amend the envelope, pins the call to the thread's connection
//! binding if one is set, and hands the result to the transport.

use thiserror::Error;

use legate_core::{
    ContextError, DelegationError, InvocationContext, InvocationEnvelope, InvocationResponse,
    PINNED_CONNECTION_ATTACHMENT,
};

use crate::binding;
use crate::interceptor::{ClientInterceptor, InterceptorChain};
use crate::selector::ScopedContextSelector;

/// Performs the actual dispatch of an envelope to the remote endpoint
/// described by `context`.
///
/// Implementations decide what a dispatch failure means; typed failures can
/// be recovered downstream via [`anyhow::Error::downcast_ref`].
pub trait InvocationTransport: Send + Sync {
    /// Deliver `envelope` over the connection described by `context`.
    fn dispatch(
        &self,
        context: &InvocationContext,
        envelope: InvocationEnvelope,
    ) -> anyhow::Result<InvocationResponse>;
}

impl<T: InvocationTransport + ?Sized> InvocationTransport for std::sync::Arc<T> {
    fn dispatch(
        &self,
        context: &InvocationContext,
        envelope: InvocationEnvelope,
    ) -> anyhow::Result<InvocationResponse> {
        (**self).dispatch(context, envelope)
    }
}

/// Failure of a single invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The selector could not produce a context for the calling thread.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The privilege boundary refused an ambient-state access.
    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// The transport rejected or failed the dispatch.
    #[error("transport dispatch failed: {0}")]
    Transport(anyhow::Error),
}

/// Issues remote calls using the calling thread's scoped context and
/// ambient bindings.
///
/// The invoker is `Send + Sync` and intended to be shared: per-thread
/// behavior comes entirely from the thread-confined state consulted at
/// call time, never from the invoker itself.
#[derive(Debug)]
pub struct RemoteInvoker<T> {
    selector: ScopedContextSelector,
    interceptors: InterceptorChain,
    transport: T,
}

impl<T: InvocationTransport> RemoteInvoker<T> {
    /// Create an invoker dispatching through `transport`.
    #[must_use]
    pub fn new(selector: ScopedContextSelector, transport: T) -> Self {
        Self {
            selector,
            interceptors: InterceptorChain::new(),
            transport,
        }
    }

    /// Replace the interceptor chain.
    #[must_use]
    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Register an interceptor at `order` on the existing chain.
    pub fn register_interceptor(
        &mut self,
        order: i32,
        interceptor: std::sync::Arc<dyn ClientInterceptor>,
    ) {
        self.interceptors.register(order, interceptor);
    }

    /// The selector this invoker resolves contexts through.
    #[must_use]
    pub fn selector(&self) -> &ScopedContextSelector {
        &self.selector
    }

    /// The transport this invoker dispatches through.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue `envelope` as a remote call.
    ///
    /// Resolution happens first: a dangling scope aborts the call before
    /// any interceptor runs. If the calling thread holds a connection
    /// binding, the call is pinned to it via an envelope attachment.
    pub fn invoke(&self, envelope: InvocationEnvelope) -> Result<InvocationResponse, InvokeError> {
        let context = self.selector.resolve_current()?;

        let mut envelope = envelope;
        self.interceptors.apply(&mut envelope);
        if let Some(pinned) = binding::read_connection_binding()? {
            envelope.attach(PINNED_CONNECTION_ATTACHMENT, pinned.id().to_string());
        }

        tracing::debug!(
            operation = envelope.operation(),
            request = %envelope.request_id(),
            context = %context.id(),
            "dispatching invocation"
        );
        self.transport
            .dispatch(&context, envelope)
            .map_err(InvokeError::Transport)
    }

    /// Build an envelope for `operation` carrying `payload` and invoke it.
    pub fn invoke_operation(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<InvocationResponse, InvokeError> {
        self.invoke(InvocationEnvelope::new(operation).with_payload(payload))
    }
}
