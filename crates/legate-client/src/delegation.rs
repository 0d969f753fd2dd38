//! The identity delegation bracket.
//!
//! A thread's ambient [`SecurityContext`] says who its outbound work acts
//! as. Delegation temporarily swaps that context for another identity and
//! must restore the displaced context afterwards, no matter how the
//! bracketed work exits. The raw [`swap_identity`]/[`restore_identity`] pair
//! exists for callers that need to hold the bracket open across custom
//! control flow; everyone else should use [`DelegationGuard`] or [`run_as`],
//! which restore on drop and therefore survive early returns and panics.
//!
//! The privilege check runs once, at swap time. The proof it yields travels
//! inside [`PriorContext`], which is why restoration is infallible: a
//! bracket that was allowed to open is always allowed to close.

use std::cell::RefCell;

use legate_core::{Credential, DelegationResult, Principal, SecurityContext, SecurityIdentity};

use crate::privilege::{self, AmbientAccess, AmbientOp};

thread_local! {
    static AMBIENT_IDENTITY: RefCell<Option<SecurityContext>> = const { RefCell::new(None) };
}

/// The ambient context displaced by a swap, plus the proof needed to put it
/// back.
///
/// Dropping a `PriorContext` without passing it to [`restore_identity`]
/// leaks the swapped identity into the rest of the thread's work, which is
/// almost never intended; prefer [`DelegationGuard`].
#[derive(Debug)]
#[must_use = "the displaced context must be restored when the delegated work ends"]
pub struct PriorContext {
    previous: Option<SecurityContext>,
    access: AmbientAccess,
}

impl PriorContext {
    /// The context that was active before the swap, if any.
    #[must_use]
    pub fn context(&self) -> Option<&SecurityContext> {
        self.previous.as_ref()
    }
}

/// Install a delegation-tagged ambient context for `principal`, returning
/// the displaced context.
///
/// The returned [`PriorContext`] is the only way to undo the swap; hand it
/// to [`restore_identity`] when the delegated work ends.
pub fn swap_identity(
    principal: Principal,
    credential: Credential,
) -> DelegationResult<PriorContext> {
    let access = privilege::elevate(AmbientOp::SwapIdentity)?;
    let next = SecurityContext::delegated(SecurityIdentity::new(principal, credential));
    tracing::debug!(principal = %next.principal(), "swapping ambient identity");
    let previous = AMBIENT_IDENTITY.with(|cell| cell.replace(Some(next)));
    Ok(PriorContext { previous, access })
}

/// Reinstall the context displaced by an earlier [`swap_identity`].
///
/// Infallible: the privilege check already ran when the bracket opened and
/// its proof is carried inside `prior`.
pub fn restore_identity(prior: PriorContext) {
    let PriorContext {
        previous,
        access: _access,
    } = prior;
    match &previous {
        Some(context) => {
            tracing::debug!(principal = %context.principal(), "restoring ambient identity");
        }
        None => tracing::debug!("restoring empty ambient identity"),
    }
    AMBIENT_IDENTITY.with(|cell| *cell.borrow_mut() = previous);
}

/// Associate `context` with the calling thread, returning the displaced
/// context.
///
/// This is the raw installer used by login pipelines to establish the
/// primary context; delegated work should go through [`DelegationGuard`]
/// instead. Passing `None` clears the thread's ambient context.
pub fn set_ambient_context(
    context: Option<SecurityContext>,
) -> DelegationResult<Option<SecurityContext>> {
    let _access = privilege::elevate(AmbientOp::SwapIdentity)?;
    Ok(AMBIENT_IDENTITY.with(|cell| cell.replace(context)))
}

/// The calling thread's ambient security context, if any.
pub fn current_identity() -> DelegationResult<Option<SecurityContext>> {
    let _access = privilege::elevate(AmbientOp::ReadIdentity)?;
    Ok(AMBIENT_IDENTITY.with(|cell| cell.borrow().clone()))
}

/// Scoped delegation bracket.
///
/// [`DelegationGuard::assume`] swaps the ambient identity; dropping the
/// guard restores the displaced context. Because restoration runs in `Drop`,
/// it covers normal returns, `?` early exits, and panics alike. Guards nest:
/// each drop peels back exactly one swap.
#[derive(Debug)]
#[must_use = "the delegation ends as soon as the guard is dropped"]
pub struct DelegationGuard {
    prior: Option<PriorContext>,
}

impl DelegationGuard {
    /// Enter a delegation bracket acting as `principal`.
    pub fn assume(principal: Principal, credential: Credential) -> DelegationResult<Self> {
        let prior = swap_identity(principal, credential)?;
        Ok(Self { prior: Some(prior) })
    }

    /// The context that will be restored when this guard drops.
    #[must_use]
    pub fn displaced(&self) -> Option<&SecurityContext> {
        self.prior.as_ref().and_then(PriorContext::context)
    }
}

impl Drop for DelegationGuard {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            restore_identity(prior);
        }
    }
}

/// Run `f` with the ambient identity swapped to `principal`.
///
/// The displaced context is restored before this returns, even if `f`
/// panics.
pub fn run_as<T>(
    principal: Principal,
    credential: Credential,
    f: impl FnOnce() -> T,
) -> DelegationResult<T> {
    let _guard = DelegationGuard::assume(principal, credential)?;
    Ok(f())
}
