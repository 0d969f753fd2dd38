//! Ambient connection binding.
//!
//! A thread may pin its outbound work to one already-established connection
//! instead of letting the transport pick. The binding is thread-confined
//! ambient state guarded by the same privilege boundary as the ambient
//! identity; server-side enforcement points also use it to record which
//! connection a request arrived over while they decide whether to honor a
//! delegation request.

use std::cell::RefCell;

use legate_core::{ConnectionBinding, DelegationResult};

use crate::privilege::{self, AmbientAccess, AmbientOp};

thread_local! {
    static AMBIENT_CONNECTION: RefCell<Option<ConnectionBinding>> = const { RefCell::new(None) };
}

/// The calling thread's connection binding, if any.
pub fn read_connection_binding() -> DelegationResult<Option<ConnectionBinding>> {
    let _access = privilege::elevate(AmbientOp::ReadConnection)?;
    Ok(AMBIENT_CONNECTION.with(|cell| cell.borrow().clone()))
}

/// Whether the calling thread has a connection binding.
pub fn connection_binding_is_set() -> DelegationResult<bool> {
    let _access = privilege::elevate(AmbientOp::ReadConnection)?;
    Ok(AMBIENT_CONNECTION.with(|cell| cell.borrow().is_some()))
}

/// Drop the calling thread's connection binding. Idempotent.
///
/// A [`ConnectionGuard`] still restores the binding it displaced; clearing
/// only affects what the thread sees until then.
pub fn clear_connection_binding() -> DelegationResult<()> {
    let _access = privilege::elevate(AmbientOp::ClearConnection)?;
    AMBIENT_CONNECTION.with(|cell| *cell.borrow_mut() = None);
    Ok(())
}

/// Pin the calling thread to `binding` until the returned guard drops.
///
/// The guard restores whatever binding was in place before, on every exit
/// path. The privilege check runs here, once; restoration cannot fail.
pub fn bind_connection(binding: ConnectionBinding) -> DelegationResult<ConnectionGuard> {
    let access = privilege::elevate(AmbientOp::BindConnection)?;
    tracing::debug!(connection = %binding.id(), principal = %binding.authenticated_as(), "binding connection");
    let previous = AMBIENT_CONNECTION.with(|cell| cell.replace(Some(binding)));
    Ok(ConnectionGuard {
        restore: Some((previous, access)),
    })
}

/// Scoped connection binding; restores the displaced binding on drop.
#[derive(Debug)]
#[must_use = "the connection binding is undone as soon as the guard is dropped"]
pub struct ConnectionGuard {
    restore: Option<(Option<ConnectionBinding>, AmbientAccess)>,
}

impl ConnectionGuard {
    /// The binding that will be restored when this guard drops.
    #[must_use]
    pub fn displaced(&self) -> Option<&ConnectionBinding> {
        self.restore
            .as_ref()
            .and_then(|(previous, _)| previous.as_ref())
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some((previous, _access)) = self.restore.take() {
            AMBIENT_CONNECTION.with(|cell| *cell.borrow_mut() = previous);
        }
    }
}
