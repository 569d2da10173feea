//! Opaque session handles threaded through operations.
//!
//! A handle wraps whatever session object a backend hands out (a driver `ClientSession`, an
//! in-memory token). The repository never looks inside; backends lock the handle for the
//! duration of a call and downcast it to their own session type.

use mea::mutex::{Mutex, MutexGuard};
use std::{
    any::{Any, type_name},
    fmt,
    sync::Arc,
};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A caller-owned session, shareable across calls and tasks.
///
/// Clones refer to the same session. Calls using one handle are serialized.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Box<dyn Any + Send>>>,
    kind: &'static str,
}

impl SessionHandle {
    /// Wraps a backend session object.
    pub fn new<S: Any + Send>(session: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(session))),
            kind: type_name::<S>(),
        }
    }

    /// The type name of the wrapped session.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns `true` when both handles refer to the same session.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Waits for exclusive access to the session.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            guard: self.inner.lock().await,
            kind: self.kind,
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a locked session.
pub struct SessionGuard<'a> {
    guard: MutexGuard<'a, Box<dyn Any + Send>>,
    kind: &'static str,
}

impl SessionGuard<'_> {
    /// Borrows the session as `S`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidSession`] when the handle wraps another type,
    /// which happens when a session started by one backend is used with another.
    pub fn downcast_mut<S: Any>(&mut self) -> DocumentStoreResult<&mut S> {
        let kind = self.kind;

        (**self.guard).downcast_mut::<S>().ok_or_else(|| {
            DocumentStoreError::InvalidSession(format!(
                "expected a {} session, got {kind}",
                type_name::<S>()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Token(u32);

    #[tokio::test]
    async fn downcast_to_wrapped_type() {
        let handle = SessionHandle::new(Token(3));
        let mut guard = handle.lock().await;

        assert_eq!(guard.downcast_mut::<Token>().unwrap(), &mut Token(3));
    }

    #[tokio::test]
    async fn foreign_session_is_rejected() {
        let handle = SessionHandle::new(Token(3));
        let mut guard = handle.lock().await;

        assert!(matches!(
            guard.downcast_mut::<String>(),
            Err(DocumentStoreError::InvalidSession(_))
        ));
    }

    #[test]
    fn clones_share_the_session() {
        let handle = SessionHandle::new(Token(1));
        let other = SessionHandle::new(Token(1));

        assert!(handle.same_session(&handle.clone()));
        assert!(!handle.same_session(&other));
    }
}
