//! Cooperative cancellation of in-flight operations.

use futures::{
    future::{Either, select},
    pin_mut,
};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Notify;

use crate::error::{DocumentStoreError, DocumentStoreResult};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A clone-shared cancellation signal.
///
/// Cancelling makes every pending operation carrying a clone of the token fail with
/// [`DocumentStoreError::Cancelled`]. It does not abort work already sent to the server.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Fails with [`DocumentStoreError::Cancelled`] if the token is already cancelled.
    pub fn check(&self) -> DocumentStoreResult<()> {
        if self.is_cancelled() {
            Err(DocumentStoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drives `future` to completion unless the token is cancelled first.
    pub async fn run<F, T>(&self, future: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        self.check()?;

        let cancelled = self.cancelled();
        pin_mut!(future);
        pin_mut!(cancelled);

        match select(future, cancelled).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => Err(DocumentStoreError::Cancelled),
        }
    }
}

/// Runs `future` under an optional token.
pub async fn run_cancellable<F, T>(token: Option<&CancellationToken>, future: F) -> DocumentStoreResult<T>
where
    F: Future<Output = DocumentStoreResult<T>>,
{
    match token {
        Some(token) => token.run(future).await,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let token = CancellationToken::new();

        let result = token.run(async { Ok(7) }).await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn already_cancelled_fails_before_running() {
        let token = CancellationToken::new();
        token.cancel();

        let result = token.run(async { Ok(1) }).await;

        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result: DocumentStoreResult<()> = token
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn no_token_runs_plainly() {
        assert_eq!(run_cancellable(None, async { Ok("x") }).await.unwrap(), "x");
    }
}
