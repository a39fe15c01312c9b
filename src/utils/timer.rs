//! Cancellable timers
//!
//! Every timer in a capture session runs as a task bound to a
//! `CancellationToken`. Tokens form a tree: cancelling a parent cancels all
//! of its children, so a session tears down every outstanding timer with a
//! single call.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<CancellationToken>>,
}

/// Shared cancel flag with async notification
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is cancelled together with this one.
    ///
    /// A child of an already cancelled token starts out cancelled.
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken::new();
        let mut children = self.inner.children.lock();
        children.retain(|c| !c.is_cancelled());
        if self.is_cancelled() {
            drop(children);
            child.cancel();
        } else {
            children.push(child.clone());
        }
        child
    }

    /// Cancel this token and its children.
    ///
    /// Returns `true` if this call did the cancelling; cancelling an
    /// already cancelled token is a no-op.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();

        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            child.cancel();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Run `fut` on the runtime until it finishes or `token` is cancelled.
///
/// The task yields `None` when it was cancelled first.
pub fn spawn_cancellable<F>(token: CancellationToken, fut: F) -> JoinHandle<Option<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = fut => Some(output),
        }
    })
}
