//! Cooperative cancellation signals.
//!
//! A [`CancellationSource`] flips a [`watch`] channel once, every [`CancellationToken`] created
//! from it observes the flip. Tokens may be linked to a parent token, in which case they are
//! cancelled when either side is.
use futures_core::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
    parent: Option<Arc<CancellationToken>>,
}

/// Observer side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationSource {
    /// Create new uncancelled source.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx, parent: None }
    }

    /// Create a source whose tokens are also cancelled when `parent` is.
    pub fn linked(parent: &CancellationToken) -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx, parent: Some(Arc::new(parent.clone())) }
    }

    /// Signal cancellation, returns `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| !std::mem::replace(cancelled, true))
    }

    /// Returns `true` if this source or its parent has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Create a token observing this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken { rx: self.tx.subscribe(), parent: self.parent.clone() }
    }
}

impl Default for CancellationSource {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        // the sender is dropped, `cancelled` then pends forever
        let (_, rx) = watch::channel(false);
        Self { rx, parent: None }
    }

    /// Returns `true` if cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Completes when cancellation is signalled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let own = wait(self.rx.clone());
            match &self.parent {
                Some(parent) => tokio::select! {
                    _ = own => {}
                    _ = parent.cancelled() => {}
                },
                None => own.await,
            }
        })
    }
}

async fn wait(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await
    }
}
