//! Cooperative cancellation of a single in-flight request.
//!
//! [`pair`] hands out two ends: the [`CancelHandle`] stays with whoever owns the
//! request, the [`CancelSignal`] travels with the request itself. Cancelling
//! makes a guarded request resolve with [`ApiError::Canceled`]; the handle can
//! then wait until the request side has let go of its signal.

use std::future::Future;

use tokio::sync::oneshot;

use crate::error::ApiError;

pub fn pair() -> (CancelHandle, CancelSignal) {
    let (trigger_tx, trigger_rx) = oneshot::channel();
    let (released_tx, released_rx) = oneshot::channel();

    (
        CancelHandle {
            trigger: trigger_tx,
            released: released_rx,
        },
        CancelSignal {
            trigger: trigger_rx,
            _released: released_tx,
        },
    )
}

#[derive(Debug)]
pub struct CancelHandle {
    trigger: oneshot::Sender<()>,
    released: oneshot::Receiver<()>,
}

impl CancelHandle {
    /// Signal cancellation and wait for the request to acknowledge it.
    ///
    /// Resolves immediately when the request has already finished.
    pub async fn cancel(self) {
        let _ = self.trigger.send(());
        // Nothing is ever sent on this channel; it closes when the signal drops.
        let _ = self.released.await;
    }
}

#[derive(Debug)]
pub struct CancelSignal {
    trigger: oneshot::Receiver<()>,
    _released: oneshot::Sender<()>,
}

impl CancelSignal {
    /// Drive `request` until it completes or cancellation is requested.
    ///
    /// Dropping the handle without cancelling does not cancel the request.
    pub async fn guard<T, F>(mut self, request: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        tokio::select! {
            biased;
            Ok(()) = &mut self.trigger => Err(ApiError::Canceled),
            result = request => result,
        }
    }
}

/// Run `request` under `signal` when one is given.
pub async fn guarded<T, F>(signal: Option<CancelSignal>, request: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match signal {
        Some(signal) => signal.guard(request).await,
        None => request.await,
    }
}
