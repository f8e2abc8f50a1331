//! Units of sync work that run under a table slot or the exclusive window.

use crate::error::TableLockError;
use std::future::Future;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A pull, push, purge or other unit of work sequenced by a
/// [`Dispatcher`](crate::Dispatcher).
pub trait SyncAction: Send + 'static {
    type Output: Send + 'static;
    type Error: From<TableLockError> + Send + 'static;

    /// The table this action works on, or `None` if it needs the global
    /// exclusive window.
    fn table(&self) -> Option<String>;

    /// Run the action. Called at most once, while the slot is held.
    fn execute(
        self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// The pending outcome of a posted [`SyncAction`].
#[derive(Debug)]
pub struct ActionHandle<T, E> {
    outcome: oneshot::Receiver<Result<T, E>>,
    cancel: CancellationToken,
}

impl<T, E> ActionHandle<T, E>
where
    E: From<TableLockError>,
{
    pub(crate) fn new(outcome: oneshot::Receiver<Result<T, E>>, cancel: CancellationToken) -> Self {
        Self { outcome, cancel }
    }

    /// Cancel the action. Its outcome becomes `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the action's outcome.
    pub async fn outcome(mut self) -> Result<T, E> {
        tokio::select! {
            biased;
            outcome = &mut self.outcome => {
                outcome.unwrap_or_else(|_| Err(TableLockError::Abandoned.into()))
            }
            _ = self.cancel.cancelled() => Err(TableLockError::Cancelled.into()),
        }
    }
}
