//! Run work while holding a table slot or the global exclusive window.

use crate::action::{ActionHandle, SyncAction};
use crate::error::{Result, TableLockError};
use crate::lock::{LockStats, ReleaseHandle, TableLocks, WriterPolicy};
use std::future::Future;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sequences work per table, with an occasional global exclusive window.
///
/// Disposes its [`TableLocks`] when dropped.
#[derive(Debug, Default)]
pub struct Dispatcher {
    locks: TableLocks,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: WriterPolicy) -> Self {
        Self {
            locks: TableLocks::with_policy(policy),
        }
    }

    pub fn locks(&self) -> &TableLocks {
        &self.locks
    }

    pub fn stats(&self) -> LockStats {
        self.locks.stats()
    }

    /// Run `work` while holding the global exclusive window.
    ///
    /// The window is released however `work` ends, and its outcome is
    /// returned unchanged.
    pub async fn run_exclusive<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<TableLockError>,
    {
        guarded(self.locks.acquire_exclusive(cancel), work).await
    }

    /// Run `work` while holding the slot for `table`.
    pub async fn run_keyed<F, Fut, T, E>(
        &self,
        table: &str,
        cancel: &CancellationToken,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<TableLockError>,
    {
        guarded(self.locks.acquire_keyed(table, cancel), work).await
    }

    /// Hold the slot for `table` across several steps.
    ///
    /// The slot is released when the returned handle is released or dropped.
    pub async fn acquire_keyed(&self, table: &str, cancel: &CancellationToken) -> Result<ReleaseHandle> {
        self.locks.acquire_keyed(table, cancel).await
    }

    /// Spawn `action` under the slot it asks for.
    ///
    /// The returned handle resolves exactly once: with the action's outcome,
    /// or with `Cancelled` as soon as `cancel` fires.
    pub fn post<A: SyncAction>(&self, action: A, cancel: CancellationToken) -> ActionHandle<A::Output, A::Error> {
        let (tx, rx) = oneshot::channel();
        let locks = self.locks.clone();
        let token = cancel.clone();

        tokio::spawn(async move {
            let outcome = match action.table() {
                Some(table) => {
                    debug!("Posting action on table: {}", table);
                    let work_token = token.clone();
                    guarded(locks.acquire_keyed(&table, &token), move || action.execute(work_token)).await
                }
                None => {
                    debug!("Posting exclusive action");
                    let work_token = token.clone();
                    guarded(locks.acquire_exclusive(&token), move || action.execute(work_token)).await
                }
            };
            // The caller may have stopped waiting; the outcome is then dropped.
            let _ = tx.send(outcome);
        });

        ActionHandle::new(rx, cancel)
    }

    /// Tear down the underlying locks. See [`TableLocks::dispose`].
    pub fn dispose(&self) {
        self.locks.dispose();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.locks.dispose();
    }
}

async fn guarded<A, F, Fut, T, E>(acquire: A, work: F) -> std::result::Result<T, E>
where
    A: Future<Output = Result<ReleaseHandle>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<TableLockError>,
{
    let handle = acquire.await?;
    let outcome = work().await;
    handle.release();
    outcome
}
