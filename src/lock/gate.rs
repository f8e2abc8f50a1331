use crate::error::{Result, TableLockError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A binary open/closed signal that tasks can wait on.
///
/// Transitions are made by the lock manager while it holds its state mutex;
/// waiting happens outside of it.
#[derive(Debug)]
pub(crate) struct Gate {
    name: &'static str,
    state: watch::Sender<bool>,
}

impl Gate {
    pub(crate) fn new(name: &'static str, open: bool) -> Self {
        let (state, _) = watch::channel(open);
        Self { name, state }
    }

    pub(crate) fn open(&self) {
        self.state.send_replace(true);
    }

    pub(crate) fn close(&self) {
        self.state.send_replace(false);
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the gate is open or `cancel` fires, whichever comes first.
    pub(crate) async fn wait_open(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.state.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::trace!("Wait on {} gate cancelled", self.name);
                Err(TableLockError::Cancelled)
            }
            opened = wait_for_open(&mut rx) => {
                if opened {
                    Ok(())
                } else {
                    Err(TableLockError::Disposed)
                }
            }
        }
    }
}

async fn wait_for_open(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|open| *open).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_gate_passes_immediately() {
        let gate = Gate::new("reader", true);
        gate.wait_open(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_gate_blocks_until_opened() {
        let gate = Arc::new(Gate::new("writer", false));
        let gate_clone = gate.clone();
        let waiter = tokio::spawn(async move {
            gate_clone.wait_open(&CancellationToken::new()).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.open();
        waiter.await.unwrap().unwrap();
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_cancelled_token_wins_over_open_gate() {
        let gate = Gate::new("reader", true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = gate.wait_open(&cancel).await;
        assert!(matches!(result, Err(TableLockError::Cancelled)));
    }
}
