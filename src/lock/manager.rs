use super::entry::KeyEntry;
use super::gate::Gate;
use super::policy::WriterPolicy;
use super::release::ReleaseHandle;
use crate::error::{Result, TableLockError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockStats {
    /// Keys with a live entry.
    pub keys: usize,
    /// Keyed callers between registration and release.
    pub readers_waiting: usize,
    /// Exclusive callers between enqueue and release.
    pub writers_waiting: usize,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, KeyEntry>,
    readers_waiting: usize,
    writers_waiting: usize,
    disposed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    reader_gate: Gate,
    writer_gate: Gate,
    // Serializes exclusive holders among themselves.
    writer_slot: Arc<tokio::sync::Mutex<()>>,
    policy: WriterPolicy,
}

/// Many independent per-table locks, gated by one global exclusive window.
///
/// Keyed acquisitions on different tables never contend with each other.
/// Keyed acquisitions on the same table are serialized. An exclusive
/// acquisition waits for every registered keyed caller to drain and then
/// holds off all keyed callers until it releases.
///
/// Cloning yields another handle to the same lock state.
#[derive(Debug, Clone)]
pub struct TableLocks {
    shared: Arc<Shared>,
}

impl Default for TableLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl TableLocks {
    pub fn new() -> Self {
        Self::with_policy(WriterPolicy::default())
    }

    pub fn with_policy(policy: WriterPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                reader_gate: Gate::new("reader", true),
                writer_gate: Gate::new("writer", false),
                writer_slot: Arc::new(tokio::sync::Mutex::new(())),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> WriterPolicy {
        self.shared.policy
    }

    /// Acquire the global exclusive window.
    ///
    /// Resolves once no keyed caller is registered and no other exclusive
    /// holder is active. Fails with [`TableLockError::Cancelled`] if `cancel`
    /// fires first, leaving the counters as they were before the call.
    pub async fn acquire_exclusive(&self, cancel: &CancellationToken) -> Result<ReleaseHandle> {
        debug!("Acquiring exclusive lock (policy: {:?})", self.shared.policy);

        {
            let mut state = self.shared.state();
            if state.disposed {
                return Err(TableLockError::Disposed);
            }
            state.writers_waiting += 1;
            if state.readers_waiting == 0 {
                self.shared.hand_off_to_writer(&state);
            } else if self.shared.policy.closes_on_enqueue() {
                self.shared.reader_gate.close();
            }
        }

        // Rolls the enqueue back on every exit path until the slot is held.
        let enqueued = {
            let shared = self.shared.clone();
            ReleaseHandle::new(move || shared.release_exclusive(None))
        };

        self.shared.writer_gate.wait_open(cancel).await?;

        {
            let state = self.shared.state();
            if state.disposed {
                return Err(TableLockError::Disposed);
            }
            self.shared.reader_gate.close();
        }

        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TableLockError::Cancelled),
            slot = self.shared.writer_slot.clone().lock_owned() => slot,
        };

        enqueued.disarm();
        let handle = {
            let shared = self.shared.clone();
            ReleaseHandle::new(move || shared.release_exclusive(Some(slot)))
        };

        if self.shared.state().disposed {
            return Err(TableLockError::Disposed);
        }

        debug!("Exclusive lock acquired");
        Ok(handle)
    }

    /// Acquire the slot for one table.
    ///
    /// Any number of distinct tables may be held at once; a second caller for
    /// the same table waits for the first to release. Not reentrant: a caller
    /// already holding `key` deadlocks if it acquires `key` again.
    pub async fn acquire_keyed(&self, key: &str, cancel: &CancellationToken) -> Result<ReleaseHandle> {
        debug!("Acquiring table lock: {}", key);

        if self.shared.state().disposed {
            return Err(TableLockError::Disposed);
        }

        let slot = loop {
            self.shared.reader_gate.wait_open(cancel).await?;

            let mut guard = self.shared.state();
            let state = &mut *guard;
            if state.disposed {
                return Err(TableLockError::Disposed);
            }
            // A writer may have closed the gate between our wake-up and now.
            if !self.shared.reader_gate.is_open() {
                continue;
            }

            let entry = state.entries.entry(key.to_owned()).or_insert_with(KeyEntry::new);
            entry.refcount += 1;
            state.readers_waiting += 1;
            break entry.slot.clone();
        };

        // Rolls the registration back on every exit path until the slot is held.
        let registered = {
            let shared = self.shared.clone();
            let key = key.to_owned();
            ReleaseHandle::new(move || shared.release_keyed(&key, None))
        };

        let held = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TableLockError::Cancelled),
            held = slot.lock_owned() => held,
        };

        registered.disarm();
        let handle = {
            let shared = self.shared.clone();
            let key = key.to_owned();
            ReleaseHandle::new(move || shared.release_keyed(&key, Some(held)))
        };

        if self.shared.state().disposed {
            return Err(TableLockError::Disposed);
        }

        debug!("Table lock acquired: {}", key);
        Ok(handle)
    }

    /// Tear the manager down.
    ///
    /// Callers waiting on a gate fail with [`TableLockError::Disposed`];
    /// callers queued on a slot fail once its current holder releases. It is
    /// a caller error to dispose while holders are still active.
    pub fn dispose(&self) {
        let mut state = self.shared.state();
        if state.disposed {
            return;
        }

        if state.readers_waiting > 0 || state.writers_waiting > 0 {
            warn!(
                "Disposing table locks with work in flight ({} keyed, {} exclusive)",
                state.readers_waiting, state.writers_waiting
            );
        }

        state.disposed = true;
        state.entries.clear();
        self.shared.reader_gate.open();
        self.shared.writer_gate.open();
        debug!("Table locks disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state().disposed
    }

    pub fn stats(&self) -> LockStats {
        let state = self.shared.state();
        LockStats {
            keys: state.entries.len(),
            readers_waiting: state.readers_waiting,
            writers_waiting: state.writers_waiting,
        }
    }

    /// Number of callers holding or waiting for `key`.
    pub fn holders(&self, key: &str) -> usize {
        self.shared
            .state()
            .entries
            .get(key)
            .map_or(0, |entry| entry.refcount)
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        // Critical sections never panic midway, so a poisoned state is intact.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain complete: stop admitting keyed callers and let writers through.
    fn hand_off_to_writer(&self, state: &State) {
        if state.disposed {
            return;
        }
        self.reader_gate.close();
        self.writer_gate.open();
    }

    fn hand_off_to_readers(&self, state: &State) {
        if state.disposed {
            return;
        }
        self.writer_gate.close();
        self.reader_gate.open();
    }

    fn release_keyed(&self, key: &str, held: Option<OwnedMutexGuard<()>>) {
        let mut guard = self.state();
        let state = &mut *guard;

        state.readers_waiting -= 1;
        let remove = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.refcount -= 1;
                entry.refcount == 0
            }
            None => false,
        };

        drop(held);

        if remove {
            state.entries.remove(key);
            debug!("Table lock entry removed: {}", key);
        }

        if state.writers_waiting > 0 && state.readers_waiting == 0 {
            debug!("Keyed callers drained, handing off to exclusive waiter");
            self.hand_off_to_writer(state);
        }
    }

    fn release_exclusive(&self, held: Option<OwnedMutexGuard<()>>) {
        let mut state = self.state();

        state.writers_waiting -= 1;
        drop(held);

        if state.writers_waiting == 0 {
            self.hand_off_to_readers(&state);
        }
        debug!("Exclusive lock released ({} writer(s) left)", state.writers_waiting);
    }
}
