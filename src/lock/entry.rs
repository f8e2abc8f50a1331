use std::sync::Arc;
use tokio::sync::Mutex;

/// Bookkeeping for one key: its exclusive slot plus the number of callers
/// currently registered on it (holders and waiters alike).
///
/// Lives in the manager's map only while `refcount > 0`.
#[derive(Debug)]
pub(crate) struct KeyEntry {
    pub(crate) refcount: usize,
    pub(crate) slot: Arc<Mutex<()>>,
}

impl KeyEntry {
    pub(crate) fn new() -> Self {
        Self {
            refcount: 0,
            slot: Arc::new(Mutex::new(())),
        }
    }
}
