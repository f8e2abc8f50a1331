use std::fmt;

type ReleaseAction = Box<dyn FnOnce() + Send + 'static>;

/// Proof that a slot is held.
///
/// The release action runs exactly once: on [`ReleaseHandle::release`], or when
/// the handle is dropped on any other exit path (early return, panic, or the
/// owning future being dropped).
#[must_use = "the slot is released as soon as the handle is dropped"]
pub struct ReleaseHandle {
    action: Option<ReleaseAction>,
}

impl ReleaseHandle {
    pub(crate) fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Release the slot now.
    pub fn release(mut self) {
        self.run();
    }

    /// Drop the handle without running its action.
    pub(crate) fn disarm(mut self) {
        self.action = None;
    }

    fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("armed", &self.action.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_handle() -> (ReleaseHandle, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let handle = ReleaseHandle::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (handle, count)
    }

    #[test]
    fn test_release_runs_action_once() {
        let (handle, count) = counting_handle();
        handle.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_action() {
        let (handle, count) = counting_handle();
        drop(handle);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarm_skips_action() {
        let (handle, count) = counting_handle();
        handle.disarm();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_on_panic_unwind() {
        let (handle, count) = counting_handle();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _held = handle;
            panic!("guarded work failed");
        }));
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
