//! Per-table async locks gated by one global exclusive window

pub mod action;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod simulate;
pub mod utils;

pub use action::{ActionHandle, SyncAction};
pub use dispatch::Dispatcher;
pub use error::{Result, TableLockError};
pub use lock::{LockStats, ReleaseHandle, TableLocks, WriterPolicy};
pub use tokio_util::sync::CancellationToken;
