use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableLockError {
    #[error("Lock acquisition cancelled")]
    Cancelled,

    #[error("Table lock manager has been disposed")]
    Disposed,

    #[error("Action was dropped before reporting an outcome")]
    Abandoned,

    #[error("Operation timed out after {duration:?}")]
    TimedOut { duration: Duration },

    #[error("Invalid duration format '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Lock invariant violated: {0}")]
    InvariantViolated(String),
}

impl TableLockError {
    pub fn exit_code(&self) -> i32 {
        match self {
            TableLockError::TimedOut { .. } => 2,
            TableLockError::Cancelled => 3,
            _ => 1,
        }
    }

    pub fn timed_out(duration: Duration) -> Self {
        TableLockError::TimedOut { duration }
    }

    /// True for the two failures produced by the lock layer itself.
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, TableLockError::Cancelled | TableLockError::Disposed)
    }
}

pub type Result<T> = std::result::Result<T, TableLockError>;
