mod types;

pub use types::{Result, TableLockError};

// Re-export for convenience
pub use TableLockError as Error;
