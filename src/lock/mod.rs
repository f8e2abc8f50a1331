mod entry;
mod gate;
mod manager;
mod policy;
mod release;

pub use manager::{LockStats, TableLocks};
pub use policy::WriterPolicy;
pub use release::ReleaseHandle;
