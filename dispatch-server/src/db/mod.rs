//! Embedded storage (redb) and seed loading

pub mod seed;
pub mod storage;

pub use seed::{SeedData, SeedSummary};
pub use storage::{DispatchStorage, StorageError, StorageResult};
