pub mod backend;
pub mod error;
pub mod factory;
pub mod log_stream;
pub mod memory;
pub mod result;
pub mod sql;

pub use backend::{ConsumerGroupStore, StorageBackend};
pub use error::{Error, Result};
pub use factory::build;
pub use log_stream::LogStreamBackend;
pub use memory::MemoryBackend;
pub use result::{HistoryEntry, HistoryQuery, StorageResult};
pub use sql::SqlBackend;
