mod config;
mod error;
mod store;

pub use config::UpstashConfig;
pub use error::UpstashDaoError;
pub use store::UpstashCounterStore;

use crate::dao::storage::StorageError;

impl From<UpstashDaoError> for StorageError {
    fn from(err: UpstashDaoError) -> Self {
        match err {
            UpstashDaoError::CommandRejected { command, message } => {
                StorageError::Command { command, message }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
