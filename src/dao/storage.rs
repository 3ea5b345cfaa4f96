use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The store executed the batch but rejected one of its commands.
    #[error("store rejected `{command}`: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
    /// A stored value could not be decoded into the expected shape.
    #[error("corrupt value under `{key}`: {message}")]
    Corrupt { key: String, message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corruption error for the given key.
    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }
}
