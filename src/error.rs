use std::error::Error as StdError;
use std::sync::Arc;

/// Coarse classification of a [`CacheError`].
///
/// Callers branch on this to tell "the key or value is unusable" apart from
/// "the store is unavailable" and "my producer failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Encoding or decoding of a key or value failed.
    Key,
    /// The backing store failed for a reason other than a missing key.
    Storage,
    /// The caller-supplied producer failed or panicked.
    Producer,
}

/// Error type for cache operations.
///
/// The type is `Clone` so a single coalesced failure can be handed to every
/// waiter of the same in-flight computation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// A key or value could not be turned into bytes.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Stored bytes could not be turned back into the requested type.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A store transaction failed.
    #[error("[{store}] storage error for key '{key}': {message}")]
    Storage {
        store: String,
        key: String,
        message: String,
    },

    /// The producer passed to `get_or_store` failed.
    #[error("producer failed: {0}")]
    Producer(#[source] Arc<dyn StdError + Send + Sync>),
}

impl CacheError {
    /// Create a new encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        CacheError::Encoding(message.into())
    }

    /// Create a new decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        CacheError::Decoding(message.into())
    }

    /// Create a new storage error. Binary keys are rendered as hex.
    pub fn storage(store: impl Into<String>, key: &[u8], message: impl Into<String>) -> Self {
        CacheError::Storage {
            store: store.into(),
            key: crate::utils::display_key(key),
            message: message.into(),
        }
    }

    /// Wrap a producer failure.
    pub fn producer<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let boxed: Box<dyn StdError + Send + Sync> = err.into();
        CacheError::Producer(Arc::from(boxed))
    }

    /// The classification used to decide how to react to this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Encoding(_) | CacheError::Decoding(_) => ErrorKind::Key,
            CacheError::Storage { .. } => ErrorKind::Storage,
            CacheError::Producer(_) => ErrorKind::Producer,
        }
    }

    pub fn is_storage(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }

    pub fn is_producer(&self) -> bool {
        self.kind() == ErrorKind::Producer
    }
}
