pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Address absent from the store.
    #[error("storage: not found")]
    NotFound,

    /// A registered validator rejected the chunk. Non-retryable.
    #[error("storage: invalid chunk")]
    InvalidChunk,

    /// The store has been closed.
    #[error("storage: closed")]
    Closed,
}
