#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// One malformed entry. It has already been removed from the queue.
    #[error("malformed queue entry: {source}")]
    Decode {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode job: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("malformed cache entry for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;
pub type CacheResult<T> = Result<T, CacheError>;
