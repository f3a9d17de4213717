#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// No key ranges to search.
    #[error("No key ranges configured")]
    NoRanges,

    /// Range lower bound exceeds its upper bound.
    #[error("Inverted key range: min {min} exceeds max {max}")]
    InvertedRange { min: crate::Key, max: crate::Key },

    /// Range bound is not a valid hex number.
    #[error("Invalid hex bound: {0:?}")]
    InvalidBound(String),

    /// Block size must be positive.
    #[error("Block size must be positive")]
    ZeroBlockSize,

    /// Worker count must be positive.
    #[error("Worker count must be positive")]
    ZeroWorkers,

    /// Rotation period must be positive.
    #[error("Rotation period must be positive")]
    ZeroRotationPeriod,

    /// Ranges file could not be decoded.
    #[error("Malformed ranges file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;
