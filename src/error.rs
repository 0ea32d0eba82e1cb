use thiserror::Error;

pub type ChalkDBResult<T, E = ChalkDBError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum ChalkDBError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bad scan operator: {0}")]
    BadOperator(String),

    #[error("Bad scan range: low bound exceeds high bound")]
    BadRange,

    #[error("No key in the index satisfies the scan range")]
    NoMatch,

    #[error("No scan in progress")]
    ScanNotStarted,

    #[error("Scan has consumed every entry in its range")]
    ScanCompleted,
}
