//! Compensation error types

use contracts::ContractError;
use sync_engine::ClockError;
use thiserror::Error;

/// Compensation errors
#[derive(Debug, Error)]
pub enum CompensationError {
    /// No clock offset has been committed yet
    #[error("clock not synced")]
    NotSynced,

    /// Persisted state could not be written or cleared
    #[error("persistence error: {0}")]
    Persistence(#[from] ContractError),
}

impl From<ClockError> for CompensationError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::NotSynced => Self::NotSynced,
        }
    }
}

/// Compensation Result type alias
pub type Result<T> = std::result::Result<T, CompensationError>;
