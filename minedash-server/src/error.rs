use minedash_core::{EnvelopeError, GenerationError, ReadingError, WarehouseError};
use thiserror::Error;

/// Any failure of a single analysis request. All variants become the same
/// `500 Error: ...` response; the variant only feeds the logs.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Reading(#[from] ReadingError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

impl AnalysisError {
    /// Pipeline step that failed, for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::Envelope(_) => "decode",
            AnalysisError::Reading(ReadingError::Coercion(_)) => "coerce",
            AnalysisError::Reading(_) => "parse",
            AnalysisError::Generation(_) => "generate",
            AnalysisError::Warehouse(_) => "insert",
        }
    }
}
