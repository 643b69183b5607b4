use crate::db::DbError;
use crate::study::StudyServiceError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("study service lookup failed: {0}")]
    ExternalLookup(#[from] StudyServiceError),
    #[error("storage failure: {0}")]
    Persistence(#[from] DbError),
    #[error("{0}")]
    Overlap(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl SyncError {
    /// Maps a missing list to `NotFound`, every other storage error stays a
    /// persistence failure.
    pub fn from_list_lookup(error: DbError) -> Self {
        match error {
            DbError::NotFound(what) => SyncError::NotFound(what),
            other => SyncError::Persistence(other),
        }
    }
}
