//! Storage Layer
//!
//! Keeps the current assessment per user behind a repository trait.

mod repository;

pub use repository::{AssessmentRepository, InMemoryAssessmentRepository, StoredAssessment};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),
}
