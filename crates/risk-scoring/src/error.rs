//! Questionnaire validation errors

use thiserror::Error;

/// Rejected questionnaire input. Scoring never starts on invalid input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("{field} contains a blank entry at index {index}")]
    BlankEntry { field: &'static str, index: usize },
}
