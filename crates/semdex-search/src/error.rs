//! Search error types.

use thiserror::Error;

/// Errors that can occur during query evaluation.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The regex form of a query failed to compile
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}
