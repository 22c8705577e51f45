//! Error taxonomy shared by every stage of the delineation pipeline.

use thiserror::Error;

/// Errors surfaced by the segmentation core.
///
/// An empty crown set is not an error: the entry points return `Ok(vec![])`
/// when no seed is found or no region survives filtering.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrownError {
    /// Invalid parameter, rejected before any computation starts.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Input data that cannot be processed (empty grid, mismatched lengths...).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
}

impl CrownError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CrownError::Configuration(msg.into())
    }

    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        CrownError::DegenerateInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CrownError>;
