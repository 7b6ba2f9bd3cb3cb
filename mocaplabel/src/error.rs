//! Error types for the marker labeling library

use thiserror::Error;

/// Result type alias for the labeling library
pub type Result<T> = std::result::Result<T, LabelError>;

/// Errors that abort a labeling run.
///
/// Everything else (unresolvable overrides, missing skeleton relations,
/// assignment ties, unrecognized hand schema) degrades into more
/// extrapolated frames and is only logged.
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Malformed frame row {row}: expected {expected} columns, got {found}")]
    MalformedFrameRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid coordinate in row {row}, column {column}: {value:?}")]
    InvalidCoordinate {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("Frame {got} applied out of order, expected frame {expected}")]
    FrameOutOfOrder { expected: usize, got: usize },

    #[error("Recording contains no frames")]
    EmptyRecording,

    #[error("No canonical markers left to label")]
    NoMarkers,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LabelError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed_row(row: usize, expected: usize, found: usize) -> Self {
        Self::MalformedFrameRow {
            row,
            expected,
            found,
        }
    }
}
