//! Protocol error types

use thiserror::Error;

/// Errors from parsing or constructing line-protocol values
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A batch was constructed without a database name
    #[error("database name cannot be empty")]
    EmptyDatabase,

    /// A line started with a delimiter instead of a measurement name
    #[error("measurement name cannot be empty")]
    EmptyMeasurement,

    /// A line carried no field set
    #[error("point has no fields")]
    MissingFields,

    /// A field value did not match any line-protocol type
    #[error("invalid field value '{value}'")]
    InvalidFieldValue {
        /// The raw value text
        value: String,
    },

    /// The trailing timestamp was not a valid integer
    #[error("invalid timestamp '{value}'")]
    InvalidTimestamp {
        /// The raw timestamp text
        value: String,
    },

    /// Any other structural problem with a line
    #[error("malformed line: {reason}")]
    Malformed {
        /// What was wrong
        reason: String,
    },

    /// A multi-line parse failed; wraps the per-line error with its position
    #[error("line {line}: {source}")]
    InvalidLine {
        /// 1-based line number within the input
        line: usize,
        /// The underlying error
        #[source]
        source: Box<ProtocolError>,
    },
}

impl ProtocolError {
    /// Wrap an error with the 1-based line number it occurred on
    pub fn at_line(self, line: usize) -> Self {
        Self::InvalidLine {
            line,
            source: Box::new(self),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
