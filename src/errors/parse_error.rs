//! Parse errors raised while interpreting log lines, event records and
//! embedded page data.

use thiserror::Error;

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Something that looked like data of interest could not be interpreted.
///
/// This is distinct from "nothing of interest on this line", which the
/// extractor reports as a skip rather than an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Log timestamp could not be converted to epoch milliseconds
    #[error("Invalid log timestamp: '{0}'")]
    InvalidTimestamp(String),

    /// Event record line is not a valid JSON event
    #[error("Malformed event record: {0}")]
    MalformedRecord(String),

    /// The `<script id="params">` block is absent from an HTML page
    #[error("Embedded params block not found in page")]
    MissingPageData,

    /// A required field is missing from decoded data
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// Base64 decoding failed
    #[error("Invalid base64 in '{field}': {error}")]
    InvalidBase64 { field: &'static str, error: String },

    /// JSON decoding failed
    #[error("Invalid JSON in {context}: {error}")]
    InvalidJson { context: &'static str, error: String },
}

impl ParseError {
    /// Short, stable tag used in session failure results
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InvalidTimestamp(_) => "parse:timestamp",
            Self::MalformedRecord(_) => "parse:record",
            Self::MissingPageData => "parse:page_data",
            Self::MissingField(_) => "parse:missing_field",
            Self::InvalidBase64 { .. } => "parse:base64",
            Self::InvalidJson { .. } => "parse:json",
        }
    }

    pub(crate) fn json(context: &'static str, error: serde_json::Error) -> Self {
        Self::InvalidJson {
            context,
            error: error.to_string(),
        }
    }
}
