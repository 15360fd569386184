//! Session flow errors.
//!
//! Every variant is terminal for the session that raised it and for nothing
//! else: the wave scheduler records the failure and keeps going.

use thiserror::Error;

use super::ParseError;

/// Result type for session flow steps
pub type FlowResult<T> = Result<T, FlowError>;

/// Why a session flow stopped before reaching `Done`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Connection, DNS, TLS or timeout failure below the HTTP layer
    #[error("Transport error on {path}: {message}")]
    Transport { path: String, message: String },

    /// Remote answered with a non-2xx HTTP status
    #[error("HTTP {status} from {path}")]
    HttpStatus { path: String, status: u16 },

    /// Remote answered 2xx but the application status was not zero
    #[error("{path} returned application status {status}")]
    AppStatus { path: String, status: i64 },

    /// Response or page data could not be interpreted
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The worker running the session panicked or was aborted
    #[error("Session task aborted: {0}")]
    Aborted(String),
}

impl FlowError {
    /// Short, stable tag attached to failed session results
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::HttpStatus { .. } | Self::AppStatus { .. } => "protocol",
            Self::Parse(err) => err.tag(),
            Self::Aborted(_) => "aborted",
        }
    }

    /// Whether the error is a protocol-level rejection by the target API
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::HttpStatus { .. } | Self::AppStatus { .. })
    }

    /// Whether the error happened below the HTTP layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_tags() {
        let http = FlowError::HttpStatus {
            path: "crossword".into(),
            status: 503,
        };
        let app = FlowError::AppStatus {
            path: "api/v1/plays".into(),
            status: 7,
        };
        assert_eq!(http.tag(), "protocol");
        assert_eq!(app.tag(), "protocol");
        assert!(http.is_protocol());
        assert!(!http.is_transport());
    }

    #[test]
    fn test_parse_error_converts_and_keeps_tag() {
        let err: FlowError = ParseError::MissingPageData.into();
        assert_eq!(err.tag(), "parse:page_data");
        assert_eq!(err.to_string(), "Embedded params block not found in page");
    }

    #[test]
    fn test_transport_display() {
        let err = FlowError::Transport {
            path: "date-picker".into(),
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Transport error on date-picker: connection refused"
        );
        assert_eq!(err.tag(), "transport");
    }
}
