//! Error types shared across the log pipeline and the replay engine.
//!
//! Pipeline errors never abort a run: a malformed line is counted and skipped.
//! Flow errors are terminal for a single session only and are converted into a
//! structured failure result by the session flow. Configuration errors are
//! the only process-fatal kind.

pub mod config_error;
pub mod flow_error;
pub mod parse_error;

pub use config_error::{ConfigError, ConfigResult};
pub use flow_error::{FlowError, FlowResult};
pub use parse_error::{ParseError, ParseResult};
