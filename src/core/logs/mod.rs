//! Log mining pipeline.
//!
//! Raw production log lines are turned into a chronologically ordered stream
//! of [`TrafficEvent`]s with inter-arrival delays and per-user last-request
//! markers, ready to be written as JSONL and replayed.

pub mod distill;
pub mod endpoint;
pub mod extractor;
pub mod identity;
pub mod merge;
pub mod pipeline;
pub mod prepare;
pub mod record;
pub mod sequence;
pub mod timestamp;

pub use distill::{LogRecord, distill_line};
pub use endpoint::{CANONICAL_GAME_PATH, EndpointProfile};
pub use extractor::{EventExtractor, Extraction, ExtractionStats, SkipReason};
pub use identity::{IdentityResolver, IdentitySource, ResolvedIdentity};
pub use merge::{MergeOptions, MultiSourceMerger, merge_streams};
pub use pipeline::{ExtractedStream, LossyLines, extract_lines, extract_reader};
pub use prepare::{PrepareOptions, PrepareReport, normalize_for_replay};
pub use record::{EventStream, TrafficEvent, read_events, write_events};
pub use sequence::SequenceBuilder;
pub use timestamp::{UNKNOWN_TIMESTAMP, parse_log_timestamp};
