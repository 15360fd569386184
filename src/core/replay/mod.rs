//! Replay of mined traffic against a live target.

pub mod executor;

pub use executor::{
    DEFAULT_PREWARM_CONCURRENCY, ReplayEventResult, ReplayOptions, ReplayReport, ReplaySummary,
    TrafficReplayer,
};
