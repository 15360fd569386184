//! Fixed-rate wave runs of full sessions.

pub mod scheduler;
pub mod stats;

pub use scheduler::{FlowLauncher, SessionLauncher, WAVE_INTERVAL, WaveScheduler};
pub use stats::{LatencySummary, RunResult, SessionRecord, StepAverages, WaveResult};
