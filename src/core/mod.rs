pub mod flow;
pub mod logs;
pub mod replay;
pub mod wave;

pub use flow::{
    FlowConfig, HttpTransport, PuzzleSelection, ReqwestTransport, SessionFlow, SessionReport,
    TransportOptions,
};
pub use logs::{EndpointProfile, EventExtractor, TrafficEvent};
pub use replay::{ReplayOptions, ReplaySummary, TrafficReplayer};
pub use wave::{FlowLauncher, RunResult, SessionLauncher, WaveScheduler};
