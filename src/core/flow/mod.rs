//! Simulated user sessions against the puzzle API.

pub mod grid;
pub mod page_data;
pub mod session;
pub mod transport;

pub use grid::GridState;
pub use page_data::{LoadTokenData, PlayMetadata, PuzzleCandidate};
pub use session::{
    FlowConfig, FlowState, PlayIteration, PlayUpdate, PostScoreReason, PuzzleSelection,
    SessionContext, SessionFlow, SessionOutcome, SessionReport,
};
pub use transport::{
    ApiMethod, ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportOptions,
};
