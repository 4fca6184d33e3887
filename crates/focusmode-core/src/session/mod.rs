mod controller;
mod finalize;
mod state;

pub use controller::{Effect, Input, SessionConfig, SessionController, DEFAULT_POINTS_PER_SECOND};
pub use finalize::finalize;
pub use state::{
    format_elapsed, FinalizeReport, FinalizeRequest, SessionId, SessionPhase, SessionSnapshot,
    SessionSummary, SubmissionStatus,
};
