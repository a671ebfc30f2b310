//! UCI engine session manager for Jieqi analysis.
//!
//! Drives an external search-engine subprocess over the UCI text protocol:
//! command dispatch, throttled output ingestion, line classification, and
//! an analysis/ponder state machine that resolves the races between
//! user-driven cancellation and the engine's own completion signal.

pub mod console;
pub mod session;
pub mod sync;
pub mod throttle;
pub mod timer;
pub mod transport;
pub mod uci;

pub use session::{
    AnalysisMode, AnalysisOutcome, AnalysisSettings, EngineLine, LineDirection, NullObserver,
    PendingFlags, RegisteredOption, RulesEngine, SearchVerdict, SessionObserver, SessionState,
    UciSession, START_FEN,
};
pub use transport::{ProcessTransport, Transport, TransportError};
pub use uci::{EngineReply, EngineScore};
