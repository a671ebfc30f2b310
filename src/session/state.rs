//! Data types owned by the engine session.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The Jieqi starting position, with every non-king piece face down and the
/// full hidden-piece pool.
pub const START_FEN: &str =
    "xxxxkxxxx/9/1x5x1/x1x1x1x1x/9/9/X1X1X1X1X/1X5X1/9/XXXXKXXXX w A2B2N2R2C2P5a2b2n2r2c2p5 0 1";

/// Direction of a logged protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LineDirection {
    Sent,
    Received,
}

/// One append-only entry of the diagnostic line log. Never mutated once
/// created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineLine {
    pub text: String,
    pub direction: LineDirection,
}

impl EngineLine {
    #[must_use]
    pub fn sent(text: impl Into<String>) -> Self {
        EngineLine {
            text: text.into(),
            direction: LineDirection::Sent,
        }
    }

    #[must_use]
    pub fn received(text: impl Into<String>) -> Self {
        EngineLine {
            text: text.into(),
            direction: LineDirection::Received,
        }
    }
}

/// The four recognized search-limit modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AnalysisMode {
    /// Fixed time per move (`go movetime`), infinite when the budget is 0.
    #[default]
    MoveTime,
    /// Clock-budget search (`go wtime .. btime .. movestogo 1`).
    MaxThinkTime,
    /// Fixed depth (`go depth`).
    Depth,
    /// Fixed node count (`go nodes`).
    Nodes,
}

/// Limits for one analysis call. Immutable per call; fields not set by the
/// caller come from `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisSettings {
    pub move_time_ms: u64,
    pub max_think_time_ms: u64,
    pub max_depth: u32,
    pub max_nodes: u64,
    pub mode: AnalysisMode,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            move_time_ms: 1000,
            max_think_time_ms: 5000,
            max_depth: 20,
            max_nodes: 1_000_000,
            mode: AnalysisMode::MoveTime,
        }
    }
}

/// Lifecycle of a search session. Exactly one state is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No open search. Initial state, and the state reached after every
    /// published outcome.
    #[default]
    Idle,
    /// A foreground search is running.
    Thinking,
    /// A user-issued `stop` is in flight; final once the matching
    /// `bestmove` arrives.
    Stopping,
    /// Targeted ponder on a predicted opponent move.
    Pondering,
    /// Unconditional background search, used when the predicted move comes
    /// from a concealed piece and a targeted ponder would be unsound.
    InfinitePondering,
}

impl SessionState {
    /// Whether either pondering variant is active.
    #[must_use]
    pub fn is_pondering(self) -> bool {
        matches!(
            self,
            SessionState::Pondering | SessionState::InfinitePondering
        )
    }
}

/// Short-lived disambiguation flags, cleared as soon as they are consumed.
/// An in-flight stop is not a flag; it is [`SessionState::Stopping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingFlags {
    /// Publish the engine's move when the in-flight stop resolves.
    pub play_best_move_on_stop: bool,
    /// Swallow the next `bestmove` line (the echo of a ponder stop).
    pub ignore_next_best_move: bool,
    /// A `ponderhit` was sent for the current search.
    pub ponder_hit_confirmed: bool,
}

/// What a completed search concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchVerdict {
    /// The engine's best move, as a UCI token.
    Best(String),
    /// The engine reported the null-move sentinel: no legal moves.
    NoLegalMoves,
}

/// Produced exactly once per completed or stopped search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub verdict: SearchVerdict,
    /// The engine's suggested reply to ponder on, if it offered one.
    pub ponder_hint: Option<String>,
    /// Wall time from search start, for natural completions.
    pub elapsed: Option<Duration>,
}

/// One registered UCI option, stored verbatim as declared by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredOption {
    pub name: String,
    pub raw: String,
}
