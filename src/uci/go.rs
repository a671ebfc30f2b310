//! Construction of `go` commands from analysis settings.

use crate::session::{AnalysisMode, AnalysisSettings};

/// A fully specified search request, formatted as one `go` line.
///
/// The four recognized modes and their parameters are closed in
/// [`AnalysisMode`]; there is no string-keyed overlay merging.
#[derive(Debug, Clone)]
pub struct GoRequest {
    settings: AnalysisSettings,
    ponder: bool,
    search_moves: Vec<String>,
}

impl GoRequest {
    #[must_use]
    pub fn new(settings: AnalysisSettings) -> Self {
        GoRequest {
            settings,
            ponder: false,
            search_moves: Vec::new(),
        }
    }

    /// Mark this as a `go ponder` search.
    #[must_use]
    pub fn ponder(mut self) -> Self {
        self.ponder = true;
        self
    }

    /// Restrict the search to the given root moves.
    #[must_use]
    pub fn with_search_moves(mut self, moves: Vec<String>) -> Self {
        self.search_moves = moves;
        self
    }

    /// Format the command line to send to the engine.
    #[must_use]
    pub fn to_command(&self) -> String {
        let mut cmd = String::from("go");
        if self.ponder {
            cmd.push_str(" ponder");
        }
        match self.settings.mode {
            AnalysisMode::Depth => {
                cmd.push_str(&format!(" depth {}", self.settings.max_depth));
            }
            AnalysisMode::Nodes => {
                cmd.push_str(&format!(" nodes {}", self.settings.max_nodes));
            }
            AnalysisMode::MoveTime => {
                if self.settings.move_time_ms == 0 {
                    cmd.push_str(" infinite");
                } else {
                    cmd.push_str(&format!(" movetime {}", self.settings.move_time_ms));
                }
            }
            AnalysisMode::MaxThinkTime => {
                let budget = self.settings.max_think_time_ms;
                cmd.push_str(&format!(" wtime {budget} btime {budget} movestogo 1"));
            }
        }
        if !self.search_moves.is_empty() {
            cmd.push_str(" searchmoves ");
            cmd.push_str(&self.search_moves.join(" "));
        }
        cmd
    }
}

/// An unconditional infinite search, used when a targeted ponder is unsound.
#[must_use]
pub fn go_infinite() -> String {
    "go infinite".to_string()
}
