//! Ponder control: thinking on the opponent's time.
//!
//! The decision between a targeted `go ponder` and an unconditional
//! infinite search is driven by a Jieqi-specific quirk: a move that
//! originates from a still-concealed piece cannot be soundly pondered,
//! because the piece's true identity (and therefore the opponent's legal
//! replies) is unknown until it is revealed by moving.

use std::time::Instant;

use super::{AnalysisSettings, PendingFlags, SessionCore, SessionState, UciSession};
use crate::uci::{self, go, GoRequest};

impl UciSession {
    /// Begin pondering on the opponent's predicted reply.
    ///
    /// When the predicted move's source square holds a concealed piece the
    /// session enters [`SessionState::InfinitePondering`] and searches the
    /// current position unconditionally; otherwise it enters
    /// [`SessionState::Pondering`] with the predicted move appended to the
    /// position. No-op if a ponder is already running.
    pub fn start_ponder(
        &self,
        fen: &str,
        moves_so_far: &[String],
        expected_opponent_move: &str,
        settings: AnalysisSettings,
    ) {
        self.core
            .start_ponder(fen, moves_so_far, expected_opponent_move, settings);
    }

    /// The predicted move was actually played: promote the ponder search
    /// to a real one. No-op unless a targeted ponder is running.
    pub fn ponder_hit(&self) {
        self.core.ponder_hit();
    }

    /// Terminate the ponder search. With `play_best_move_on_stop` after a
    /// confirmed ponder hit the eventual `bestmove` is published;
    /// otherwise it is a byproduct of stopping an exploratory ponder and
    /// is suppressed.
    pub fn stop_ponder(&self, play_best_move_on_stop: bool) {
        self.core.stop_ponder(play_best_move_on_stop);
    }
}

impl SessionCore {
    fn start_ponder(
        &self,
        fen: &str,
        moves_so_far: &[String],
        expected: &str,
        settings: AnalysisSettings,
    ) {
        let source_square = expected.get(0..2).unwrap_or("");
        let concealed = self.rules.is_concealed_piece_at(source_square);

        let commands = {
            let mut inner = self.inner.lock();
            if inner.state.is_pondering() {
                return;
            }
            if !inner.ready || inner.state != SessionState::Idle {
                log::debug!("start_ponder rejected in state {:?}", inner.state);
                return;
            }
            if concealed {
                // The concealed piece's identity is unknown until reveal, so
                // search the position as it stands instead of the prediction.
                inner.begin_search(SessionState::InfinitePondering);
                vec![uci::position_command(fen, moves_so_far), go::go_infinite()]
            } else {
                inner.begin_search(SessionState::Pondering);
                let mut moves = moves_so_far.to_vec();
                moves.push(expected.to_string());
                vec![
                    uci::position_command(fen, &moves),
                    GoRequest::new(settings).ponder().to_command(),
                ]
            }
        };
        for command in commands {
            self.send(&command);
        }
    }

    fn ponder_hit(&self) {
        let accepted = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Pondering {
                log::debug!("ponder_hit rejected in state {:?}", inner.state);
                false
            } else {
                inner.flags.ponder_hit_confirmed = true;
                inner.state = SessionState::Thinking;
                // The real clock starts now.
                inner.analysis_start = Some(Instant::now());
                true
            }
        };
        if accepted {
            self.send("ponderhit");
        }
    }

    fn stop_ponder(&self, play_best_move_on_stop: bool) {
        let accepted = {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Pondering | SessionState::InfinitePondering => {
                    // Exploratory ponder: the upcoming bestmove is a
                    // byproduct of the stop and must be suppressed.
                    inner.flags = PendingFlags {
                        ignore_next_best_move: true,
                        ..PendingFlags::default()
                    };
                    inner.best_move = None;
                    inner.state = SessionState::Idle;
                    true
                }
                SessionState::Thinking if inner.flags.ponder_hit_confirmed => {
                    if play_best_move_on_stop {
                        inner.flags = PendingFlags {
                            play_best_move_on_stop: true,
                            ..PendingFlags::default()
                        };
                        inner.state = SessionState::Stopping;
                    } else {
                        inner.flags = PendingFlags {
                            ignore_next_best_move: true,
                            ..PendingFlags::default()
                        };
                        inner.best_move = None;
                        inner.state = SessionState::Idle;
                    }
                    true
                }
                _ => {
                    log::debug!("stop_ponder rejected in state {:?}", inner.state);
                    false
                }
            }
        };
        if accepted {
            self.send("stop");
        }
    }
}
