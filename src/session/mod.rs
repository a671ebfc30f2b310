//! Engine session manager.
//!
//! Owns the lifecycle of a search: command dispatch to the engine process,
//! throttled ingestion of its output, the analysis/ponder state machine,
//! and the precedence rules that resolve a `bestmove` line against
//! user-driven cancellation.
//!
//! All session-state mutation happens behind one mutex, so the flush-timer
//! callback and externally triggered calls never race. Observer callbacks
//! and outbound commands are dispatched after the lock is released.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::throttle::{contains_mate_score, FlushOutcome, ThrottleQueue};
use crate::timer::FlushTimer;
use crate::transport::{ProcessTransport, Transport, TransportError};
use crate::uci::{self, BestMoveToken, EngineReply, EngineScore, GoRequest, InfoLine};

mod ponder;
mod state;

pub use state::{
    AnalysisMode, AnalysisOutcome, AnalysisSettings, EngineLine, LineDirection, PendingFlags,
    RegisteredOption, SearchVerdict, SessionState, START_FEN,
};

/// Queries answered by the external rules engine. The session never parses
/// FEN itself; it only forwards the string and asks which squares still
/// hold a face-down piece.
pub trait RulesEngine: Send + Sync {
    fn current_fen(&self) -> String;
    fn is_concealed_piece_at(&self, square: &str) -> bool;
}

/// Events published by the session. All methods default to no-ops so
/// consumers implement only what they observe.
pub trait SessionObserver: Send + Sync {
    /// A line was sent to or received from the engine (diagnostic console).
    fn on_line(&self, _line: &EngineLine) {}
    /// The engine completed the handshake and reported ready.
    fn on_engine_ready(&self) {}
    /// A stop or ponder termination resolved; the caller may act again.
    fn on_ready_for_next(&self) {}
    /// A search published its outcome.
    fn on_outcome(&self, _outcome: &AnalysisOutcome) {}
    /// The PV list at a MultiPV index was replaced.
    fn on_pv_update(&self, _index: usize, _moves: &[String]) {}
    /// The human-readable analysis text changed.
    fn on_analysis_text(&self, _text: &str) {}
    /// The engine process terminated or closed its output stream.
    fn on_transport_closed(&self) {}
}

/// Observer that ignores every event.
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Deferred work produced while the session lock is held, dispatched after
/// it is released so observers may call back into the session.
enum Event {
    Command(String),
    EngineReady,
    ReadyForNext,
    Outcome(AnalysisOutcome),
    Pv(usize, Vec<String>),
    AnalysisText(String),
}

#[derive(Default)]
struct SessionInner {
    transport: Option<Arc<dyn Transport>>,
    ready: bool,
    state: SessionState,
    flags: PendingFlags,
    line_log: Vec<EngineLine>,
    options: Vec<RegisteredOption>,
    saved_options: Vec<(String, String)>,
    pv_table: Vec<Option<Vec<String>>>,
    primary_pv: Vec<String>,
    analysis_lines: Vec<Option<String>>,
    best_move: Option<String>,
    ponder_hint: Option<String>,
    analysis_start: Option<Instant>,
    last_elapsed: Option<Duration>,
    throttle: ThrottleQueue,
}

pub(crate) struct SessionCore {
    inner: Mutex<SessionInner>,
    rules: Arc<dyn RulesEngine>,
    observer: Arc<dyn SessionObserver>,
    timer: FlushTimer,
}

/// Handle to an engine session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct UciSession {
    core: Arc<SessionCore>,
}

impl UciSession {
    pub fn new(rules: Arc<dyn RulesEngine>, observer: Arc<dyn SessionObserver>) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<SessionCore>| {
            let timer_ref = weak.clone();
            let timer = FlushTimer::spawn(move || {
                if let Some(core) = timer_ref.upgrade() {
                    core.flush_due();
                }
            });
            SessionCore {
                inner: Mutex::new(SessionInner::default()),
                rules,
                observer,
                timer,
            }
        });
        UciSession { core }
    }

    /// Spawn the engine executable at `path`, attach it as the current
    /// transport and begin the `uci` handshake. Any previous engine
    /// process is dropped.
    ///
    /// The transport callbacks hold only a weak reference to the session,
    /// so dropping the last handle tears down the engine process and its
    /// reader thread rather than keeping them alive.
    pub fn load_engine(&self, path: &str) -> Result<(), TransportError> {
        let ingest = Arc::downgrade(&self.core);
        let closed = Arc::downgrade(&self.core);
        let transport = ProcessTransport::spawn(
            path,
            move |line| {
                if let Some(core) = ingest.upgrade() {
                    core.ingest_line(line);
                }
            },
            move || {
                if let Some(core) = closed.upgrade() {
                    core.notify_transport_closed();
                }
            },
        )?;
        self.attach_transport(transport);
        self.send("uci");
        Ok(())
    }

    /// Detach and terminate the current engine, if any. A requested unload
    /// does not emit the close notification.
    pub fn unload_engine(&self) {
        let transport = {
            let mut inner = self.core.inner.lock();
            let transport = inner.transport.take();
            inner.reset_for_new_engine();
            transport
        };
        self.core.timer.cancel();
        if let Some(transport) = transport {
            transport.shutdown();
        }
    }

    /// Attach an already-running transport, resetting all per-engine
    /// tables (options, PVs, line log).
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        let mut inner = self.core.inner.lock();
        inner.reset_for_new_engine();
        inner.transport = Some(transport);
    }

    /// Send one raw command line to the engine. No-op (with a diagnostic
    /// note) when no engine is attached; never blocks.
    pub fn send(&self, command: &str) {
        self.core.send(command);
    }

    /// `setoption name <name> value <value>`.
    pub fn set_option(&self, name: &str, value: &str) {
        self.send(&format!("setoption name {name} value {value}"));
    }

    /// Option values to re-apply automatically once the engine reports
    /// ready, e.g. restored from a per-engine settings store.
    pub fn set_saved_options(&self, options: Vec<(String, String)>) {
        self.core.inner.lock().saved_options = options;
    }

    /// Feed one raw line of engine output into the throttled ingestion
    /// path. Called by the transport's reader thread.
    pub fn ingest_line(&self, raw: String) {
        self.core.ingest_line(raw);
    }

    /// The transport reports that the engine process is gone. Fatal to the
    /// current session: everything resets to idle.
    pub fn notify_transport_closed(&self) {
        self.core.notify_transport_closed();
    }

    /// Start a foreground search on the rules engine's current position.
    /// No-op unless the engine is ready and the session idle.
    pub fn start_analysis(
        &self,
        settings: AnalysisSettings,
        moves: &[String],
        search_moves: &[String],
    ) {
        self.core.start_analysis(settings, moves, search_moves);
    }

    /// Request cancellation of the running search. The request is final
    /// only once the matching `bestmove` arrives; a second request while
    /// stopping is a no-op.
    pub fn stop_analysis(&self, play_best_move_on_stop: bool) {
        self.core.stop_analysis(play_best_move_on_stop);
    }

    // --- observation (read-only snapshots) ---

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.inner.lock().state
    }

    #[must_use]
    pub fn flags(&self) -> PendingFlags {
        self.core.inner.lock().flags
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.core.inner.lock().ready
    }

    #[must_use]
    pub fn is_thinking(&self) -> bool {
        self.core.inner.lock().state == SessionState::Thinking
    }

    #[must_use]
    pub fn best_move(&self) -> Option<String> {
        self.core.inner.lock().best_move.clone()
    }

    #[must_use]
    pub fn ponder_hint(&self) -> Option<String> {
        self.core.inner.lock().ponder_hint.clone()
    }

    #[must_use]
    pub fn primary_pv(&self) -> Vec<String> {
        self.core.inner.lock().primary_pv.clone()
    }

    /// The PV list at a MultiPV index, if that index has reported one.
    #[must_use]
    pub fn pv(&self, index: usize) -> Option<Vec<String>> {
        self.core.inner.lock().pv_table.get(index).cloned().flatten()
    }

    #[must_use]
    pub fn analysis_text(&self) -> String {
        self.core.inner.lock().analysis_text()
    }

    #[must_use]
    pub fn registered_options(&self) -> Vec<RegisteredOption> {
        self.core.inner.lock().options.clone()
    }

    /// Raw option declarations joined line by line, for an options dialog.
    #[must_use]
    pub fn options_text(&self) -> String {
        let inner = self.core.inner.lock();
        inner
            .options
            .iter()
            .map(|o| o.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn line_log(&self) -> Vec<EngineLine> {
        self.core.inner.lock().line_log.clone()
    }

    /// Elapsed wall time of the last naturally completed search.
    #[must_use]
    pub fn last_elapsed(&self) -> Option<Duration> {
        self.core.inner.lock().last_elapsed
    }

    /// The most recent usable score from the received-line log, negated
    /// while a targeted ponder is running (the engine is scoring the
    /// predicted position from the opponent's side).
    #[must_use]
    pub fn last_score(&self) -> Option<EngineScore> {
        let inner = self.core.inner.lock();
        let score = uci::latest_score(
            inner
                .line_log
                .iter()
                .rev()
                .filter(|l| l.direction == LineDirection::Received)
                .map(|l| l.text.as_str()),
        )?;
        if inner.state == SessionState::Pondering {
            Some(score.negated())
        } else {
            Some(score)
        }
    }
}

impl SessionCore {
    fn send(&self, command: &str) {
        let line = EngineLine::sent(command);
        let transport = {
            let mut inner = self.inner.lock();
            let Some(transport) = inner.transport.clone() else {
                log::debug!("send with no engine attached: {command}");
                return;
            };
            inner.line_log.push(line.clone());
            transport
        };
        self.observer.on_line(&line);
        if let Err(e) = transport.send_line(command) {
            log::warn!("engine send failed: {e}");
        }
    }

    fn notify_transport_closed(&self) {
        {
            let mut inner = self.inner.lock();
            inner.transport = None;
            inner.reset_for_new_engine();
        }
        self.timer.cancel();
        self.observer.on_transport_closed();
    }

    fn ingest_line(&self, raw: String) {
        let line = EngineLine::received(raw.clone());
        let deadline = {
            let mut inner = self.inner.lock();
            inner.line_log.push(line.clone());
            let mate = inner.mate_retained();
            inner.throttle.push(raw, Instant::now(), mate)
        };
        self.observer.on_line(&line);
        if let Some(deadline) = deadline {
            self.timer.schedule_at(deadline);
        }
    }

    /// Flush-timer callback: drain the pending buffer through the
    /// classifier, or re-arm if the minimum interval has not elapsed.
    fn flush_due(&self) {
        let mut events = Vec::new();
        let mut reschedule = None;
        {
            let mut inner = self.inner.lock();
            let mate = inner.mate_retained();
            match inner.throttle.flush(Instant::now(), mate) {
                FlushOutcome::Batch(lines) => {
                    for line in lines {
                        inner.handle_line(&line, &mut events);
                    }
                }
                FlushOutcome::Rescheduled(deadline) => reschedule = Some(deadline),
                FlushOutcome::Empty => {}
            }
        }
        if let Some(deadline) = reschedule {
            self.timer.schedule_at(deadline);
        }
        self.dispatch(events);
    }

    fn dispatch(&self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::Command(cmd) => self.send(&cmd),
                Event::EngineReady => self.observer.on_engine_ready(),
                Event::ReadyForNext => self.observer.on_ready_for_next(),
                Event::Outcome(outcome) => self.observer.on_outcome(&outcome),
                Event::Pv(index, moves) => self.observer.on_pv_update(index, &moves),
                Event::AnalysisText(text) => self.observer.on_analysis_text(&text),
            }
        }
    }

    fn start_analysis(&self, settings: AnalysisSettings, moves: &[String], search_moves: &[String]) {
        let fen = self.rules.current_fen();
        let commands = {
            let mut inner = self.inner.lock();
            if !inner.ready || inner.state != SessionState::Idle {
                log::debug!("start_analysis rejected in state {:?}", inner.state);
                return;
            }
            inner.begin_search(SessionState::Thinking);
            vec![
                uci::position_command(&fen, moves),
                GoRequest::new(settings)
                    .with_search_moves(search_moves.to_vec())
                    .to_command(),
            ]
        };
        for command in commands {
            self.send(&command);
        }
    }

    fn stop_analysis(&self, play_best_move_on_stop: bool) {
        let accepted = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Thinking {
                log::debug!("stop_analysis rejected in state {:?}", inner.state);
                false
            } else {
                inner.state = SessionState::Stopping;
                inner.flags.play_best_move_on_stop = play_best_move_on_stop;
                true
            }
        };
        if accepted {
            self.send("stop");
        }
    }
}

impl SessionInner {
    fn reset_for_new_engine(&mut self) {
        self.ready = false;
        self.state = SessionState::Idle;
        self.flags = PendingFlags::default();
        self.line_log.clear();
        self.options.clear();
        self.pv_table.clear();
        self.primary_pv.clear();
        self.analysis_lines.clear();
        self.best_move = None;
        self.ponder_hint = None;
        self.analysis_start = None;
        self.throttle.clear();
    }

    /// Reset per-search state on entry to a new search. An armed echo
    /// suppression outlives the search boundary: the bestmove echoed by a
    /// ponder stop may arrive after the next search has already started.
    fn begin_search(&mut self, state: SessionState) {
        self.state = state;
        self.flags = PendingFlags {
            ignore_next_best_move: self.flags.ignore_next_best_move,
            ..PendingFlags::default()
        };
        self.best_move = None;
        self.ponder_hint = None;
        self.pv_table.clear();
        self.primary_pv.clear();
        self.analysis_lines.clear();
        self.analysis_start = Some(Instant::now());
    }

    fn analysis_text(&self) -> String {
        self.analysis_lines
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn mate_retained(&self) -> bool {
        self.analysis_lines
            .iter()
            .flatten()
            .any(|line| contains_mate_score(line))
    }

    fn handle_line(&mut self, raw: &str, events: &mut Vec<Event>) {
        match uci::classify(raw) {
            EngineReply::UciOk => {
                events.push(Event::Command("isready".to_string()));
            }
            EngineReply::ReadyOk => {
                self.ready = true;
                for (name, value) in &self.saved_options {
                    events.push(Event::Command(format!(
                        "setoption name {name} value {value}"
                    )));
                }
                events.push(Event::EngineReady);
            }
            EngineReply::OptionDecl { name, raw } => {
                self.options.push(RegisteredOption { name, raw });
            }
            EngineReply::Info(info) => self.handle_info(info, events),
            EngineReply::BestMove { best, ponder } => {
                self.handle_best_move(best, ponder, events);
            }
            // Protocol noise: already retained in the raw log, no state change.
            EngineReply::Other => {}
        }
    }

    fn handle_info(&mut self, info: InfoLine, events: &mut Vec<Event>) {
        let index = info.multipv_index;
        if let Some(pv) = info.pv {
            if self.pv_table.len() <= index {
                self.pv_table.resize(index + 1, None);
            }
            self.pv_table[index] = Some(pv.clone());
            if index == 0 {
                self.primary_pv = pv.clone();
            }
            events.push(Event::Pv(index, pv));
        }
        if info.has_score && info.raw.starts_with("info") {
            if self.analysis_lines.len() <= index {
                self.analysis_lines.resize(index + 1, None);
            }
            self.analysis_lines[index] = Some(info.raw);
            events.push(Event::AnalysisText(self.analysis_text()));
        }
    }

    /// Resolve a `bestmove` line. Precedence: suppressed echo, stray
    /// completion, terminated ponder, acknowledged stop, natural
    /// completion.
    fn handle_best_move(
        &mut self,
        best: BestMoveToken,
        hint: Option<String>,
        events: &mut Vec<Event>,
    ) {
        if self.flags.ignore_next_best_move {
            self.flags.ignore_next_best_move = false;
            return;
        }

        if self.state == SessionState::Idle {
            log::debug!("stray bestmove discarded");
            return;
        }

        if self.state.is_pondering() {
            let play = self.flags.play_best_move_on_stop;
            self.flags = PendingFlags::default();
            self.state = SessionState::Idle;
            if play {
                let outcome = self.publish(best, hint, None);
                events.push(Event::Outcome(outcome));
            }
            events.push(Event::ReadyForNext);
            return;
        }

        if self.state == SessionState::Stopping {
            let play = self.flags.play_best_move_on_stop;
            self.flags = PendingFlags::default();
            self.state = SessionState::Idle;
            if play {
                let outcome = self.publish(best, hint, None);
                events.push(Event::Outcome(outcome));
            }
            events.push(Event::ReadyForNext);
            return;
        }

        // Natural completion of an uninterrupted search.
        let elapsed = self.analysis_start.map(|start| start.elapsed());
        self.last_elapsed = elapsed;
        self.flags = PendingFlags::default();
        self.state = SessionState::Idle;
        let outcome = self.publish(best, hint, elapsed);
        events.push(Event::Outcome(outcome));
        self.pv_table.clear();
        self.primary_pv.clear();
        self.analysis_lines.clear();
    }

    fn publish(
        &mut self,
        best: BestMoveToken,
        hint: Option<String>,
        elapsed: Option<Duration>,
    ) -> AnalysisOutcome {
        let verdict = match best {
            BestMoveToken::Move(mv) => {
                self.best_move = Some(mv.clone());
                SearchVerdict::Best(mv)
            }
            BestMoveToken::NoLegalMoves => {
                self.best_move = None;
                SearchVerdict::NoLegalMoves
            }
        };
        self.ponder_hint = hint.clone();
        AnalysisOutcome {
            verdict,
            ponder_hint: hint,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thinking_inner() -> SessionInner {
        let mut inner = SessionInner::default();
        inner.ready = true;
        inner.begin_search(SessionState::Thinking);
        inner
    }

    fn best(mv: &str) -> BestMoveToken {
        BestMoveToken::Move(mv.to_string())
    }

    #[test]
    fn test_ignore_flag_consumes_exactly_one_bestmove() {
        let mut inner = thinking_inner();
        inner.flags.ignore_next_best_move = true;

        let mut events = Vec::new();
        inner.handle_best_move(best("e2e4"), None, &mut events);
        assert!(events.is_empty());
        assert!(!inner.flags.ignore_next_best_move);
        // Still thinking: the suppressed line belonged to a different search.
        assert_eq!(inner.state, SessionState::Thinking);
    }

    #[test]
    fn test_stray_bestmove_in_idle_changes_nothing() {
        let mut inner = SessionInner::default();
        let mut events = Vec::new();
        inner.handle_best_move(best("e2e4"), None, &mut events);
        assert!(events.is_empty());
        assert!(inner.best_move.is_none());
        assert_eq!(inner.state, SessionState::Idle);
    }

    #[test]
    fn test_bestmove_while_pondering_clears_state_and_notifies() {
        let mut inner = SessionInner::default();
        inner.ready = true;
        inner.begin_search(SessionState::Pondering);

        let mut events = Vec::new();
        inner.handle_best_move(best("d2d4"), None, &mut events);
        assert_eq!(inner.state, SessionState::Idle);
        assert!(inner.best_move.is_none(), "move discarded without play intent");
        assert!(matches!(events.as_slice(), [Event::ReadyForNext]));
    }

    #[test]
    fn test_stopping_with_play_intent_publishes() {
        let mut inner = thinking_inner();
        inner.state = SessionState::Stopping;
        inner.flags.play_best_move_on_stop = true;

        let mut events = Vec::new();
        inner.handle_best_move(best("h2e2"), None, &mut events);
        assert_eq!(inner.state, SessionState::Idle);
        assert_eq!(inner.best_move.as_deref(), Some("h2e2"));
        assert!(matches!(
            events.as_slice(),
            [Event::Outcome(_), Event::ReadyForNext]
        ));
    }

    #[test]
    fn test_natural_completion_publishes_with_elapsed() {
        let mut inner = thinking_inner();
        let mut events = Vec::new();
        inner.handle_best_move(best("h2e2"), Some("h9g7".to_string()), &mut events);

        assert_eq!(inner.state, SessionState::Idle);
        assert_eq!(inner.best_move.as_deref(), Some("h2e2"));
        assert_eq!(inner.ponder_hint.as_deref(), Some("h9g7"));
        assert!(inner.last_elapsed.is_some());
        match events.as_slice() {
            [Event::Outcome(outcome)] => {
                assert_eq!(outcome.verdict, SearchVerdict::Best("h2e2".to_string()));
                assert!(outcome.elapsed.is_some());
            }
            other => panic!("expected one outcome event, got {} events", other.len()),
        }
    }

    #[test]
    fn test_null_move_sentinel_is_an_outcome_not_an_error() {
        let mut inner = thinking_inner();
        let mut events = Vec::new();
        inner.handle_best_move(BestMoveToken::NoLegalMoves, None, &mut events);
        match events.as_slice() {
            [Event::Outcome(outcome)] => {
                assert_eq!(outcome.verdict, SearchVerdict::NoLegalMoves);
            }
            other => panic!("expected one outcome event, got {} events", other.len()),
        }
    }

    #[test]
    fn test_natural_completion_clears_pv_tables() {
        let mut inner = thinking_inner();
        let mut events = Vec::new();
        inner.handle_info(
            InfoLine {
                multipv_index: 0,
                pv: Some(vec!["h2e2".to_string()]),
                has_score: true,
                raw: "info depth 5 score mate 3 pv h2e2".to_string(),
            },
            &mut events,
        );
        assert!(!inner.primary_pv.is_empty());
        assert!(inner.mate_retained());

        inner.handle_best_move(best("h2e2"), None, &mut events);
        assert!(inner.pv_table.is_empty());
        assert!(inner.primary_pv.is_empty());
        // Retained analysis lines go too, so a stale mate score cannot
        // keep the wide flush cadence between searches.
        assert!(inner.analysis_lines.is_empty());
        assert!(!inner.mate_retained());
    }

    #[test]
    fn test_sparse_multipv_backfills_lower_indices() {
        let mut inner = thinking_inner();
        let mut events = Vec::new();
        // Index 2 arrives before index 0 ever reported.
        inner.handle_line("info depth 8 multipv 3 score cp -5 pv c3c4", &mut events);
        assert_eq!(inner.pv_table.len(), 3);
        assert!(inner.pv_table[0].is_none());
        assert_eq!(inner.pv_table[2], Some(vec!["c3c4".to_string()]));

        inner.handle_line("info depth 8 multipv 1 score cp 22 pv h2e2", &mut events);
        assert_eq!(inner.pv_table[0], Some(vec!["h2e2".to_string()]));
        assert_eq!(inner.pv_table[2], Some(vec!["c3c4".to_string()]));
    }

    #[test]
    fn test_analysis_text_joins_known_indices_in_order() {
        let mut inner = thinking_inner();
        let mut events = Vec::new();
        inner.handle_line("info depth 8 multipv 2 score cp -5 pv c3c4", &mut events);
        inner.handle_line("info depth 8 multipv 1 score cp 22 pv h2e2", &mut events);
        assert_eq!(
            inner.analysis_text(),
            "info depth 8 multipv 1 score cp 22 pv h2e2\ninfo depth 8 multipv 2 score cp -5 pv c3c4"
        );
    }

    #[test]
    fn test_uciok_continues_handshake() {
        let mut inner = SessionInner::default();
        let mut events = Vec::new();
        inner.handle_line("uciok", &mut events);
        assert!(
            matches!(events.as_slice(), [Event::Command(cmd)] if cmd == "isready")
        );
    }

    #[test]
    fn test_readyok_applies_saved_options() {
        let mut inner = SessionInner::default();
        inner.saved_options = vec![("Threads".to_string(), "4".to_string())];
        let mut events = Vec::new();
        inner.handle_line("readyok", &mut events);
        assert!(inner.ready);
        match events.as_slice() {
            [Event::Command(cmd), Event::EngineReady] => {
                assert_eq!(cmd, "setoption name Threads value 4");
            }
            other => panic!("unexpected events: {} entries", other.len()),
        }
    }
}
