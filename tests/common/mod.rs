//! Shared fixtures: a scriptable transport, a canned rules engine and a
//! collecting observer.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use jieqi_uci::{
    AnalysisOutcome, EngineLine, RulesEngine, SessionObserver, Transport, TransportError,
    UciSession,
};

pub const TEST_FEN: &str = "4k4/9/9/9/9/9/9/9/9/4K4 w - 0 1";

/// Records every command the session sends; never fails.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<String>>,
    pub shutdowns: Mutex<usize>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Transport for MockTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn shutdown(&self) {
        *self.shutdowns.lock() += 1;
    }
}

pub struct MockRules {
    pub fen: String,
    pub concealed: Mutex<HashSet<String>>,
}

impl MockRules {
    pub fn new() -> Self {
        MockRules {
            fen: TEST_FEN.to_string(),
            concealed: Mutex::new(HashSet::new()),
        }
    }

    pub fn conceal(&self, square: &str) {
        self.concealed.lock().insert(square.to_string());
    }
}

impl RulesEngine for MockRules {
    fn current_fen(&self) -> String {
        self.fen.clone()
    }

    fn is_concealed_piece_at(&self, square: &str) -> bool {
        self.concealed.lock().contains(square)
    }
}

#[derive(Default)]
pub struct CollectingObserver {
    pub outcomes: Mutex<Vec<AnalysisOutcome>>,
    pub ready_for_next: Mutex<usize>,
    pub engine_ready: Mutex<usize>,
    pub lines: Mutex<Vec<EngineLine>>,
    pub transport_closed: Mutex<usize>,
}

impl SessionObserver for CollectingObserver {
    fn on_outcome(&self, outcome: &AnalysisOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }

    fn on_ready_for_next(&self) {
        *self.ready_for_next.lock() += 1;
    }

    fn on_engine_ready(&self) {
        *self.engine_ready.lock() += 1;
    }

    fn on_line(&self, line: &EngineLine) {
        self.lines.lock().push(line.clone());
    }

    fn on_transport_closed(&self) {
        *self.transport_closed.lock() += 1;
    }
}

pub struct Fixture {
    pub session: UciSession,
    pub transport: Arc<MockTransport>,
    pub rules: Arc<MockRules>,
    pub observer: Arc<CollectingObserver>,
}

/// A session with a mock transport attached, handshake not yet performed.
pub fn fixture() -> Fixture {
    let transport = Arc::new(MockTransport::default());
    let rules = Arc::new(MockRules::new());
    let observer = Arc::new(CollectingObserver::default());
    let session = UciSession::new(rules.clone(), observer.clone());
    session.attach_transport(transport.clone());
    Fixture {
        session,
        transport,
        rules,
        observer,
    }
}

/// A session that already completed the `uciok`/`readyok` handshake.
pub fn ready_fixture() -> Fixture {
    let fx = fixture();
    fx.session.ingest_line("uciok".to_string());
    pump();
    fx.session.ingest_line("readyok".to_string());
    pump();
    fx
}

/// Wait long enough for the flush timer to deliver pending lines.
pub fn pump() {
    thread::sleep(Duration::from_millis(150));
}
