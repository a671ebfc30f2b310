//! Interactive console driver for the session manager.
//!
//! Spawns the engine given on the command line, runs the handshake and
//! maps simple stdin commands onto the session, printing observer events
//! as they arrive. Useful as a diagnostic console and as a reference for
//! embedding the session in a host application.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::{
    AnalysisMode, AnalysisOutcome, AnalysisSettings, EngineLine, LineDirection, RulesEngine,
    SearchVerdict, SessionObserver, UciSession, START_FEN,
};

/// Rules-engine stand-in driven by console commands: the position is
/// whatever FEN was last set, and squares are concealed on request.
struct ConsoleRules {
    fen: Mutex<String>,
    concealed: Mutex<HashSet<String>>,
}

impl ConsoleRules {
    fn new() -> Self {
        ConsoleRules {
            fen: Mutex::new(START_FEN.to_string()),
            concealed: Mutex::new(HashSet::new()),
        }
    }
}

impl RulesEngine for ConsoleRules {
    fn current_fen(&self) -> String {
        self.fen.lock().clone()
    }

    fn is_concealed_piece_at(&self, square: &str) -> bool {
        self.concealed.lock().contains(square)
    }
}

struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_line(&self, line: &EngineLine) {
        match line.direction {
            LineDirection::Sent => println!(">> {}", line.text),
            LineDirection::Received => println!("<< {}", line.text),
        }
    }

    fn on_engine_ready(&self) {
        println!("[engine ready]");
    }

    fn on_ready_for_next(&self) {
        println!("[ready for next action]");
    }

    fn on_outcome(&self, outcome: &AnalysisOutcome) {
        match &outcome.verdict {
            SearchVerdict::Best(mv) => {
                let elapsed = outcome
                    .elapsed
                    .map(|d| format!(" in {}ms", d.as_millis()))
                    .unwrap_or_default();
                println!("[best move {mv}{elapsed}]");
            }
            SearchVerdict::NoLegalMoves => println!("[no legal moves]"),
        }
    }

    fn on_transport_closed(&self) {
        println!("[engine terminated]");
    }
}

fn parse_settings(args: &[&str]) -> AnalysisSettings {
    let mut settings = AnalysisSettings::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let value = iter.next();
        match (*arg, value) {
            ("depth", Some(v)) => {
                settings.mode = AnalysisMode::Depth;
                settings.max_depth = v.parse().unwrap_or(settings.max_depth);
            }
            ("nodes", Some(v)) => {
                settings.mode = AnalysisMode::Nodes;
                settings.max_nodes = v.parse().unwrap_or(settings.max_nodes);
            }
            ("movetime", Some(v)) => {
                settings.mode = AnalysisMode::MoveTime;
                settings.move_time_ms = v.parse().unwrap_or(settings.move_time_ms);
            }
            ("thinktime", Some(v)) => {
                settings.mode = AnalysisMode::MaxThinkTime;
                settings.max_think_time_ms = v.parse().unwrap_or(settings.max_think_time_ms);
            }
            _ => {}
        }
    }
    settings
}

/// Run the console until EOF or `quit`.
pub fn run() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().filter_or(
        env_logger::DEFAULT_FILTER_ENV,
        "info",
    ));

    let mut args = std::env::args().skip(1);
    let Some(engine_path) = args.next() else {
        eprintln!("usage: jieqi_uci <engine-path>");
        return Ok(());
    };

    let rules = Arc::new(ConsoleRules::new());
    let session = UciSession::new(rules.clone(), Arc::new(ConsoleObserver));
    if let Err(e) = session.load_engine(&engine_path) {
        eprintln!("error: {e}");
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        stdout.flush()?;
        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["fen", rest @ ..] => {
                *rules.fen.lock() = rest.join(" ");
            }
            ["conceal", square] => {
                rules.concealed.lock().insert((*square).to_string());
            }
            ["analyze", rest @ ..] => {
                session.start_analysis(parse_settings(rest), &[], &[]);
            }
            ["stop"] => session.stop_analysis(false),
            ["stop!"] => session.stop_analysis(true),
            ["ponder", mv, rest @ ..] => {
                session.start_ponder(&rules.current_fen(), &[], mv, parse_settings(rest));
            }
            ["ponderhit"] => session.ponder_hit(),
            ["stopponder"] => session.stop_ponder(false),
            ["stopponder!"] => session.stop_ponder(true),
            ["options"] => println!("{}", session.options_text()),
            ["state"] => println!("{:?}", session.state()),
            ["send", rest @ ..] => session.send(&rest.join(" ")),
            other => {
                eprintln!("unknown command: {}", other.join(" "));
            }
        }
    }
    Ok(())
}
