//! Universal Chess Interface (UCI) protocol support, client side.
//!
//! Classifies raw engine output lines and formats the commands the session
//! sends. Parsing never fails: malformed tokens degrade to "field absent"
//! rather than aborting line processing, and anything unrecognized is
//! [`EngineReply::Other`].

pub mod go;

pub use go::GoRequest;

/// The move reported by a `bestmove` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestMoveToken {
    /// A concrete UCI move such as `h2e2`.
    Move(String),
    /// The null-move sentinel: the engine has no legal move.
    NoLegalMoves,
}

/// A parsed `info` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoLine {
    /// Zero-based MultiPV index (`multipv N` token, defaulting to 0).
    pub multipv_index: usize,
    /// Move list following the `pv` token, if present.
    pub pv: Option<Vec<String>>,
    /// Whether the line carries a `score` token.
    pub has_score: bool,
    /// The raw line, retained verbatim for analysis display.
    pub raw: String,
}

/// One classified line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    /// `uciok` handshake line.
    UciOk,
    /// `readyok` handshake line.
    ReadyOk,
    /// An `option name ...` registration line.
    OptionDecl {
        name: String,
        raw: String,
    },
    /// An analysis (`info`/PV) line.
    Info(InfoLine),
    /// A `bestmove` line, with its optional ponder hint.
    BestMove {
        best: BestMoveToken,
        ponder: Option<String>,
    },
    /// Protocol noise: retained in the raw log only.
    Other,
}

/// A score reported on an `info` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScore {
    /// Centipawns from the side to move's perspective.
    Cp(i32),
    /// Mate in N moves (negative: getting mated).
    Mate(i32),
}

impl EngineScore {
    /// The same score seen from the other side.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            EngineScore::Cp(cp) => EngineScore::Cp(-cp),
            EngineScore::Mate(n) => EngineScore::Mate(-n),
        }
    }

    /// Collapse to a centipawn value, saturating mate scores to +/-10000
    /// the way the move-record bookkeeping expects.
    #[must_use]
    pub fn as_centipawns(self) -> i32 {
        match self {
            EngineScore::Cp(cp) => cp,
            EngineScore::Mate(n) => {
                if n > 0 {
                    10_000
                } else {
                    -10_000
                }
            }
        }
    }
}

/// Classify one raw line of engine output.
#[must_use]
pub fn classify(line: &str) -> EngineReply {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return EngineReply::Other;
    }
    if trimmed == "uciok" {
        return EngineReply::UciOk;
    }
    if trimmed == "readyok" {
        return EngineReply::ReadyOk;
    }
    if let Some(rest) = trimmed.strip_prefix("option name ") {
        return EngineReply::OptionDecl {
            name: option_name(rest),
            raw: trimmed.to_string(),
        };
    }
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.first() == Some(&"bestmove") {
        return classify_bestmove(trimmed);
    }
    let has_pv = tokens.iter().any(|t| *t == "pv");
    if tokens.first() == Some(&"info") || has_pv {
        return EngineReply::Info(InfoLine {
            multipv_index: multipv_index(&tokens),
            pv: pv_moves(&tokens),
            has_score: tokens.iter().any(|t| *t == "score"),
            raw: trimmed.to_string(),
        });
    }
    EngineReply::Other
}

/// Extract the most recent usable score from retained analysis lines,
/// newest first. Lines flagged `lowerbound`/`upperbound` are skipped.
#[must_use]
pub fn latest_score<'a, I>(lines: I) -> Option<EngineScore>
where
    I: IntoIterator<Item = &'a str>,
{
    lines.into_iter().find_map(|line| {
        if line.contains("lowerbound") || line.contains("upperbound") {
            return None;
        }
        parse_score(line)
    })
}

/// Parse the `score cp N` / `score mate N` field of a line, if present.
#[must_use]
pub fn parse_score(line: &str) -> Option<EngineScore> {
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if token != "score" {
            continue;
        }
        let kind = tokens.next()?;
        let value: i32 = tokens.next()?.parse().ok()?;
        return match kind {
            "cp" => Some(EngineScore::Cp(value)),
            "mate" => Some(EngineScore::Mate(value)),
            _ => None,
        };
    }
    None
}

/// Format a `position fen <fen> [moves ...]` command.
#[must_use]
pub fn position_command(fen: &str, moves: &[String]) -> String {
    if moves.is_empty() {
        format!("position fen {fen}")
    } else {
        format!("position fen {fen} moves {}", moves.join(" "))
    }
}

fn classify_bestmove(line: &str) -> EngineReply {
    let mut tokens = line.split_whitespace();
    tokens.next(); // "bestmove"

    let best = match tokens.next() {
        Some("(none)") | Some("none") | None => BestMoveToken::NoLegalMoves,
        Some(mv) => BestMoveToken::Move(mv.to_string()),
    };

    let mut ponder = None;
    while let Some(token) = tokens.next() {
        if token == "ponder" {
            ponder = tokens.next().map(str::to_string);
            break;
        }
    }

    EngineReply::BestMove { best, ponder }
}

/// Option name: tokens up to the `type` keyword.
fn option_name(rest: &str) -> String {
    let mut name_parts = Vec::new();
    for token in rest.split_whitespace() {
        if token == "type" {
            break;
        }
        name_parts.push(token);
    }
    name_parts.join(" ")
}

fn multipv_index(tokens: &[&str]) -> usize {
    for window in tokens.windows(2) {
        if window[0] == "multipv" {
            if let Ok(n) = window[1].parse::<usize>() {
                return n.saturating_sub(1);
            }
        }
    }
    0
}

fn pv_moves(tokens: &[&str]) -> Option<Vec<String>> {
    let pos = tokens.iter().position(|t| *t == "pv")?;
    let moves: Vec<String> = tokens[pos + 1..].iter().map(|t| (*t).to_string()).collect();
    Some(moves)
}
