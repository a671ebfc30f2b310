//! Subprocess transport for UCI engines.
//!
//! Spawns the engine executable with piped stdio and delivers one event per
//! line of its output from a reader thread. Sending a command is
//! fire-and-forget; the session never waits on the transport.

use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::sync::ShutdownFlag;

/// Transport-level failures. The only error class fatal to the current
/// session.
#[derive(Debug)]
pub enum TransportError {
    /// The engine process could not be started.
    SpawnFailed { path: String, source: io::Error },
    /// The engine process is missing a stdio pipe.
    MissingPipe { which: &'static str },
    /// Writing a command to the engine failed.
    WriteFailed(io::Error),
    /// No engine process is attached.
    NotRunning,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::SpawnFailed { path, source } => {
                write!(f, "failed to spawn engine '{path}': {source}")
            }
            TransportError::MissingPipe { which } => {
                write!(f, "engine process has no {which} pipe")
            }
            TransportError::WriteFailed(e) => write!(f, "failed to write to engine: {e}"),
            TransportError::NotRunning => write!(f, "engine not running"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::SpawnFailed { source, .. } => Some(source),
            TransportError::WriteFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Writes newline-terminated command lines to an attached engine.
pub trait Transport: Send + Sync {
    fn send_line(&self, line: &str) -> Result<(), TransportError>;

    /// Stop any background machinery and terminate the engine process, if
    /// this transport owns one. Defaults to a no-op.
    fn shutdown(&self) {}
}

/// A [`Transport`] backed by a spawned engine process.
///
/// Stdout is read line by line on a dedicated thread; each line is handed
/// to the `on_line` callback, and `on_closed` fires once when the stream
/// ends without a requested shutdown (the process died or closed stdout).
pub struct ProcessTransport {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    shutdown: ShutdownFlag,
}

impl ProcessTransport {
    pub fn spawn<L, C>(path: &str, on_line: L, on_closed: C) -> Result<Arc<Self>, TransportError>
    where
        L: Fn(String) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| TransportError::SpawnFailed {
                path: path.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe { which: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe { which: "stdout" })?;

        let transport = Arc::new(ProcessTransport {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            shutdown: ShutdownFlag::new(),
        });

        let shutdown = transport.shutdown.clone();
        thread::Builder::new()
            .name("engine-reader".to_string())
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    if shutdown.is_set() {
                        return;
                    }
                    match line {
                        Ok(text) => on_line(text),
                        Err(e) => {
                            log::warn!("engine stdout read error: {e}");
                            break;
                        }
                    }
                }
                if !shutdown.is_set() {
                    log::info!("engine stdout closed");
                    on_closed();
                }
            })
            .expect("failed to spawn engine reader thread");

        Ok(transport)
    }

}

impl Transport for ProcessTransport {
    /// Stop the reader thread and kill the engine process.
    fn shutdown(&self) {
        self.shutdown.set();
        let mut child = self.child.lock();
        let _ = child.kill();
        let _ = child.wait();
    }

    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        if self.shutdown.is_set() {
            return Err(TransportError::NotRunning);
        }
        let mut stdin = self.stdin.lock();
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush())
            .map_err(TransportError::WriteFailed)
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.shutdown.set();
        let mut child = self.child.lock();
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_failure_is_reported() {
        let result = ProcessTransport::spawn("/nonexistent/engine-binary", |_| {}, || {});
        match result {
            Err(TransportError::SpawnFailed { path, .. }) => {
                assert_eq!(path, "/nonexistent/engine-binary");
            }
            other => panic!("expected spawn failure, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_lines_are_delivered_and_close_is_signalled() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (line_tx, line_rx) = mpsc::channel();
        let (close_tx, close_rx) = mpsc::channel();

        // `cat` echoes stdin back per line, then closes stdout on EOF.
        let transport = ProcessTransport::spawn(
            "/bin/cat",
            move |line| {
                let _ = line_tx.send(line);
            },
            move || {
                let _ = close_tx.send(());
            },
        )
        .expect("cat should spawn");

        transport.send_line("uci").unwrap();
        assert_eq!(
            line_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "uci"
        );

        // Kill without a requested shutdown, so on_closed must fire.
        {
            let mut child = transport.child.lock();
            let _ = child.kill();
            let _ = child.wait();
        }
        close_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("close notification");
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_kills_engine_and_stops_reader() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (line_tx, line_rx) = mpsc::channel();
        let transport = ProcessTransport::spawn(
            "/bin/cat",
            move |line| {
                let _ = line_tx.send(line);
            },
            || {},
        )
        .expect("cat should spawn");

        transport.send_line("ping").unwrap();
        assert_eq!(
            line_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "ping"
        );

        // Dropping the last handle kills the child; the reader thread sees
        // EOF and exits, dropping its end of the channel.
        drop(transport);
        match line_rx.recv_timeout(Duration::from_secs(2)) {
            Err(mpsc::RecvTimeoutError::Disconnected) => {}
            other => panic!("reader thread still running: {other:?}"),
        }
    }
}
