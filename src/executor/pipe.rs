//! Streaming of child process output into the log.
//!
//! Each pipe is drained line by line on its own thread. The last few lines
//! of stderr are kept and returned in the [`ExecutionResult`] of a failed
//! command, so a failing `hdiutil` or `installer` is reported with the
//! message it printed last.
//!
//! [`ExecutionResult`]: super::ExecutionResult

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};

/// Number of trailing lines kept per stream.
const TAIL_LINES: usize = 5;

/// Which pipe a line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

/// The last lines read from one stream.
#[derive(Debug, Default)]
pub(super) struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: String) {
        if self.lines.len() == TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Joins the kept lines with ` | ` for a single log record.
    pub(super) fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join(" | ")
    }
}

/// Extracts a human-readable message from a thread panic.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Drains `pipe`, logging every line, and returns its tail.
///
/// stdout is logged at INFO and stderr at WARN. Invalid UTF-8 is replaced
/// lossily and blank lines are not kept in the tail. A read error ends the
/// stream without failing the command.
pub(super) fn read_pipe_to_log<R: Read>(pipe: Option<R>, stream_type: StreamType) -> OutputTail {
    let mut tail = OutputTail::default();
    let Some(pipe) = pipe else {
        tracing::error!(stream = %stream_type, "pipe was not captured, output is lost");
        return tail;
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => {
                let content = line_buf.strip_suffix(b"\n").unwrap_or(&line_buf);
                let text = String::from_utf8_lossy(content);
                let line = text.trim_end_matches('\r');
                match stream_type {
                    StreamType::Stdout => tracing::info!(stream = %stream_type, "{}", line),
                    StreamType::Stderr => tracing::warn!(stream = %stream_type, "{}", line),
                }
                if !line.trim().is_empty() {
                    tail.push(line.to_string());
                }
            }
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    tail
}
