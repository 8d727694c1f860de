//! Rendering boundary between the chat core and the terminal.
//!
//! The core produces three kinds of lines: chat messages
//! (`HH:MM:SS sender: body`, local time zone), status lines (history
//! markers, connection notices, farewell), and error notices. The
//! [`Render`] trait is the seam; [`StdoutRender`] is the production
//! implementation and [`BufferRender`] captures lines for tests.
//!
//! Both the history backfill and the live feed format messages through
//! [`format_message`], so the two paths cannot drift apart.

use std::io::Write;

use driftchat_store::message::Message;

/// Default timestamp display format (chrono format string).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Placeholder shown when a timestamp cannot be represented in local time.
const BAD_TIMESTAMP: &str = "--:--:--";

/// Sink for the ordered text lines the chat core produces.
pub trait Render: Send + Sync {
    /// Renders one chat message line.
    fn message(&self, message: &Message);

    /// Renders a status line (markers, notices, farewell).
    fn status(&self, line: &str);

    /// Renders an error notice.
    fn error(&self, line: &str);
}

/// Formats a message as `HH:MM:SS sender: body` in the local time zone.
#[must_use]
pub fn format_message(message: &Message, timestamp_format: &str) -> String {
    let ts = format_timestamp_millis(message.timestamp.as_millis(), timestamp_format);
    format!("{ts} {}: {}", message.sender, message.body)
}

/// Formats an epoch-millisecond timestamp in the local time zone.
///
/// Returns `--:--:--` for values outside the representable range.
fn format_timestamp_millis(ms: u64, format: &str) -> String {
    use chrono::{Local, TimeZone};
    let secs = (ms / 1000).cast_signed();
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format(format).to_string(),
        _ => BAD_TIMESTAMP.to_string(),
    }
}

/// Renders to stdout.
///
/// Chat output owns stdout; logs go to a file (see the binary's logging
/// setup), never here.
pub struct StdoutRender {
    timestamp_format: String,
}

impl StdoutRender {
    /// Creates a stdout renderer with the given timestamp format.
    #[must_use]
    pub const fn new(timestamp_format: String) -> Self {
        Self { timestamp_format }
    }

    fn write_line(line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

impl Render for StdoutRender {
    fn message(&self, message: &Message) {
        Self::write_line(&format_message(message, &self.timestamp_format));
    }

    fn status(&self, line: &str) {
        Self::write_line(line);
    }

    fn error(&self, line: &str) {
        Self::write_line(&format!("error: {line}"));
    }
}

/// One captured output line, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedLine {
    /// A chat message line, already formatted.
    Message(String),
    /// A status line.
    Status(String),
    /// An error notice.
    Error(String),
}

/// Captures rendered lines in memory for assertions.
pub struct BufferRender {
    lines: parking_lot::Mutex<Vec<RenderedLine>>,
    timestamp_format: String,
}

impl Default for BufferRender {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferRender {
    /// Creates an empty buffer renderer with the default timestamp format.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: parking_lot::Mutex::new(Vec::new()),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }

    /// Returns a snapshot of everything rendered so far, in order.
    #[must_use]
    pub fn lines(&self) -> Vec<RenderedLine> {
        self.lines.lock().clone()
    }

    /// Returns only the chat message lines, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|l| match l {
                RenderedLine::Message(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns only the error lines, in order.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|l| match l {
                RenderedLine::Error(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Render for BufferRender {
    fn message(&self, message: &Message) {
        self.lines
            .lock()
            .push(RenderedLine::Message(format_message(
                message,
                &self.timestamp_format,
            )));
    }

    fn status(&self, line: &str) {
        self.lines.lock().push(RenderedLine::Status(line.to_string()));
    }

    fn error(&self, line: &str) {
        self.lines.lock().push(RenderedLine::Error(line.to_string()));
    }
}
