//! Operator console served on the station UART.
//!
//! Bytes from the serial link are assembled into lines by
//! [`ConsoleSession`] and executed with [`valve_core::console::execute`].
//! On hardware the session drives a [`StationConsole`], which talks to the
//! valve task through the link instead of owning the engine.

use core::fmt::{self, Write as _};
use core::str;

use heapless::{String, Vec};
use valve_core::console::{CommandError, JigControl, Reply, StatsSummary, execute};
use valve_core::valve::{MeterType, Session};

use crate::link::{self, StationControl, StationSnapshot};
use crate::telemetry;

/// Maximum number of bytes accepted on a single console line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;
pub const REPLY_CAPACITY: usize = 256;

pub type ReplyText = String<REPLY_CAPACITY>;

/// Line assembly failures. The offending line is discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineError {
    Overflow,
    InvalidUtf8,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::Overflow => write!(f, "ERR line longer than {MAX_LINE_LEN} bytes"),
            LineError::InvalidUtf8 => f.write_str("ERR line is not UTF-8"),
        }
    }
}

/// Result of feeding one byte to the session.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// The line is still being typed.
    Pending,
    /// A terminator arrived on an empty or whitespace-only line.
    Blank,
    Executed(Result<Reply, CommandError>),
}

/// Line-oriented console state on top of a [`JigControl`].
pub struct ConsoleSession<J> {
    jig: J,
    buffer: Vec<u8, MAX_LINE_LEN>,
}

impl<J: JigControl> ConsoleSession<J> {
    pub const fn new(jig: J) -> Self {
        Self {
            jig,
            buffer: Vec::new(),
        }
    }

    pub fn jig_mut(&mut self) -> &mut J {
        &mut self.jig
    }

    /// Feeds a single byte into the session. CR or LF executes the line.
    pub fn ingest(&mut self, byte: u8) -> Result<LineOutcome, LineError> {
        match byte {
            b'\r' | b'\n' => self.finish_line(),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(LineOutcome::Pending)
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.buffer.clear();
                    return Err(LineError::Overflow);
                }
                Ok(LineOutcome::Pending)
            }
        }
    }

    fn finish_line(&mut self) -> Result<LineOutcome, LineError> {
        let outcome = match str::from_utf8(self.buffer.as_slice()).map(str::trim) {
            Ok("") => Ok(LineOutcome::Blank),
            Ok(line) => Ok(LineOutcome::Executed(execute(line, &mut self.jig))),
            Err(_) => Err(LineError::InvalidUtf8),
        };
        self.buffer.clear();
        outcome
    }
}

/// Formats `message` as one CRLF-terminated console line.
pub fn render(message: &dyn fmt::Display) -> ReplyText {
    let mut text = ReplyText::new();
    if write!(text, "{message}\r\n").is_err() {
        text.clear();
        let _ = text.push_str("ERR reply too long\r\n");
    }
    text
}

/// Text to send back for `outcome`, if any.
pub fn reply_for(outcome: &Result<LineOutcome, LineError>) -> Option<ReplyText> {
    match outcome {
        Ok(LineOutcome::Pending | LineOutcome::Blank) => None,
        Ok(LineOutcome::Executed(Ok(reply))) => Some(render(reply)),
        Ok(LineOutcome::Executed(Err(error))) => Some(render(error)),
        Err(error) => Some(render(error)),
    }
}

/// Console view of the station on hardware.
///
/// Reads come from the snapshot the valve task publishes; writes are queued
/// as [`StationControl`] requests, so they take effect on the next tick.
pub struct StationConsole {
    snapshot: StationSnapshot,
}

impl StationConsole {
    pub fn new() -> Self {
        Self {
            snapshot: link::snapshot(),
        }
    }

    /// Re-reads the snapshot published by the valve task.
    pub fn refresh(&mut self) {
        self.snapshot = link::snapshot();
    }

    fn forward(control: StationControl) -> bool {
        let queued = link::request(control);
        if !queued {
            telemetry::log_control_dropped(control);
        }
        queued
    }
}

impl Default for StationConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl JigControl for StationConsole {
    fn session(&self) -> &Session {
        &self.snapshot.session
    }

    fn start_test(&mut self) {
        Self::forward(StationControl::Start);
    }

    fn stop_test(&mut self) {
        Self::forward(StationControl::Stop);
    }

    fn meter(&self) -> MeterType {
        link::selected_meter()
    }

    fn select_meter(&mut self, meter: MeterType) {
        Self::forward(StationControl::SelectMeter(meter));
    }

    fn inject_response(&mut self, code: u16) {
        link::deliver_response(code);
    }

    fn stats(&self) -> Option<StatsSummary> {
        Some(self.snapshot.stats)
    }

    fn reset_stats(&mut self) -> Result<(), CommandError> {
        if Self::forward(StationControl::ResetStats) {
            Ok(())
        } else {
            Err(CommandError::Busy)
        }
    }
}
