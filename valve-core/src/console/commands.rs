//! Console command dispatcher.
//!
//! [`execute`] parses a line and drives anything implementing
//! [`JigControl`]. The firmware UART console and the emulator share this
//! code and only differ in which controls they support.

use core::fmt;

use crate::valve::{FailReason, MeterType, Session, TestResult, TestStep};

use super::grammar::{self, Command, Topic};

/// Operations the console can drive on a jig station.
pub trait JigControl {
    /// Current session record.
    fn session(&self) -> &Session;

    fn start_test(&mut self);

    fn stop_test(&mut self);

    /// Meter family used by the next `start`.
    fn meter(&self) -> MeterType;

    fn select_meter(&mut self, meter: MeterType);

    /// Posts a response code as if it arrived from the meter.
    fn inject_response(&mut self, code: u16);

    /// Advances the station clock. Only benches with a simulated clock
    /// support this.
    fn advance(&mut self, elapsed_ms: u32) -> Result<TestResult, CommandError> {
        let _ = elapsed_ms;
        Err(CommandError::Unsupported("run"))
    }

    /// Pass/fail counters, when the station keeps them.
    fn stats(&self) -> Option<StatsSummary> {
        None
    }

    fn reset_stats(&mut self) -> Result<(), CommandError> {
        Err(CommandError::Unsupported("stats reset"))
    }
}

/// Snapshot of the session for the `status` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub result: TestResult,
    pub step: TestStep,
    pub fail_reason: FailReason,
    pub fail_step: TestStep,
    pub voltage_a_mv: u32,
    pub voltage_b_mv: u32,
    pub retry_count: u8,
    pub cycle_retries: u8,
    pub retry_max: u8,
    pub total_elapsed_ms: u32,
    pub meter: MeterType,
}

impl StatusReport {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let (voltage_a_mv, voltage_b_mv) = session.voltages();
        Self {
            result: session.result(),
            step: session.step(),
            fail_reason: session.fail_reason(),
            fail_step: session.fail_step(),
            voltage_a_mv,
            voltage_b_mv,
            retry_count: session.retry_count(),
            cycle_retries: session.cycle_retries(),
            retry_max: session.retry_max(),
            total_elapsed_ms: session.total_elapsed_ms(),
            meter: session.meter_type(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "result={} step={} meter={} a={}mV b={}mV retry={}/{} cycle={}/{} elapsed={}ms",
            self.result,
            self.step,
            self.meter,
            self.voltage_a_mv,
            self.voltage_b_mv,
            self.retry_count,
            self.retry_max,
            self.cycle_retries,
            self.retry_max,
            self.total_elapsed_ms,
        )?;
        if self.fail_reason.is_failure() {
            write!(
                f,
                " reason={} at={} ({})",
                self.fail_reason,
                self.fail_step,
                self.fail_reason.describe()
            )?;
        }
        Ok(())
    }
}

/// Counter snapshot for the `stats` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub timed_out: u32,
    pub pass_rate_percent: u32,
}

impl<const HISTORY: usize> From<&crate::stats::TestStats<HISTORY>> for StatsSummary {
    fn from(stats: &crate::stats::TestStats<HISTORY>) -> Self {
        Self {
            total: stats.total(),
            passed: stats.passed(),
            failed: stats.failed(),
            timed_out: stats.timed_out(),
            pass_rate_percent: stats.pass_rate_percent(),
        }
    }
}

/// Successful command outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Started(MeterType),
    Stopped,
    Status(StatusReport),
    Meter(MeterType),
    MeterSelected(MeterType),
    Responded(u16),
    Advanced { elapsed_ms: u32, result: TestResult },
    Stats(StatsSummary),
    StatsReset,
    Help(&'static str),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Started(meter) => write!(f, "OK started meter={meter}"),
            Reply::Stopped => f.write_str("OK stopped"),
            Reply::Status(report) => write!(f, "{report}"),
            Reply::Meter(meter) => write!(f, "meter={meter}"),
            Reply::MeterSelected(meter) => write!(f, "OK meter={meter}"),
            Reply::Responded(code) => write!(f, "OK response=0x{code:04X}"),
            Reply::Advanced { elapsed_ms, result } => {
                write!(f, "OK +{elapsed_ms}ms result={result}")
            }
            Reply::Stats(summary) => write!(
                f,
                "total={} pass={} fail={} timeout={} rate={}%",
                summary.total,
                summary.passed,
                summary.failed,
                summary.timed_out,
                summary.pass_rate_percent
            ),
            Reply::StatsReset => f.write_str("OK stats cleared"),
            Reply::Help(text) => f.write_str(text),
        }
    }
}

/// Errors surfaced while executing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError {
    Parse(grammar::ParseError),
    /// The command is not allowed while a test is running.
    Busy,
    Unsupported(&'static str),
}

impl From<grammar::ParseError> for CommandError {
    fn from(error: grammar::ParseError) -> Self {
        Self::Parse(error)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => write!(f, "ERR {error}"),
            CommandError::Busy => f.write_str("ERR test running, stop it first"),
            CommandError::Unsupported(what) => write!(f, "ERR `{what}` unsupported here"),
        }
    }
}

pub const HELP_SUMMARY: &str =
    "commands: start | stop | status | meter [mechanical|ultrasonic] | respond <code> | run <duration> | stats [reset] | help [topic]";

/// One-line help for `topic`.
#[must_use]
pub const fn help_text(topic: Topic) -> &'static str {
    match topic {
        Topic::Start => "start: begin a valve test with the selected meter family",
        Topic::Stop => "stop: abort the test and release the position outputs",
        Topic::Status => "status: show result, step, voltages and retry counters",
        Topic::Meter => "meter [mechanical|ultrasonic]: show or select the meter family",
        Topic::Respond => "respond <code>: inject a meter response, e.g. respond 0xC022",
        Topic::Run => "run <n>[ms|s]: advance the bench clock",
        Topic::Stats => "stats [reset]: show or clear pass/fail counters",
        Topic::Help => "help [topic]: list commands or describe one",
    }
}

/// Parses `line` and applies it to `jig`.
pub fn execute<J: JigControl>(line: &str, jig: &mut J) -> Result<Reply, CommandError> {
    let command = grammar::parse(line)?;
    dispatch(command, jig)
}

/// Applies an already parsed command to `jig`.
pub fn dispatch<J: JigControl>(command: Command, jig: &mut J) -> Result<Reply, CommandError> {
    match command {
        Command::Start => {
            if jig.session().is_running() {
                return Err(CommandError::Busy);
            }
            jig.start_test();
            Ok(Reply::Started(jig.meter()))
        }
        Command::Stop => {
            jig.stop_test();
            Ok(Reply::Stopped)
        }
        Command::Status => Ok(Reply::Status(StatusReport::from_session(jig.session()))),
        Command::Meter(None) => Ok(Reply::Meter(jig.meter())),
        Command::Meter(Some(meter)) => {
            if jig.session().is_running() {
                return Err(CommandError::Busy);
            }
            jig.select_meter(meter);
            Ok(Reply::MeterSelected(meter))
        }
        Command::Respond(code) => {
            jig.inject_response(code);
            Ok(Reply::Responded(code))
        }
        Command::Run(elapsed_ms) => {
            let result = jig.advance(elapsed_ms)?;
            Ok(Reply::Advanced { elapsed_ms, result })
        }
        Command::Stats { reset: false } => jig
            .stats()
            .map(Reply::Stats)
            .ok_or(CommandError::Unsupported("stats")),
        Command::Stats { reset: true } => {
            jig.reset_stats()?;
            Ok(Reply::StatsReset)
        }
        Command::Help(None) => Ok(Reply::Help(HELP_SUMMARY)),
        Command::Help(Some(topic)) => Ok(Reply::Help(help_text(topic))),
    }
}
