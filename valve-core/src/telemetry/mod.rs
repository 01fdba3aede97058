//! Structured trace events and the fixed-capacity ring that stores them.
//!
//! The engine hands a [`TraceEvent`] to [`ValveHal::trace`] at every
//! transition worth explaining after a field failure. Integrators decide
//! whether to log it, keep it in a [`TelemetryRecorder`], or both.
//!
//! [`ValveHal::trace`]: crate::valve::ValveHal::trace

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::valve::{FailReason, MeterType, TestResult, TestStep};

/// Total number of trace records retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Monotonic identifier assigned to each stored record.
pub type EventId = u32;

/// Outbound meter command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Config(MeterType),
    OpenValve,
    CloseValve,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Config(meter) => write!(f, "config({meter})"),
            Command::OpenValve => f.write_str("open-valve"),
            Command::CloseValve => f.write_str("close-valve"),
        }
    }
}

/// Observable engine activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Started {
        meter: MeterType,
        expected_config_code: u16,
    },
    StepEntered {
        step: TestStep,
        timeout_ms: u32,
    },
    CommandSent {
        command: Command,
        attempt: u8,
    },
    AckMatched {
        step: TestStep,
        code: u16,
    },
    AckMismatch {
        step: TestStep,
        code: u16,
        expected: u16,
        attempt: u8,
    },
    /// Voltage reading taken during a check or detection step.
    VoltageSample {
        step: TestStep,
        a_mv: u32,
        b_mv: u32,
        step_elapsed_ms: u32,
    },
    /// A step group is being repeated after a violated condition.
    Retry {
        step: TestStep,
        attempt: u8,
        max: u8,
    },
    Signals {
        open: bool,
        close: bool,
    },
    /// Detection timed out while the opposite voltage signature was present.
    PolarityHint {
        step: TestStep,
        a_mv: u32,
        b_mv: u32,
    },
    Failed {
        result: TestResult,
        reason: FailReason,
        step: TestStep,
    },
    Completed {
        total_elapsed_ms: u32,
    },
    Stopped {
        step: TestStep,
    },
}

impl TraceEvent {
    /// Returns `true` for events that warrant a warning-level log line.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            TraceEvent::AckMismatch { .. }
                | TraceEvent::Retry { .. }
                | TraceEvent::PolarityHint { .. }
                | TraceEvent::Failed { .. }
        )
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TraceEvent::Started {
                meter,
                expected_config_code,
            } => write!(
                f,
                "started meter={meter} expect=0x{expected_config_code:04X}"
            ),
            TraceEvent::StepEntered { step, timeout_ms } => {
                write!(f, "step {step} timeout={timeout_ms}ms")
            }
            TraceEvent::CommandSent { command, attempt } => {
                write!(f, "send {command} attempt={attempt}")
            }
            TraceEvent::AckMatched { step, code } => {
                write!(f, "ack {step} code=0x{code:04X}")
            }
            TraceEvent::AckMismatch {
                step,
                code,
                expected,
                attempt,
            } => write!(
                f,
                "ack-mismatch {step} code=0x{code:04X} expect=0x{expected:04X} attempt={attempt}"
            ),
            TraceEvent::VoltageSample {
                step,
                a_mv,
                b_mv,
                step_elapsed_ms,
            } => write!(
                f,
                "sample {step} a={a_mv}mV b={b_mv}mV t={step_elapsed_ms}ms"
            ),
            TraceEvent::Retry { step, attempt, max } => {
                write!(f, "retry {step} {attempt}/{max}")
            }
            TraceEvent::Signals { open, close } => {
                write!(f, "signals open={} close={}", u8::from(open), u8::from(close))
            }
            TraceEvent::PolarityHint { step, a_mv, b_mv } => write!(
                f,
                "polarity-hint {step} a={a_mv}mV b={b_mv}mV (wiring reversed?)"
            ),
            TraceEvent::Failed {
                result,
                reason,
                step,
            } => write!(f, "{result} reason={reason} step={step}"),
            TraceEvent::Completed { total_elapsed_ms } => {
                write!(f, "success total={total_elapsed_ms}ms")
            }
            TraceEvent::Stopped { step } => write!(f, "stopped at {step}"),
        }
    }
}

/// Trace record stored in the ring buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub id: EventId,
    pub timestamp_ms: u32,
    pub event: TraceEvent,
}

/// Records trace events into a fixed-size ring buffer, overwriting the
/// oldest entry once full.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TraceRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Stores `event` and returns the identifier assigned to it.
    pub fn record(&mut self, event: TraceEvent, timestamp_ms: u32) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TraceRecord {
            id,
            timestamp_ms,
            event,
        });
        id
    }

    /// Returns an iterator over the stored records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TraceRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TraceRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
