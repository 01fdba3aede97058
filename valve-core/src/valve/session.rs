//! Session record and the vocabulary used to describe it.
//!
//! A [`Session`] is owned by the engine and exposed read-only. Its defaults
//! describe a session that was never started: `Idle`, `Init`, `NoFailure`.

use core::fmt;

use super::hal::MeterType;
use super::limits::{RETRY_MAX, TOTAL_TIMEOUT_MS};

/// Ordered steps of the test sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestStep {
    #[default]
    Init,
    Config,
    CheckInitial,
    SendOpen,
    DetectOpening,
    OutputOpenSignal,
    CheckOpenState,
    SendClose,
    DetectClosing,
    OutputCloseSignal,
    CheckCloseState,
    Evaluate,
    Done,
}

impl TestStep {
    pub const COUNT: usize = 13;

    pub const ALL: [TestStep; Self::COUNT] = [
        TestStep::Init,
        TestStep::Config,
        TestStep::CheckInitial,
        TestStep::SendOpen,
        TestStep::DetectOpening,
        TestStep::OutputOpenSignal,
        TestStep::CheckOpenState,
        TestStep::SendClose,
        TestStep::DetectClosing,
        TestStep::OutputCloseSignal,
        TestStep::CheckCloseState,
        TestStep::Evaluate,
        TestStep::Done,
    ];

    /// Position in the sequence, starting at 0 for [`TestStep::Init`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TestStep::Init => "init",
            TestStep::Config => "config",
            TestStep::CheckInitial => "check-initial",
            TestStep::SendOpen => "send-open",
            TestStep::DetectOpening => "detect-opening",
            TestStep::OutputOpenSignal => "output-open-signal",
            TestStep::CheckOpenState => "check-open-state",
            TestStep::SendClose => "send-close",
            TestStep::DetectClosing => "detect-closing",
            TestStep::OutputCloseSignal => "output-close-signal",
            TestStep::CheckCloseState => "check-close-state",
            TestStep::Evaluate => "evaluate",
            TestStep::Done => "done",
        }
    }
}

impl fmt::Display for TestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Overall verdict of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TestResult {
    #[default]
    Idle,
    Running,
    Success,
    /// The expected condition never arrived in time.
    Timeout,
    /// A definite wrong condition was observed.
    Fail,
}

impl TestResult {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TestResult::Success | TestResult::Timeout | TestResult::Fail
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TestResult::Idle => "idle",
            TestResult::Running => "running",
            TestResult::Success => "success",
            TestResult::Timeout => "timeout",
            TestResult::Fail => "fail",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed set of failure causes. Each is raised by exactly one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailReason {
    #[default]
    NoFailure,
    ConfigTimeout,
    ConfigRetryExhausted,
    /// Reserved for the status query exchange; never raised by the sequence.
    QueryTimeout,
    /// Reserved for position read-back checks; never raised by the sequence.
    InitialPosOpen,
    /// Reserved for position read-back checks; never raised by the sequence.
    InitialPosClose,
    InitialVoltageA,
    InitialVoltageB,
    InitialRetryExhausted,
    OpenCmdTimeout,
    OpenDetectTimeout,
    OpenStateCheck,
    CloseCmdTimeout,
    CloseDetectTimeout,
    CloseStateCheck,
    TotalTimeout,
}

impl FailReason {
    pub const ALL: [FailReason; 16] = [
        FailReason::NoFailure,
        FailReason::ConfigTimeout,
        FailReason::ConfigRetryExhausted,
        FailReason::QueryTimeout,
        FailReason::InitialPosOpen,
        FailReason::InitialPosClose,
        FailReason::InitialVoltageA,
        FailReason::InitialVoltageB,
        FailReason::InitialRetryExhausted,
        FailReason::OpenCmdTimeout,
        FailReason::OpenDetectTimeout,
        FailReason::OpenStateCheck,
        FailReason::CloseCmdTimeout,
        FailReason::CloseDetectTimeout,
        FailReason::CloseStateCheck,
        FailReason::TotalTimeout,
    ];

    /// Stable numeric code; 0 means no failure.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        let index = code as usize;
        if index < Self::ALL.len() {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, FailReason::NoFailure)
    }

    /// Short machine-friendly identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailReason::NoFailure => "none",
            FailReason::ConfigTimeout => "config-timeout",
            FailReason::ConfigRetryExhausted => "config-retry-exhausted",
            FailReason::QueryTimeout => "query-timeout",
            FailReason::InitialPosOpen => "initial-pos-open",
            FailReason::InitialPosClose => "initial-pos-close",
            FailReason::InitialVoltageA => "initial-voltage-a",
            FailReason::InitialVoltageB => "initial-voltage-b",
            FailReason::InitialRetryExhausted => "initial-retry-exhausted",
            FailReason::OpenCmdTimeout => "open-cmd-timeout",
            FailReason::OpenDetectTimeout => "open-detect-timeout",
            FailReason::OpenStateCheck => "open-state-check",
            FailReason::CloseCmdTimeout => "close-cmd-timeout",
            FailReason::CloseDetectTimeout => "close-detect-timeout",
            FailReason::CloseStateCheck => "close-state-check",
            FailReason::TotalTimeout => "total-timeout",
        }
    }

    /// Operator-facing explanation.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            FailReason::NoFailure => "no failure",
            FailReason::ConfigTimeout => "configuration not acknowledged",
            FailReason::ConfigRetryExhausted => "configuration retries exhausted",
            FailReason::QueryTimeout => "status query not answered",
            FailReason::InitialPosOpen => "open position line wrong at start",
            FailReason::InitialPosClose => "close position line wrong at start",
            FailReason::InitialVoltageA => "voltage A not high at start",
            FailReason::InitialVoltageB => "voltage B not low at start",
            FailReason::InitialRetryExhausted => "initial check retries exhausted",
            FailReason::OpenCmdTimeout => "open command not acknowledged",
            FailReason::OpenDetectTimeout => "opening motion not detected",
            FailReason::OpenStateCheck => "motor still driven after open signal",
            FailReason::CloseCmdTimeout => "close command not acknowledged",
            FailReason::CloseDetectTimeout => "closing motion not detected",
            FailReason::CloseStateCheck => "motor still driven after close signal",
            FailReason::TotalTimeout => "whole test exceeded its time budget",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voltages and position read-backs captured at the first initial check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitialSnapshot {
    pub voltage_a_mv: u32,
    pub voltage_b_mv: u32,
    pub position_open: bool,
    pub position_close: bool,
}

/// Mutable state of one test session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub(crate) step: TestStep,
    pub(crate) result: TestResult,
    pub(crate) enabled: bool,
    pub(crate) total_elapsed_ms: u32,
    pub(crate) total_timeout_ms: u32,
    pub(crate) step_elapsed_ms: u32,
    pub(crate) step_timeout_ms: u32,
    /// Resend attempts inside the current acknowledgement wait.
    pub(crate) retry_count: u8,
    pub(crate) retry_max: u8,
    /// Attempts of a step group that loops back to an earlier step. Unlike
    /// `retry_count` it survives step entry.
    pub(crate) cycle_retries: u8,
    pub(crate) voltage_a_mv: u32,
    pub(crate) voltage_b_mv: u32,
    pub(crate) position_open: bool,
    pub(crate) position_close: bool,
    pub(crate) initial: Option<InitialSnapshot>,
    pub(crate) meter_type: MeterType,
    pub(crate) expected_config_code: u16,
    pub(crate) fail_reason: FailReason,
    pub(crate) fail_step: TestStep,
    pub(crate) started_at_ms: u32,
}

impl Session {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            step: TestStep::Init,
            result: TestResult::Idle,
            enabled: false,
            total_elapsed_ms: 0,
            total_timeout_ms: TOTAL_TIMEOUT_MS,
            step_elapsed_ms: 0,
            step_timeout_ms: 0,
            retry_count: 0,
            retry_max: RETRY_MAX,
            cycle_retries: 0,
            voltage_a_mv: 0,
            voltage_b_mv: 0,
            position_open: false,
            position_close: false,
            initial: None,
            meter_type: MeterType::Mechanical,
            expected_config_code: MeterType::Mechanical.config_ack_code(),
            fail_reason: FailReason::NoFailure,
            fail_step: TestStep::Init,
            started_at_ms: 0,
        }
    }

    #[must_use]
    pub const fn step(&self) -> TestStep {
        self.step
    }

    #[must_use]
    pub const fn result(&self) -> TestResult {
        self.result
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.enabled && matches!(self.result, TestResult::Running)
    }

    #[must_use]
    pub const fn fail_reason(&self) -> FailReason {
        self.fail_reason
    }

    #[must_use]
    pub const fn fail_step(&self) -> TestStep {
        self.fail_step
    }

    #[must_use]
    pub const fn total_elapsed_ms(&self) -> u32 {
        self.total_elapsed_ms
    }

    #[must_use]
    pub const fn total_timeout_ms(&self) -> u32 {
        self.total_timeout_ms
    }

    #[must_use]
    pub const fn step_elapsed_ms(&self) -> u32 {
        self.step_elapsed_ms
    }

    #[must_use]
    pub const fn step_timeout_ms(&self) -> u32 {
        self.step_timeout_ms
    }

    #[must_use]
    pub const fn retry_count(&self) -> u8 {
        self.retry_count
    }

    #[must_use]
    pub const fn retry_max(&self) -> u8 {
        self.retry_max
    }

    #[must_use]
    pub const fn cycle_retries(&self) -> u8 {
        self.cycle_retries
    }

    /// Last sampled voltages as `(a, b)` in millivolts.
    #[must_use]
    pub const fn voltages(&self) -> (u32, u32) {
        (self.voltage_a_mv, self.voltage_b_mv)
    }

    /// Last position read-backs as `(open, close)`.
    #[must_use]
    pub const fn positions(&self) -> (bool, bool) {
        (self.position_open, self.position_close)
    }

    #[must_use]
    pub const fn initial_snapshot(&self) -> Option<InitialSnapshot> {
        self.initial
    }

    #[must_use]
    pub const fn meter_type(&self) -> MeterType {
        self.meter_type
    }

    #[must_use]
    pub const fn expected_config_code(&self) -> u16 {
        self.expected_config_code
    }

    /// Uptime recorded when the session started.
    #[must_use]
    pub const fn started_at_ms(&self) -> u32 {
        self.started_at_ms
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
