#![allow(dead_code)]

//! Scripted bench shared by the integration tests.
//!
//! The bench models the valve as a small phase machine driven by the
//! commands and position signals it receives, and answers commands through
//! the shared mailbox according to an [`AckScript`].

use heapless::Vec as HeaplessVec;
use valve_core::telemetry::{TelemetryRecorder, TraceEvent};
use valve_core::timing::SoftDelay;
use valve_core::valve::limits::VALVE_CONTROL_CODE;
use valve_core::valve::{MeterType, ResponseMailbox, TestResult, TestStep, ValveHal, ValveTest};

pub const TICK_MS: u32 = 10;

/// How the simulated meter answers one kind of command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckScript {
    /// Number of sends answered with [`AckScript::WRONG_CODE`] first.
    pub wrong_first: u8,
    /// Whether later sends get the correct code (otherwise silence).
    pub answers: bool,
}

impl AckScript {
    pub const WRONG_CODE: u16 = 0x0BAD;
    pub const CORRECT: Self = Self {
        wrong_first: 0,
        answers: true,
    };
    pub const NEVER: Self = Self {
        wrong_first: 0,
        answers: false,
    };

    pub const fn wrong_then_correct(count: u8) -> Self {
        Self {
            wrong_first: count,
            answers: true,
        }
    }

    pub const fn wrong_then_silent(count: u8) -> Self {
        Self {
            wrong_first: count,
            answers: false,
        }
    }

    fn reply(self, sends_so_far: u32, correct: u16) -> Option<u16> {
        if sends_so_far <= u32::from(self.wrong_first) {
            Some(Self::WRONG_CODE)
        } else if self.answers {
            Some(correct)
        } else {
            None
        }
    }
}

/// Physical position of the simulated valve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Opening,
    Open,
    Closing,
    Shut,
}

/// Voltage signature per phase plus the meter's answering behaviour.
#[derive(Clone, Copy, Debug)]
pub struct Profile {
    pub meter: MeterType,
    pub closed: (u32, u32),
    /// Reported during the first `bad_idle_attempts` configuration rounds.
    pub bad_idle: (u32, u32),
    pub bad_idle_attempts: u32,
    pub opening: (u32, u32),
    /// Opening voltages only appear this long after the first open command;
    /// until then the motor reads as unpowered `(0, 0)`.
    pub opening_after_ms: u32,
    pub open: (u32, u32),
    pub closing: (u32, u32),
    pub shut: (u32, u32),
    /// The motor keeps reading `closing` through this many close pulses.
    pub close_pulses_ignored: u32,
    pub config_ack: AckScript,
    pub open_ack: AckScript,
    pub close_ack: AckScript,
}

impl Profile {
    pub const HEALTHY: Self = Self {
        meter: MeterType::Mechanical,
        closed: (3_000, 0),
        bad_idle: (3_000, 3_000),
        bad_idle_attempts: 0,
        opening: (3_000, 0),
        opening_after_ms: 0,
        open: (0, 0),
        closing: (0, 3_000),
        shut: (0, 0),
        close_pulses_ignored: 0,
        config_ack: AckScript::CORRECT,
        open_ack: AckScript::CORRECT,
        close_ack: AckScript::CORRECT,
    };
}

impl Default for Profile {
    fn default() -> Self {
        Self::HEALTHY
    }
}

/// Commands observed by the bench.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SentCommands {
    pub configs: u32,
    pub opens: u32,
    pub closes: u32,
}

pub struct Bench<'m> {
    mailbox: &'m ResponseMailbox,
    pub profile: Profile,
    pub now_ms: u32,
    delay: SoftDelay,
    pub phase: Phase,
    first_open_at: Option<u32>,
    pub sent: SentCommands,
    pub signals: HeaplessVec<(bool, bool), 64>,
    pub delays: HeaplessVec<u32, 128>,
    pub restores: u32,
    pub trace: TelemetryRecorder<512>,
}

impl<'m> Bench<'m> {
    pub fn new(mailbox: &'m ResponseMailbox, profile: Profile) -> Self {
        Self {
            mailbox,
            profile,
            now_ms: 0,
            delay: SoftDelay::new(),
            phase: Phase::Closed,
            first_open_at: None,
            sent: SentCommands::default(),
            signals: HeaplessVec::new(),
            delays: HeaplessVec::new(),
            restores: 0,
            trace: TelemetryRecorder::new(),
        }
    }

    pub fn advance(&mut self, ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(ms);
    }

    fn voltages(&self) -> (u32, u32) {
        match self.phase {
            Phase::Closed if self.sent.configs <= self.profile.bad_idle_attempts => {
                self.profile.bad_idle
            }
            Phase::Closed => self.profile.closed,
            Phase::Opening => {
                let since = self
                    .first_open_at
                    .map_or(0, |at| self.now_ms.wrapping_sub(at));
                if since >= self.profile.opening_after_ms {
                    self.profile.opening
                } else {
                    (0, 0)
                }
            }
            Phase::Open => self.profile.open,
            Phase::Closing => self.profile.closing,
            Phase::Shut if self.close_pulses() <= self.profile.close_pulses_ignored => {
                self.profile.closing
            }
            Phase::Shut => self.profile.shut,
        }
    }

    pub fn close_pulses(&self) -> u32 {
        let pulses = self
            .signals
            .iter()
            .filter(|signals| **signals == (false, true))
            .count();
        u32::try_from(pulses).unwrap_or(u32::MAX)
    }

    /// Returns `true` if any recorded trace event satisfies `predicate`.
    pub fn traced(&self, predicate: impl Fn(&TraceEvent) -> bool) -> bool {
        self.trace.oldest_first().any(|record| predicate(&record.event))
    }

    pub fn count_traced(&self, predicate: impl Fn(&TraceEvent) -> bool) -> usize {
        self.trace
            .oldest_first()
            .filter(|record| predicate(&record.event))
            .count()
    }
}

impl ValveHal for Bench<'_> {
    fn read_voltage_a(&mut self) -> u32 {
        self.voltages().0
    }

    fn read_voltage_b(&mut self) -> u32 {
        self.voltages().1
    }

    fn read_position_open(&mut self) -> bool {
        self.signals.last().is_some_and(|(open, _)| *open)
    }

    fn read_position_close(&mut self) -> bool {
        self.signals.last().is_some_and(|(_, close)| *close)
    }

    fn send_config(&mut self, meter: MeterType) {
        self.sent.configs += 1;
        if let Some(code) = self
            .profile
            .config_ack
            .reply(self.sent.configs, meter.config_ack_code())
        {
            self.mailbox.post(code);
        }
    }

    fn send_open_valve(&mut self) {
        self.sent.opens += 1;
        self.phase = Phase::Opening;
        self.first_open_at.get_or_insert(self.now_ms);
        if let Some(code) = self.profile.open_ack.reply(self.sent.opens, VALVE_CONTROL_CODE) {
            self.mailbox.post(code);
        }
    }

    fn send_close_valve(&mut self) {
        self.sent.closes += 1;
        self.phase = Phase::Closing;
        if let Some(code) = self
            .profile
            .close_ack
            .reply(self.sent.closes, VALVE_CONTROL_CODE)
        {
            self.mailbox.post(code);
        }
    }

    fn output_position_signals(&mut self, open: bool, close: bool) {
        self.signals.push((open, close)).expect("signal log capacity");
        if open && self.phase == Phase::Opening {
            self.phase = Phase::Open;
        }
        if close && self.phase == Phase::Closing {
            self.phase = Phase::Shut;
        }
    }

    fn restore_outputs(&mut self) {
        self.restores += 1;
    }

    fn set_soft_delay(&mut self, ms: u32) {
        self.delays.push(ms).expect("delay log capacity");
        self.delay.start(self.now_ms, ms);
    }

    fn is_soft_delay_done(&mut self) -> bool {
        self.delay.is_done(self.now_ms)
    }

    fn uptime_ms(&mut self) -> u32 {
        self.now_ms
    }

    fn meter_type(&mut self) -> MeterType {
        self.profile.meter
    }

    fn trace(&mut self, event: &TraceEvent) {
        self.trace.record(*event, self.now_ms);
    }
}

pub type Engine<'m> = ValveTest<'m, Bench<'m>>;

pub fn engine(mailbox: &ResponseMailbox, profile: Profile) -> Engine<'_> {
    ValveTest::new(Bench::new(mailbox, profile), mailbox)
}

/// Returns `true` when moving from `from` to `to` is a defined retry.
pub fn is_retry_transition(from: TestStep, to: TestStep) -> bool {
    matches!(
        (from, to),
        (TestStep::CheckInitial, TestStep::Init)
            | (TestStep::DetectOpening, TestStep::SendOpen)
            | (TestStep::CheckOpenState, TestStep::OutputOpenSignal)
            | (TestStep::CheckCloseState, TestStep::OutputCloseSignal)
    )
}

/// Ticks until the engine reports a verdict or `max_ms` elapses.
///
/// Every step change is checked to be either a single step forward or a
/// defined retry transition.
pub fn run_to_verdict(engine: &mut Engine<'_>, max_ms: u32) -> TestResult {
    let mut elapsed = 0;
    let mut step = engine.step();
    let mut result = engine.result();
    while elapsed < max_ms {
        engine.hal_mut().advance(TICK_MS);
        result = engine.tick(TICK_MS);
        elapsed += TICK_MS;

        let next = engine.step();
        if next != step {
            assert!(
                next.index() == step.index() + 1 || is_retry_transition(step, next),
                "illegal transition {step} -> {next}"
            );
            step = next;
        }
        if result.is_terminal() {
            break;
        }
    }
    result
}

/// Asserts the verdict/reason pairing that holds for every terminal session.
pub fn assert_verdict_consistent(engine: &Engine<'_>) {
    let result = engine.result();
    assert!(result.is_terminal(), "session not terminal: {result}");
    assert_eq!(
        engine.fail_reason().is_failure(),
        result != TestResult::Success,
        "fail reason {} inconsistent with {result}",
        engine.fail_reason()
    );
}
