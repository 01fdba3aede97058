//! Tick-driven valve test sequence.
//!
//! [`ValveTest`] owns the capability implementation and the session record
//! and borrows the [`ResponseMailbox`] the protocol layer posts into. The
//! caller invokes [`ValveTest::tick`] at a steady cadence with the real
//! elapsed milliseconds. Each call does a bounded amount of work, advances
//! at most one step, and never blocks; waits are expressed through the
//! HAL soft delay.

use super::hal::ValveHal;
use super::limits::{SAMPLE_TRACE_INTERVAL_MS, TestLimits, VALVE_CONTROL_CODE};
use super::mailbox::{Response, ResponseMailbox, SlotState};
use super::session::{FailReason, InitialSnapshot, Session, TestResult, TestStep};
use crate::telemetry::{Command, TraceEvent};

/// Outcome of one poll of an acknowledgement wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AckWait {
    /// Nothing conclusive yet (including a mismatch that triggered a resend).
    Pending,
    Matched,
    /// The step timeout elapsed without a matching response.
    TimedOut,
    /// More mismatches than the retry budget allows.
    Exhausted,
}

/// Result of a step group that may loop back to an earlier step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CycleRetry {
    Again,
    Exhausted,
}

/// Valve test engine for one station.
pub struct ValveTest<'m, H: ValveHal> {
    hal: H,
    mailbox: &'m ResponseMailbox,
    limits: TestLimits,
    session: Session,
}

impl<'m, H: ValveHal> ValveTest<'m, H> {
    /// Creates an idle engine using the reference limits.
    pub fn new(hal: H, mailbox: &'m ResponseMailbox) -> Self {
        Self::with_limits(hal, mailbox, TestLimits::default())
    }

    /// Creates an idle engine with caller-supplied limits.
    pub fn with_limits(hal: H, mailbox: &'m ResponseMailbox, limits: TestLimits) -> Self {
        let mut session = Session::new();
        session.total_timeout_ms = limits.total_timeout_ms;
        session.retry_max = limits.retry_max;
        Self {
            hal,
            mailbox,
            limits,
            session,
        }
    }

    /// Zeroes the session and arms it at [`TestStep::Init`].
    ///
    /// Meter type and the expected configuration acknowledgement are read
    /// from the HAL once here and cached for the rest of the session.
    pub fn start(&mut self) {
        self.hal.output_position_signals(false, false);
        self.hal.set_soft_delay(0);
        self.mailbox.clear();

        let mut session = Session::new();
        session.total_timeout_ms = self.limits.total_timeout_ms;
        session.retry_max = self.limits.retry_max;
        session.meter_type = self.hal.meter_type();
        session.expected_config_code = self.hal.expected_config_code();
        session.started_at_ms = self.hal.uptime_ms();
        session.result = TestResult::Running;
        session.enabled = true;
        self.session = session;

        self.emit(TraceEvent::Started {
            meter: session.meter_type,
            expected_config_code: session.expected_config_code,
        });
    }

    /// Disables the session and returns the position outputs to idle.
    ///
    /// Measured voltages and the last failure classification are kept for
    /// inspection.
    pub fn stop(&mut self) {
        let step = self.session.step;
        self.hal.restore_outputs();
        self.session.enabled = false;
        self.session.result = TestResult::Idle;
        self.session.step = TestStep::Init;
        self.emit(TraceEvent::Stopped { step });
    }

    /// Records a protocol response for the next tick to interpret.
    pub fn on_response(&self, code: u16) {
        self.mailbox.post(code);
    }

    /// Advances the sequence by `tick_ms` milliseconds and returns the
    /// overall result.
    pub fn tick(&mut self, tick_ms: u32) -> TestResult {
        if !self.session.enabled {
            return self.session.result;
        }

        // Timers advance even while a soft delay is pending.
        self.session.total_elapsed_ms = self.session.total_elapsed_ms.saturating_add(tick_ms);
        self.session.step_elapsed_ms = self.session.step_elapsed_ms.saturating_add(tick_ms);

        if self.session.result == TestResult::Running
            && self.session.total_elapsed_ms > self.session.total_timeout_ms
        {
            self.fail(TestResult::Timeout, FailReason::TotalTimeout);
            return self.session.result;
        }

        if !self.hal.is_soft_delay_done() {
            return self.session.result;
        }

        match self.session.step {
            TestStep::Init => self.run_init(),
            TestStep::Config => self.run_config(),
            TestStep::CheckInitial => self.run_check_initial(),
            TestStep::SendOpen => self.run_send_open(),
            TestStep::DetectOpening => self.run_detect_opening(tick_ms),
            TestStep::OutputOpenSignal => self.run_output_signal(true),
            TestStep::CheckOpenState => self.run_check_open_state(),
            TestStep::SendClose => self.run_send_close(),
            TestStep::DetectClosing => self.run_detect_closing(tick_ms),
            TestStep::OutputCloseSignal => self.run_output_signal(false),
            TestStep::CheckCloseState => self.run_check_close_state(),
            TestStep::Evaluate => self.run_evaluate(),
            TestStep::Done => self.session.enabled = false,
        }

        self.session.result
    }

    #[must_use]
    pub fn result(&self) -> TestResult {
        self.session.result
    }

    #[must_use]
    pub fn step(&self) -> TestStep {
        self.session.step
    }

    #[must_use]
    pub fn fail_reason(&self) -> FailReason {
        self.session.fail_reason
    }

    #[must_use]
    pub fn fail_step(&self) -> TestStep {
        self.session.fail_step
    }

    /// Human-readable explanation of the failure reason.
    #[must_use]
    pub fn fail_reason_text(&self) -> &'static str {
        self.session.fail_reason.describe()
    }

    #[must_use]
    pub fn step_name(&self) -> &'static str {
        self.session.step.name()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// State of the response slot, for diagnostics.
    #[must_use]
    pub fn response_state(&self) -> SlotState {
        self.mailbox.state()
    }

    #[must_use]
    pub fn limits(&self) -> &TestLimits {
        &self.limits
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    fn run_init(&mut self) {
        self.enter_step(TestStep::Config, self.limits.config_timeout_ms);
        self.send(Command::Config(self.session.meter_type));
        self.hal.set_soft_delay(self.limits.config_send_delay_ms);
    }

    fn run_config(&mut self) {
        let expected = self.session.expected_config_code;
        match self.await_ack(expected, Command::Config(self.session.meter_type)) {
            AckWait::Pending => {}
            AckWait::Matched => {
                self.hal.set_soft_delay(self.limits.config_ack_delay_ms);
                self.enter_step(TestStep::CheckInitial, self.limits.initial_check_timeout_ms);
            }
            AckWait::TimedOut if self.session.retry_count == 0 => {
                self.fail(TestResult::Fail, FailReason::ConfigTimeout);
            }
            AckWait::TimedOut | AckWait::Exhausted => {
                self.fail(TestResult::Fail, FailReason::ConfigRetryExhausted);
            }
        }
    }

    fn run_check_initial(&mut self) {
        let (a, b) = self.sample_voltages();
        self.session.position_open = self.hal.read_position_open();
        self.session.position_close = self.hal.read_position_close();
        if self.session.initial.is_none() {
            self.session.initial = Some(InitialSnapshot {
                voltage_a_mv: a,
                voltage_b_mv: b,
                position_open: self.session.position_open,
                position_close: self.session.position_close,
            });
        }

        let a_ok = self.limits.is_above_low(a);
        let b_ok = self.limits.is_low(b);
        if a_ok && b_ok {
            self.session.cycle_retries = 0;
            self.enter_step(TestStep::SendOpen, self.limits.open_cmd_timeout_ms);
            self.send(Command::OpenValve);
            self.hal.set_soft_delay(self.limits.open_send_delay_ms);
            return;
        }

        if self.cycle_retry() == CycleRetry::Exhausted {
            let reason = if !a_ok {
                FailReason::InitialVoltageA
            } else if !b_ok {
                FailReason::InitialVoltageB
            } else {
                FailReason::InitialRetryExhausted
            };
            self.fail(TestResult::Fail, reason);
            return;
        }

        // Re-run configuration from the top so the meter is re-armed.
        self.enter_step(TestStep::Init, 0);
    }

    fn run_send_open(&mut self) {
        match self.await_ack(VALVE_CONTROL_CODE, Command::OpenValve) {
            AckWait::Pending => {}
            AckWait::Matched => {
                self.enter_step(TestStep::DetectOpening, self.limits.open_detect_timeout_ms);
            }
            AckWait::TimedOut | AckWait::Exhausted => {
                self.fail(TestResult::Fail, FailReason::OpenCmdTimeout);
            }
        }
    }

    fn run_detect_opening(&mut self, tick_ms: u32) {
        let (a, b) = self.sample_voltages();
        self.trace_periodic_sample(tick_ms);

        if self.limits.is_high(a) && self.limits.is_low(b) {
            self.session.cycle_retries = 0;
            self.enter_step(TestStep::OutputOpenSignal, 0);
            return;
        }
        if self.session.step_elapsed_ms < self.session.step_timeout_ms {
            return;
        }

        if self.limits.is_low(a) && self.limits.is_high(b) {
            self.emit_polarity_hint(a, b);
        }
        if self.cycle_retry() == CycleRetry::Exhausted {
            self.fail(TestResult::Timeout, FailReason::OpenDetectTimeout);
            return;
        }
        self.enter_step(TestStep::SendOpen, self.limits.open_cmd_timeout_ms);
        self.send(Command::OpenValve);
    }

    fn run_output_signal(&mut self, open: bool) {
        self.hal.output_position_signals(open, !open);
        self.emit(TraceEvent::Signals {
            open,
            close: !open,
        });
        self.hal.set_soft_delay(self.limits.signal_settle_ms);
        let next = if open {
            TestStep::CheckOpenState
        } else {
            TestStep::CheckCloseState
        };
        self.enter_step(next, self.limits.state_check_timeout_ms);
    }

    fn run_check_open_state(&mut self) {
        if self.motor_stopped() {
            self.session.cycle_retries = 0;
            self.release_signals();
            self.enter_step(TestStep::SendClose, self.limits.close_cmd_timeout_ms);
            self.send(Command::CloseValve);
            return;
        }
        if self.cycle_retry() == CycleRetry::Exhausted {
            self.fail(TestResult::Fail, FailReason::OpenStateCheck);
            return;
        }
        self.enter_step(TestStep::OutputOpenSignal, 0);
    }

    fn run_send_close(&mut self) {
        match self.await_ack(VALVE_CONTROL_CODE, Command::CloseValve) {
            AckWait::Pending => {}
            AckWait::Matched => {
                self.enter_step(TestStep::DetectClosing, self.limits.close_detect_timeout_ms);
            }
            AckWait::TimedOut | AckWait::Exhausted => {
                self.fail(TestResult::Fail, FailReason::CloseCmdTimeout);
            }
        }
    }

    fn run_detect_closing(&mut self, tick_ms: u32) {
        let (a, b) = self.sample_voltages();
        self.trace_periodic_sample(tick_ms);

        if self.limits.is_low(a) && self.limits.is_high(b) {
            self.session.cycle_retries = 0;
            self.enter_step(TestStep::OutputCloseSignal, 0);
            return;
        }
        if self.session.step_elapsed_ms < self.session.step_timeout_ms {
            return;
        }

        if self.limits.is_high(a) && self.limits.is_low(b) {
            self.emit_polarity_hint(a, b);
        }
        // Closing detection has no retry budget, unlike opening detection.
        self.fail(TestResult::Timeout, FailReason::CloseDetectTimeout);
    }

    fn run_check_close_state(&mut self) {
        if self.motor_stopped() {
            self.release_signals();
            self.enter_step(TestStep::Evaluate, 0);
            return;
        }
        if self.cycle_retry() == CycleRetry::Exhausted {
            self.fail(TestResult::Fail, FailReason::CloseStateCheck);
            return;
        }
        self.enter_step(TestStep::OutputCloseSignal, 0);
    }

    fn run_evaluate(&mut self) {
        self.session.result = TestResult::Success;
        self.session.fail_reason = FailReason::NoFailure;
        self.session.step = TestStep::Done;
        self.emit(TraceEvent::Completed {
            total_elapsed_ms: self.session.total_elapsed_ms,
        });
    }

    /// Polls the mailbox for `expected`, resending `resend` on a mismatch
    /// until the retry budget is spent.
    fn await_ack(&mut self, expected: u16, resend: Command) -> AckWait {
        let step = self.session.step;
        match self.mailbox.take(expected) {
            None if self.session.step_elapsed_ms >= self.session.step_timeout_ms => {
                AckWait::TimedOut
            }
            None => AckWait::Pending,
            Some(Response::Matched(code)) => {
                self.emit(TraceEvent::AckMatched { step, code });
                AckWait::Matched
            }
            Some(Response::Mismatched(code)) => {
                self.session.retry_count = self.session.retry_count.saturating_add(1);
                self.emit(TraceEvent::AckMismatch {
                    step,
                    code,
                    expected,
                    attempt: self.session.retry_count,
                });
                if self.session.retry_count > self.session.retry_max {
                    self.session.retry_count = 0;
                    return AckWait::Exhausted;
                }
                self.send(resend);
                AckWait::Pending
            }
        }
    }

    /// Counts one more pass through a looping step group.
    fn cycle_retry(&mut self) -> CycleRetry {
        self.session.cycle_retries = self.session.cycle_retries.saturating_add(1);
        if self.session.cycle_retries > self.session.retry_max {
            return CycleRetry::Exhausted;
        }
        self.emit(TraceEvent::Retry {
            step: self.session.step,
            attempt: self.session.cycle_retries,
            max: self.session.retry_max,
        });
        CycleRetry::Again
    }

    fn enter_step(&mut self, step: TestStep, timeout_ms: u32) {
        self.session.step = step;
        self.session.step_elapsed_ms = 0;
        self.session.step_timeout_ms = timeout_ms;
        self.session.retry_count = 0;
        self.mailbox.clear();
        self.emit(TraceEvent::StepEntered { step, timeout_ms });
    }

    fn send(&mut self, command: Command) {
        match command {
            Command::Config(meter) => self.hal.send_config(meter),
            Command::OpenValve => self.hal.send_open_valve(),
            Command::CloseValve => self.hal.send_close_valve(),
        }
        self.emit(TraceEvent::CommandSent {
            command,
            attempt: self.session.retry_count.saturating_add(1),
        });
    }

    fn sample_voltages(&mut self) -> (u32, u32) {
        let a = self.hal.read_voltage_a();
        let b = self.hal.read_voltage_b();
        self.session.voltage_a_mv = a;
        self.session.voltage_b_mv = b;
        (a, b)
    }

    fn motor_stopped(&mut self) -> bool {
        let (a, b) = self.sample_voltages();
        self.emit(TraceEvent::VoltageSample {
            step: self.session.step,
            a_mv: a,
            b_mv: b,
            step_elapsed_ms: self.session.step_elapsed_ms,
        });
        self.limits.is_low(a) && self.limits.is_low(b)
    }

    fn release_signals(&mut self) {
        self.hal.output_position_signals(false, false);
        self.emit(TraceEvent::Signals {
            open: false,
            close: false,
        });
    }

    fn trace_periodic_sample(&mut self, tick_ms: u32) {
        if self.session.step_elapsed_ms % SAMPLE_TRACE_INTERVAL_MS < tick_ms {
            self.emit(TraceEvent::VoltageSample {
                step: self.session.step,
                a_mv: self.session.voltage_a_mv,
                b_mv: self.session.voltage_b_mv,
                step_elapsed_ms: self.session.step_elapsed_ms,
            });
        }
    }

    fn emit_polarity_hint(&mut self, a_mv: u32, b_mv: u32) {
        self.emit(TraceEvent::PolarityHint {
            step: self.session.step,
            a_mv,
            b_mv,
        });
    }

    /// Declares a terminal failure at the current step.
    fn fail(&mut self, result: TestResult, reason: FailReason) {
        let step = self.session.step;
        self.session.result = result;
        self.session.fail_reason = reason;
        self.session.fail_step = step;
        self.session.enabled = false;
        self.emit(TraceEvent::Failed {
            result,
            reason,
            step,
        });
    }

    fn emit(&mut self, event: TraceEvent) {
        self.hal.trace(&event);
    }
}
