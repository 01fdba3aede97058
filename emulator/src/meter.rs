use std::collections::VecDeque;

use valve_core::telemetry::TraceEvent;
use valve_core::timing::SoftDelay;
use valve_core::valve::{MeterType, ResponseMailbox, ValveHal, limits};

/// Motor-driver voltage while the valve motor runs.
pub const DRIVE_MV: u32 = 3_100;

const ACK_LATENCY_MS: u32 = 120;
const MOTOR_SPIN_UP_MS: u32 = 800;
const SLOW_CLOSE_SPIN_UP_MS: u32 = 20_000;

pub const PROFILE_TAGS: &[&str] = &[
    "healthy",
    "no-ack",
    "wrong-ack",
    "stuck",
    "slow-close",
    "reversed",
];

/// Device behaviour simulated by [`SimulatedMeter`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FaultProfile {
    #[default]
    Healthy,
    /// Answers configuration but never acknowledges valve commands.
    NoAck,
    /// Answers configuration with the other meter family's code.
    WrongAck,
    /// Motor never draws current when asked to open.
    Stuck,
    /// Closing takes longer than the detection window.
    SlowClose,
    /// Driver lines A and B are swapped on the fixture.
    Reversed,
}

impl FaultProfile {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        let profile = match tag.to_ascii_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "no-ack" => Self::NoAck,
            "wrong-ack" => Self::WrongAck,
            "stuck" => Self::Stuck,
            "slow-close" => Self::SlowClose,
            "reversed" => Self::Reversed,
            _ => {
                return Err(format!(
                    "Unknown profile `{tag}`; expected one of: {}",
                    PROFILE_TAGS.join(", ")
                ));
            }
        };
        Ok(profile)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::NoAck => "no-ack",
            Self::WrongAck => "wrong-ack",
            Self::Stuck => "stuck",
            Self::SlowClose => "slow-close",
            Self::Reversed => "reversed",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Motor {
    /// Valve parked closed; line A idles high.
    Parked,
    Opening { since_ms: u32 },
    Open,
    Closing { since_ms: u32 },
    Shut,
}

#[derive(Clone, Copy, Debug)]
struct PendingAck {
    due_ms: u32,
    code: u16,
}

/// Meter and valve motor simulated on a host clock.
///
/// The clock only moves through [`SimulatedMeter::advance`], so a session
/// replays identically for the same sequence of commands.
pub struct SimulatedMeter<'m> {
    mailbox: &'m ResponseMailbox,
    profile: FaultProfile,
    meter: MeterType,
    time_scale: u32,
    now_ms: u32,
    delay: SoftDelay,
    pending: VecDeque<PendingAck>,
    motor: Motor,
    signals: (bool, bool),
    trace_lines: Vec<String>,
}

impl<'m> SimulatedMeter<'m> {
    /// `time_scale` divides every simulated latency, matching limits that
    /// were shortened with the same factor.
    pub fn new(
        mailbox: &'m ResponseMailbox,
        profile: FaultProfile,
        meter: MeterType,
        time_scale: u32,
    ) -> Self {
        Self {
            mailbox,
            profile,
            meter,
            time_scale: time_scale.max(1),
            now_ms: 0,
            delay: SoftDelay::new(),
            pending: VecDeque::new(),
            motor: Motor::Parked,
            signals: (false, false),
            trace_lines: Vec::new(),
        }
    }

    pub fn profile(&self) -> FaultProfile {
        self.profile
    }

    pub fn meter(&self) -> MeterType {
        self.meter
    }

    pub fn set_meter(&mut self, meter: MeterType) {
        self.meter = meter;
    }

    /// Moves the clock forward and delivers acknowledgements that fell due.
    pub fn advance(&mut self, elapsed_ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(elapsed_ms);
        while let Some(ack) = self.pending.front().copied() {
            if self.now_ms.wrapping_sub(ack.due_ms) > u32::MAX / 2 {
                break;
            }
            self.pending.pop_front();
            self.mailbox.post(ack.code);
        }
    }

    /// Trace lines produced since the last call.
    pub fn drain_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace_lines)
    }

    fn scaled(&self, ms: u32) -> u32 {
        (ms / self.time_scale).max(1)
    }

    fn acknowledge(&mut self, code: u16) {
        let due_ms = self.now_ms.wrapping_add(self.scaled(ACK_LATENCY_MS));
        self.pending.push_back(PendingAck { due_ms, code });
    }

    fn running_for(&self, since_ms: u32, spin_up_ms: u32) -> bool {
        self.now_ms.wrapping_sub(since_ms) >= self.scaled(spin_up_ms)
    }

    fn line_voltages(&self) -> (u32, u32) {
        let (a, b) = match self.motor {
            Motor::Parked => (DRIVE_MV, 0),
            Motor::Opening { since_ms } => {
                if self.profile != FaultProfile::Stuck
                    && self.running_for(since_ms, MOTOR_SPIN_UP_MS)
                {
                    (DRIVE_MV, 0)
                } else {
                    (0, 0)
                }
            }
            Motor::Closing { since_ms } => {
                let spin_up = if self.profile == FaultProfile::SlowClose {
                    SLOW_CLOSE_SPIN_UP_MS
                } else {
                    MOTOR_SPIN_UP_MS
                };
                if self.running_for(since_ms, spin_up) {
                    (0, DRIVE_MV)
                } else {
                    (0, 0)
                }
            }
            Motor::Open | Motor::Shut => (0, 0),
        };
        if self.profile == FaultProfile::Reversed {
            (b, a)
        } else {
            (a, b)
        }
    }
}

impl ValveHal for SimulatedMeter<'_> {
    fn read_voltage_a(&mut self) -> u32 {
        self.line_voltages().0
    }

    fn read_voltage_b(&mut self) -> u32 {
        self.line_voltages().1
    }

    fn read_position_open(&mut self) -> bool {
        self.signals.0
    }

    fn read_position_close(&mut self) -> bool {
        self.signals.1
    }

    fn send_config(&mut self, meter: MeterType) {
        // Configuration re-homes the valve.
        self.motor = Motor::Parked;
        let answered = match (self.profile, meter) {
            (FaultProfile::WrongAck, MeterType::Mechanical) => MeterType::Ultrasonic,
            (FaultProfile::WrongAck, MeterType::Ultrasonic) => MeterType::Mechanical,
            (_, meter) => meter,
        };
        self.acknowledge(answered.config_ack_code());
    }

    fn send_open_valve(&mut self) {
        if !matches!(self.motor, Motor::Opening { .. }) {
            self.motor = Motor::Opening {
                since_ms: self.now_ms,
            };
        }
        if self.profile != FaultProfile::NoAck {
            self.acknowledge(limits::VALVE_CONTROL_CODE);
        }
    }

    fn send_close_valve(&mut self) {
        if !matches!(self.motor, Motor::Closing { .. }) {
            self.motor = Motor::Closing {
                since_ms: self.now_ms,
            };
        }
        if self.profile != FaultProfile::NoAck {
            self.acknowledge(limits::VALVE_CONTROL_CODE);
        }
    }

    fn output_position_signals(&mut self, open: bool, close: bool) {
        self.signals = (open, close);
        self.motor = match (self.motor, open, close) {
            (Motor::Opening { .. }, true, false) => Motor::Open,
            (Motor::Closing { .. }, false, true) => Motor::Shut,
            (Motor::Shut, false, false) => Motor::Parked,
            (motor, _, _) => motor,
        };
    }

    fn restore_outputs(&mut self) {
        self.signals = (false, false);
        self.motor = Motor::Parked;
    }

    fn set_soft_delay(&mut self, ms: u32) {
        self.delay.start(self.now_ms, ms);
    }

    fn is_soft_delay_done(&mut self) -> bool {
        self.delay.is_done(self.now_ms)
    }

    fn uptime_ms(&mut self) -> u32 {
        self.now_ms
    }

    fn meter_type(&mut self) -> MeterType {
        self.meter
    }

    fn trace(&mut self, event: &TraceEvent) {
        let level = if event.is_warning() { "WARN" } else { "INFO" };
        self.trace_lines
            .push(format!("[{:>7} ms] {level} {event}", self.now_ms));
    }
}
