//! Capability contract between the test engine and the jig hardware.
//!
//! The engine never touches a peripheral. Firmware implements [`ValveHal`]
//! over the ADC, GPIO and meter link; the emulator and the tests implement
//! it over simulated or scripted state.

use core::fmt;

use super::limits::{CONFIG_MECHANICAL_CODE, CONFIG_ULTRASONIC_CODE};
use crate::telemetry::TraceEvent;

/// Meter family under test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MeterType {
    #[default]
    Mechanical,
    Ultrasonic,
}

impl MeterType {
    /// Acknowledgement code the meter returns for its configuration command.
    #[must_use]
    pub const fn config_ack_code(self) -> u16 {
        match self {
            MeterType::Mechanical => CONFIG_MECHANICAL_CODE,
            MeterType::Ultrasonic => CONFIG_ULTRASONIC_CODE,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MeterType::Mechanical => "mechanical",
            MeterType::Ultrasonic => "ultrasonic",
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            MeterType::Mechanical => 0,
            MeterType::Ultrasonic => 1,
        }
    }

    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(MeterType::Mechanical),
            1 => Some(MeterType::Ultrasonic),
            _ => None,
        }
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware and protocol operations the engine relies on.
///
/// Every call is fire-and-forget from the engine's point of view. Voltage
/// reads must sample on demand rather than return a cached value.
pub trait ValveHal {
    /// Millivolts on motor-driver line A.
    fn read_voltage_a(&mut self) -> u32;
    /// Millivolts on motor-driver line B.
    fn read_voltage_b(&mut self) -> u32;

    /// Digital read-back of the "open" position line.
    fn read_position_open(&mut self) -> bool;
    /// Digital read-back of the "close" position line.
    fn read_position_close(&mut self) -> bool;

    /// Sends the configuration command for the cached meter type.
    fn send_config(&mut self, meter: MeterType);
    fn send_open_valve(&mut self);
    fn send_close_valve(&mut self);

    /// Drives the two position outputs; `true` reports the position to the
    /// device under test.
    fn output_position_signals(&mut self, open: bool, close: bool);

    /// Returns both position outputs to their inactive level.
    fn restore_outputs(&mut self);

    /// Arms a non-blocking delay of `ms` milliseconds.
    fn set_soft_delay(&mut self, ms: u32);
    /// Returns `true` once the most recent delay expired (or none is armed).
    fn is_soft_delay_done(&mut self) -> bool;

    /// Free-running millisecond clock, used only for trace timestamps.
    fn uptime_ms(&mut self) -> u32;

    /// Meter family the jig is configured for.
    fn meter_type(&mut self) -> MeterType;

    /// Acknowledgement expected for the configuration command.
    fn expected_config_code(&mut self) -> u16 {
        self.meter_type().config_ack_code()
    }

    /// Structured trace hook. Ignored unless overridden.
    fn trace(&mut self, event: &TraceEvent) {
        let _ = event;
    }
}
