//! Thresholds, timeouts and protocol codes for the valve test sequence.
//!
//! The constants are the reference values used on the production jig.
//! [`TestLimits`] bundles them so a bench fixture can run the same engine
//! with shortened timings.

/// Voltage below which a motor-driver line counts as "low" (strict `<`).
pub const VOLTAGE_LOW_MV: u32 = 100;
/// Voltage above which a motor-driver line counts as "high" (strict `>`).
pub const VOLTAGE_HIGH_MV: u32 = 2_800;

/// Whole-test budget, checked with strict `>`.
pub const TOTAL_TIMEOUT_MS: u32 = 60_000;
pub const CONFIG_TIMEOUT_MS: u32 = 10_000;
pub const INITIAL_CHECK_TIMEOUT_MS: u32 = 5_000;
pub const OPEN_CMD_TIMEOUT_MS: u32 = 5_000;
pub const OPEN_DETECT_TIMEOUT_MS: u32 = 5_000;
pub const CLOSE_CMD_TIMEOUT_MS: u32 = 5_000;
/// Closing runs the motor against the seat and needs the longer window.
pub const CLOSE_DETECT_TIMEOUT_MS: u32 = 15_000;
pub const STATE_CHECK_TIMEOUT_MS: u32 = 5_000;

/// Delay after the configuration command leaves the jig.
pub const CONFIG_SEND_DELAY_MS: u32 = 500;
/// Delay after a matching configuration acknowledgement.
pub const CONFIG_ACK_DELAY_MS: u32 = 100;
/// Delay after the first open command of a session.
pub const OPEN_SEND_DELAY_MS: u32 = 500;
/// Settle time after a position signal changes.
pub const SIGNAL_SETTLE_MS: u32 = 500;

/// Retries tolerated per retryable step; the next one is fatal.
pub const RETRY_MAX: u8 = 3;

/// Acknowledgement code for both open and close valve commands.
pub const VALVE_CONTROL_CODE: u16 = 0xC022;
/// Configuration acknowledgement for mechanical meters.
pub const CONFIG_MECHANICAL_CODE: u16 = 0x2604;
/// Configuration acknowledgement for ultrasonic meters.
pub const CONFIG_ULTRASONIC_CODE: u16 = 0x2036;

/// Detection steps emit a voltage sample once per this interval.
pub const SAMPLE_TRACE_INTERVAL_MS: u32 = 1_000;

/// Timing and retry budget applied to one test session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestLimits {
    pub voltage_low_mv: u32,
    pub voltage_high_mv: u32,
    pub total_timeout_ms: u32,
    pub config_timeout_ms: u32,
    pub initial_check_timeout_ms: u32,
    pub open_cmd_timeout_ms: u32,
    pub open_detect_timeout_ms: u32,
    pub close_cmd_timeout_ms: u32,
    pub close_detect_timeout_ms: u32,
    pub state_check_timeout_ms: u32,
    pub config_send_delay_ms: u32,
    pub config_ack_delay_ms: u32,
    pub open_send_delay_ms: u32,
    pub signal_settle_ms: u32,
    pub retry_max: u8,
}

impl TestLimits {
    /// Reference limits used by the production jig.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            voltage_low_mv: VOLTAGE_LOW_MV,
            voltage_high_mv: VOLTAGE_HIGH_MV,
            total_timeout_ms: TOTAL_TIMEOUT_MS,
            config_timeout_ms: CONFIG_TIMEOUT_MS,
            initial_check_timeout_ms: INITIAL_CHECK_TIMEOUT_MS,
            open_cmd_timeout_ms: OPEN_CMD_TIMEOUT_MS,
            open_detect_timeout_ms: OPEN_DETECT_TIMEOUT_MS,
            close_cmd_timeout_ms: CLOSE_CMD_TIMEOUT_MS,
            close_detect_timeout_ms: CLOSE_DETECT_TIMEOUT_MS,
            state_check_timeout_ms: STATE_CHECK_TIMEOUT_MS,
            config_send_delay_ms: CONFIG_SEND_DELAY_MS,
            config_ack_delay_ms: CONFIG_ACK_DELAY_MS,
            open_send_delay_ms: OPEN_SEND_DELAY_MS,
            signal_settle_ms: SIGNAL_SETTLE_MS,
            retry_max: RETRY_MAX,
        }
    }

    /// Returns `true` when `mv` is strictly below the low threshold.
    #[must_use]
    pub const fn is_low(&self, mv: u32) -> bool {
        mv < self.voltage_low_mv
    }

    /// Returns `true` when `mv` is strictly above the low threshold, the
    /// idle signature of line A before the valve is driven.
    #[must_use]
    pub const fn is_above_low(&self, mv: u32) -> bool {
        mv > self.voltage_low_mv
    }

    /// Returns `true` when `mv` is strictly above the high threshold.
    #[must_use]
    pub const fn is_high(&self, mv: u32) -> bool {
        mv > self.voltage_high_mv
    }

    /// Divides every timeout and delay by `factor` (minimum 1 ms each).
    ///
    /// Thresholds and the retry budget are left untouched.
    #[must_use]
    pub const fn scaled_down(self, factor: u32) -> Self {
        const fn scale(value: u32, factor: u32) -> u32 {
            let scaled = if factor == 0 { value } else { value / factor };
            if scaled == 0 { 1 } else { scaled }
        }

        Self {
            total_timeout_ms: scale(self.total_timeout_ms, factor),
            config_timeout_ms: scale(self.config_timeout_ms, factor),
            initial_check_timeout_ms: scale(self.initial_check_timeout_ms, factor),
            open_cmd_timeout_ms: scale(self.open_cmd_timeout_ms, factor),
            open_detect_timeout_ms: scale(self.open_detect_timeout_ms, factor),
            close_cmd_timeout_ms: scale(self.close_cmd_timeout_ms, factor),
            close_detect_timeout_ms: scale(self.close_detect_timeout_ms, factor),
            state_check_timeout_ms: scale(self.state_check_timeout_ms, factor),
            config_send_delay_ms: scale(self.config_send_delay_ms, factor),
            config_ack_delay_ms: scale(self.config_ack_delay_ms, factor),
            open_send_delay_ms: scale(self.open_send_delay_ms, factor),
            signal_settle_ms: scale(self.signal_settle_ms, factor),
            ..self
        }
    }
}

impl Default for TestLimits {
    fn default() -> Self {
        Self::reference()
    }
}
