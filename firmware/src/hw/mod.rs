//! Concrete [`ValveHal`] for the STM32 jig board.
//!
//! Sense voltages come from [`adc::ValveAdc`]; the two position signals are
//! open-drain outputs where a low level reports the position to the meter.
//! Protocol commands are queued on the link for the protocol task.

#![cfg(target_os = "none")]

pub mod adc;

use embassy_stm32::adc::AdcChannel;
use embassy_stm32::gpio::OutputOpenDrain;
use embassy_stm32::peripherals::ADC1;
use embassy_time::Instant;
use valve_core::telemetry::TraceEvent;
use valve_core::timing::SoftDelay;
use valve_core::valve::{MeterType, ValveHal};

use crate::link::{self, MeterRequest};
use crate::telemetry;
use adc::ValveAdc;

/// Milliseconds since boot, wrapping after ~49 days.
pub fn uptime_ms() -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let now = Instant::now().as_millis() as u32;
    now
}

pub struct HardwareValveHal<'d, A, B>
where
    A: AdcChannel<ADC1>,
    B: AdcChannel<ADC1>,
{
    adc: ValveAdc<'d, A, B>,
    open_signal: OutputOpenDrain<'d>,
    close_signal: OutputOpenDrain<'d>,
    delay: SoftDelay,
}

impl<'d, A, B> HardwareValveHal<'d, A, B>
where
    A: AdcChannel<ADC1>,
    B: AdcChannel<ADC1>,
{
    pub fn new(
        adc: ValveAdc<'d, A, B>,
        open_signal: OutputOpenDrain<'d>,
        close_signal: OutputOpenDrain<'d>,
    ) -> Self {
        Self {
            adc,
            open_signal,
            close_signal,
            delay: SoftDelay::new(),
        }
    }

    fn submit(request: MeterRequest) {
        if !link::submit(request) {
            telemetry::log_request_dropped(request);
        }
    }

    fn drive(output: &mut OutputOpenDrain<'d>, reported: bool) {
        if reported {
            output.set_low();
        } else {
            output.set_high();
        }
    }
}

impl<'d, A, B> ValveHal for HardwareValveHal<'d, A, B>
where
    A: AdcChannel<ADC1>,
    B: AdcChannel<ADC1>,
{
    fn read_voltage_a(&mut self) -> u32 {
        self.adc.read_line_a_mv()
    }

    fn read_voltage_b(&mut self) -> u32 {
        self.adc.read_line_b_mv()
    }

    fn read_position_open(&mut self) -> bool {
        self.open_signal.is_low()
    }

    fn read_position_close(&mut self) -> bool {
        self.close_signal.is_low()
    }

    fn send_config(&mut self, meter: MeterType) {
        Self::submit(MeterRequest::Config(meter));
    }

    fn send_open_valve(&mut self) {
        Self::submit(MeterRequest::OpenValve);
    }

    fn send_close_valve(&mut self) {
        Self::submit(MeterRequest::CloseValve);
    }

    fn output_position_signals(&mut self, open: bool, close: bool) {
        Self::drive(&mut self.open_signal, open);
        Self::drive(&mut self.close_signal, close);
    }

    fn restore_outputs(&mut self) {
        self.open_signal.set_high();
        self.close_signal.set_high();
    }

    fn set_soft_delay(&mut self, ms: u32) {
        self.delay.start(uptime_ms(), ms);
    }

    fn is_soft_delay_done(&mut self) -> bool {
        self.delay.is_done(uptime_ms())
    }

    fn uptime_ms(&mut self) -> u32 {
        uptime_ms()
    }

    fn meter_type(&mut self) -> MeterType {
        link::selected_meter()
    }

    fn trace(&mut self, event: &TraceEvent) {
        telemetry::log_event(event, uptime_ms());
    }
}
