//! Motor-driver voltage sampling on ADC1.
//!
//! Both sense lines are read on demand and converted to millivolts against
//! the analog supply, which is derived from a calibrated VREFINT reading so
//! the thresholds hold when VDDA sags.

#![cfg(target_os = "none")]

use core::ptr;

use embassy_stm32::adc::{Adc, AdcChannel, SampleTime, VrefInt};
use embassy_stm32::peripherals::ADC1;

use crate::sense::{raw_to_millivolts, vdda_from_vrefint};

/// Factory-programmed VREFINT reading taken at 3.0 V.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;

fn read_vrefint_calibration() -> u16 {
    unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) }
}

/// ADC1 wrapper owning the two valve sense channels.
pub struct ValveAdc<'d, A, B>
where
    A: AdcChannel<ADC1>,
    B: AdcChannel<ADC1>,
{
    adc: Adc<'d, ADC1>,
    vrefint: VrefInt,
    calibration: u16,
    line_a: A,
    line_b: B,
}

impl<'d, A, B> ValveAdc<'d, A, B>
where
    A: AdcChannel<ADC1>,
    B: AdcChannel<ADC1>,
{
    pub fn new(mut adc: Adc<'d, ADC1>, line_a: A, line_b: B) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let mut vrefint = adc.enable_vrefint();
        // The first conversion after enabling VREFINT is unreliable.
        let _ = adc.blocking_read(&mut vrefint);
        Self {
            adc,
            vrefint,
            calibration: read_vrefint_calibration(),
            line_a,
            line_b,
        }
    }

    /// Analog supply in millivolts, from the VREFINT ratio.
    fn vdda_mv(&mut self) -> u32 {
        let reading = self.adc.blocking_read(&mut self.vrefint);
        vdda_from_vrefint(reading, self.calibration)
    }

    pub fn read_line_a_mv(&mut self) -> u32 {
        let vdda = self.vdda_mv();
        let raw = self.adc.blocking_read(&mut self.line_a);
        raw_to_millivolts(raw, vdda)
    }

    pub fn read_line_b_mv(&mut self) -> u32 {
        let vdda = self.vdda_mv();
        let raw = self.adc.blocking_read(&mut self.line_b);
        raw_to_millivolts(raw, vdda)
    }
}
