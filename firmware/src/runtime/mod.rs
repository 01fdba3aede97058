use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Level, OutputOpenDrain, Speed};
use valve_core::valve::ValveTest;

use crate::hw::HardwareValveHal;
use crate::hw::adc::ValveAdc;
use crate::link;

mod console_task;
mod link_task;
mod valve_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        ADC1,
        PA0,
        PA1,
        PB0,
        PB1,
        PB4,
        PB5,
        USART5,
        ..
    } = hal::init(config);

    let adc = ValveAdc::new(Adc::new(ADC1), PA0, PA1);
    let valve_hal = HardwareValveHal::new(
        adc,
        OutputOpenDrain::new(PB4, Level::High, Speed::Low),
        OutputOpenDrain::new(PB5, Level::High, Speed::Low),
    );
    let engine = ValveTest::new(valve_hal, &link::RESPONSES);

    spawner
        .spawn(valve_task::run(engine))
        .expect("failed to spawn valve test task");

    spawner
        .spawn(link_task::run())
        .expect("failed to spawn meter link task");

    spawner
        .spawn(console_task::run(USART5, PB0, PB1))
        .expect("failed to spawn console task");

    core::future::pending::<()>().await;
}
