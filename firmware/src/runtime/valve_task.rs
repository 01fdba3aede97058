use embassy_futures::select::{Either, select};
use embassy_stm32::peripherals::{PA0, PA1};
use embassy_stm32::Peri;
use embassy_time::{Duration, Instant, Ticker};
use valve_core::console::StatsSummary;
use valve_core::stats::TestStats;
use valve_core::valve::ValveTest;

use crate::hw::HardwareValveHal;
use crate::link::{self, STATION_CONTROL, StationControl};
use crate::telemetry;

/// Engine cadence.
pub const TICK_MS: u64 = 10;
pub const STATION_ID: u8 = 1;

pub type StationHal = HardwareValveHal<'static, Peri<'static, PA0>, Peri<'static, PA1>>;

#[embassy_executor::task]
pub async fn run(mut engine: ValveTest<'static, StationHal>) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    let mut stats: TestStats = TestStats::new(STATION_ID);
    let mut last_tick = Instant::now();
    link::publish(engine.session(), StatsSummary::from(&stats));

    loop {
        match select(ticker.next(), STATION_CONTROL.receive()).await {
            Either::First(()) => {
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(last_tick).as_millis();
                last_tick = now;

                let was_running = engine.is_running();
                let result = engine.tick(u32::try_from(elapsed).unwrap_or(u32::MAX));
                if was_running
                    && result.is_terminal()
                    && let Some(record) = stats.record_session(engine.session())
                {
                    telemetry::log_verdict(&record);
                }
            }
            Either::Second(control) => apply_control(&mut engine, &mut stats, control),
        }
        link::publish(engine.session(), StatsSummary::from(&stats));
    }
}

fn apply_control(
    engine: &mut ValveTest<'static, StationHal>,
    stats: &mut TestStats,
    control: StationControl,
) {
    match control {
        StationControl::Start if engine.is_running() => {
            telemetry::log_control_ignored("test already running");
        }
        StationControl::Start => engine.start(),
        StationControl::Stop => engine.stop(),
        StationControl::SelectMeter(_) if engine.is_running() => {
            telemetry::log_control_ignored("meter change while running");
        }
        StationControl::SelectMeter(meter) => link::select_meter(meter),
        StationControl::ResetStats => stats.reset(),
    }
}
