use crate::link::METER_REQUESTS;

/// Drains outbound meter requests.
///
/// Framing and the serial/IR transport sit behind this task; until a
/// transport is attached, requests are logged so bench runs can answer them
/// by hand with the console `respond` command.
#[embassy_executor::task]
pub async fn run() -> ! {
    let receiver = METER_REQUESTS.receiver();
    loop {
        let request = receiver.receive().await;
        defmt::info!("link: -> {}", request.label());
    }
}
