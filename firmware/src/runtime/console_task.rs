use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};

use crate::console::{ConsoleSession, MAX_LINE_LEN, StationConsole, reply_for};

const CONSOLE_UART_BUFFER_SIZE: usize = 2 * MAX_LINE_LEN;
const CONSOLE_UART_BAUD: u32 = 115_200;
const BANNER: &[u8] = b"valve jig console ready; type `help`\r\n";

static mut UART_TX_BUFFER: [u8; CONSOLE_UART_BUFFER_SIZE] = [0; CONSOLE_UART_BUFFER_SIZE];
static mut UART_RX_BUFFER: [u8; CONSOLE_UART_BUFFER_SIZE] = [0; CONSOLE_UART_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            config,
        )
        .expect("failed to initialize console UART")
    };

    let (mut uart_tx, mut uart_rx) = uart.split();
    let mut session = ConsoleSession::new(StationConsole::new());
    let mut ingress = [0u8; MAX_LINE_LEN];

    if uart_tx.write_all(BANNER).await.is_err() {
        defmt::warn!("console: UART write error");
    }

    loop {
        let Ok(count) = uart_rx.read(&mut ingress).await else {
            defmt::warn!("console: UART read error");
            Timer::after(Duration::from_millis(5)).await;
            continue;
        };

        session.jig_mut().refresh();
        for byte in &ingress[..count] {
            let outcome = session.ingest(*byte);
            let Some(reply) = reply_for(&outcome) else {
                continue;
            };
            if uart_tx.write_all(reply.as_bytes()).await.is_err() {
                defmt::warn!("console: UART write error");
                Timer::after(Duration::from_millis(5)).await;
            }
            // Requests queued by this line may change the published state.
            session.jig_mut().refresh();
        }
    }
}
