//! Boundary between the valve engine and the meter protocol layer.
//!
//! Outbound commands are queued as [`MeterRequest`]s for the protocol
//! task, which owns framing and the transport. Decoded acknowledgements come
//! back through [`deliver_response`], which may run from interrupt context.
//! Operator requests from the console arrive on [`STATION_CONTROL`], and
//! the valve task publishes a [`StationSnapshot`] after every tick for the
//! console to read back.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use portable_atomic::{AtomicU8, Ordering};
use valve_core::console::StatsSummary;
use valve_core::valve::{MeterType, ResponseMailbox, Session};

/// Commands in flight towards the meter; the engine sends at most one per
/// tick, so a short queue suffices.
pub const METER_REQUEST_DEPTH: usize = 4;
pub const STATION_CONTROL_DEPTH: usize = 4;

/// Command handed to the protocol layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeterRequest {
    Config(MeterType),
    OpenValve,
    CloseValve,
}

impl MeterRequest {
    pub const fn label(self) -> &'static str {
        match self {
            MeterRequest::Config(MeterType::Mechanical) => "config-mechanical",
            MeterRequest::Config(MeterType::Ultrasonic) => "config-ultrasonic",
            MeterRequest::OpenValve => "open-valve",
            MeterRequest::CloseValve => "close-valve",
        }
    }
}

/// Operator request for the station task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StationControl {
    Start,
    Stop,
    SelectMeter(MeterType),
    ResetStats,
}

impl StationControl {
    pub const fn label(self) -> &'static str {
        match self {
            StationControl::Start => "start",
            StationControl::Stop => "stop",
            StationControl::SelectMeter(MeterType::Mechanical) => "meter-mechanical",
            StationControl::SelectMeter(MeterType::Ultrasonic) => "meter-ultrasonic",
            StationControl::ResetStats => "stats-reset",
        }
    }
}

/// Session and counters as last seen by the valve task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationSnapshot {
    pub session: Session,
    pub stats: StatsSummary,
}

impl StationSnapshot {
    pub const fn new() -> Self {
        Self {
            session: Session::new(),
            stats: StatsSummary {
                total: 0,
                passed: 0,
                failed: 0,
                timed_out: 0,
                pass_rate_percent: 0,
            },
        }
    }
}

impl Default for StationSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

pub type MeterRequestQueue = Channel<CriticalSectionRawMutex, MeterRequest, METER_REQUEST_DEPTH>;
pub type StationControlQueue =
    Channel<CriticalSectionRawMutex, StationControl, STATION_CONTROL_DEPTH>;

pub static METER_REQUESTS: MeterRequestQueue = Channel::new();
pub static STATION_CONTROL: StationControlQueue = Channel::new();
pub static RESPONSES: ResponseMailbox = ResponseMailbox::new();

static SELECTED_METER: AtomicU8 = AtomicU8::new(MeterType::Mechanical.as_u8());
static SNAPSHOT: Mutex<CriticalSectionRawMutex, Cell<StationSnapshot>> =
    Mutex::new(Cell::new(StationSnapshot::new()));

/// Hands a decoded acknowledgement code to the engine.
pub fn deliver_response(code: u16) {
    RESPONSES.post(code);
}

/// Queues `request` for the protocol layer. Returns `false` when the queue
/// is full and the request was dropped.
pub fn submit(request: MeterRequest) -> bool {
    match METER_REQUESTS.try_send(request) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => false,
    }
}

/// Queues an operator request for the valve task. Returns `false` when the
/// queue is full and the request was dropped.
pub fn request(control: StationControl) -> bool {
    match STATION_CONTROL.try_send(control) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => false,
    }
}

pub fn publish(session: &Session, stats: StatsSummary) {
    let snapshot = StationSnapshot {
        session: *session,
        stats,
    };
    SNAPSHOT.lock(|cell| cell.set(snapshot));
}

pub fn snapshot() -> StationSnapshot {
    SNAPSHOT.lock(Cell::get)
}

pub fn selected_meter() -> MeterType {
    MeterType::from_u8(SELECTED_METER.load(Ordering::Relaxed)).unwrap_or_default()
}

pub fn select_meter(meter: MeterType) {
    SELECTED_METER.store(meter.as_u8(), Ordering::Relaxed);
}
