//! Log helpers for the valve station.
//!
//! Every engine [`TraceEvent`] is mirrored to defmt (target) or stdout
//! (host) so a failing unit can be diagnosed from the RTT log alone.

use valve_core::stats::TestRecord;
use valve_core::telemetry::TraceEvent;

use crate::link::{MeterRequest, StationControl};

/// Logs `event` at a level matching its severity.
pub fn log_event(event: &TraceEvent, timestamp_ms: u32) {
    if event.is_warning() {
        log_trace_warning(event, timestamp_ms);
    } else {
        log_trace(event, timestamp_ms);
    }
}

#[cfg(target_os = "none")]
fn log_trace(event: &TraceEvent, timestamp_ms: u32) {
    defmt::info!("valve: {} t={}ms", defmt::Display2Format(event), timestamp_ms);
}

#[cfg(not(target_os = "none"))]
fn log_trace(event: &TraceEvent, timestamp_ms: u32) {
    println!("valve: {event} t={timestamp_ms}ms");
}

#[cfg(target_os = "none")]
fn log_trace_warning(event: &TraceEvent, timestamp_ms: u32) {
    defmt::warn!("valve: {} t={}ms", defmt::Display2Format(event), timestamp_ms);
}

#[cfg(not(target_os = "none"))]
fn log_trace_warning(event: &TraceEvent, timestamp_ms: u32) {
    println!("valve: WARN {event} t={timestamp_ms}ms");
}

#[cfg(target_os = "none")]
pub fn log_verdict(record: &TestRecord) {
    if record.passed() {
        defmt::info!(
            "station: test #{} passed in {}ms",
            record.test_id,
            record.duration_ms
        );
    } else {
        defmt::error!(
            "station: test #{} {} reason={} step={} after {}ms",
            record.test_id,
            record.result.label(),
            record.fail_reason.as_str(),
            record.fail_step.map_or("-", |step| step.name()),
            record.duration_ms
        );
    }
}

#[cfg(not(target_os = "none"))]
pub fn log_verdict(record: &TestRecord) {
    if record.passed() {
        println!(
            "station: test #{} passed in {}ms",
            record.test_id, record.duration_ms
        );
    } else {
        println!(
            "station: test #{} {} reason={} step={} after {}ms",
            record.test_id,
            record.result,
            record.fail_reason,
            record.fail_step.map_or("-", |step| step.name()),
            record.duration_ms
        );
    }
}

#[cfg(target_os = "none")]
pub fn log_request_dropped(request: MeterRequest) {
    defmt::warn!("link: request queue full, dropped {}", request.label());
}

#[cfg(not(target_os = "none"))]
pub fn log_request_dropped(request: MeterRequest) {
    println!("link: request queue full, dropped {}", request.label());
}

#[cfg(target_os = "none")]
pub fn log_control_ignored(reason: &'static str) {
    defmt::warn!("station: control request ignored ({})", reason);
}

#[cfg(not(target_os = "none"))]
pub fn log_control_ignored(reason: &'static str) {
    println!("station: control request ignored ({reason})");
}

#[cfg(target_os = "none")]
pub fn log_control_dropped(control: StationControl) {
    defmt::warn!("console: control queue full, dropped {}", control.label());
}

#[cfg(not(target_os = "none"))]
pub fn log_control_dropped(control: StationControl) {
    println!("console: control queue full, dropped {}", control.label());
}
