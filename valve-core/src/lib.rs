#![no_std]

// Valve test jig logic shared by the firmware and the host emulator.
//
// Nothing here touches a peripheral or the standard library; hardware and
// protocol access arrives through `valve::ValveHal`.

pub mod console;
pub mod stats;
pub mod telemetry;
pub mod timing;
pub mod valve;
