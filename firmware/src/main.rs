#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(target_os = "none", allow(static_mut_refs))]
#![cfg_attr(not(target_os = "none"), allow(dead_code))]

#[cfg(target_os = "none")]
extern crate panic_halt;

// Host test builds take critical sections through the std implementation.
#[cfg(test)]
use critical_section as _;

mod console;
mod hw;
mod link;
mod sense;
mod telemetry;

#[cfg(target_os = "none")]
mod runtime;

#[cfg(not(target_os = "none"))]
fn main() {}
