//! Operator console shared by the firmware and the emulator.

pub mod commands;
pub mod grammar;

pub use commands::{
    CommandError, JigControl, Reply, StatsSummary, StatusReport, dispatch, execute, help_text,
};
pub use grammar::{Command, ParseError, Topic, parse};
