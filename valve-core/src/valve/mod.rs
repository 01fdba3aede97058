//! Valve open/close test engine.

pub mod engine;
pub mod hal;
pub mod limits;
pub mod mailbox;
pub mod session;

pub use engine::ValveTest;
pub use hal::{MeterType, ValveHal};
pub use limits::TestLimits;
pub use mailbox::{Response, ResponseMailbox, SlotState};
pub use session::{FailReason, InitialSnapshot, Session, TestResult, TestStep};
