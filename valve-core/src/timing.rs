//! Non-blocking millisecond delays for [`ValveHal`] implementations.
//!
//! [`ValveHal`]: crate::valve::ValveHal

/// Deadline-based delay over a wrapping `u32` millisecond clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftDelay {
    deadline_ms: Option<u32>,
}

impl SoftDelay {
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline_ms: None }
    }

    /// Arms the delay to expire `duration_ms` after `now_ms`, replacing any
    /// delay already in progress.
    pub fn start(&mut self, now_ms: u32, duration_ms: u32) {
        self.deadline_ms = Some(now_ms.wrapping_add(duration_ms));
    }

    /// Returns `true` when no delay is armed or the deadline has passed.
    /// An expired delay disarms itself.
    pub fn is_done(&mut self, now_ms: u32) -> bool {
        match self.deadline_ms {
            None => true,
            Some(_) if self.remaining(now_ms) == 0 => {
                self.deadline_ms = None;
                true
            }
            Some(_) => false,
        }
    }

    /// Milliseconds left before the deadline, zero when idle or expired.
    #[must_use]
    pub fn remaining(&self, now_ms: u32) -> u32 {
        let Some(deadline) = self.deadline_ms else {
            return 0;
        };
        let left = deadline.wrapping_sub(now_ms);
        // A difference in the upper half of the range means the deadline
        // is already behind us.
        if left > u32::MAX / 2 { 0 } else { left }
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.deadline_ms.is_some()
    }
}
