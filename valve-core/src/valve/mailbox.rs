//! Single-slot response mailbox shared between the protocol layer and the
//! tick loop.
//!
//! The slot state and the 16-bit response code live in one atomic word so
//! the consumer can never observe a code without its flag (or the reverse).
//! Layout: bits 0..16 hold the code, bits 16..18 the [`SlotState`].

use portable_atomic::{AtomicU32, Ordering};

const CODE_MASK: u32 = 0xFFFF;
const STATE_SHIFT: u32 = 16;

/// Lifecycle of the mailbox slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing pending.
    Empty,
    /// A response arrived and has not been looked at yet.
    New,
    /// The pending response was examined and did not match; it will not be
    /// processed again.
    ConsumedMismatch,
}

impl SlotState {
    const fn bits(self) -> u32 {
        match self {
            SlotState::Empty => 0,
            SlotState::New => 1,
            SlotState::ConsumedMismatch => 2,
        }
    }

    const fn from_bits(bits: u32) -> Self {
        match bits {
            1 => SlotState::New,
            2 => SlotState::ConsumedMismatch,
            _ => SlotState::Empty,
        }
    }
}

/// Outcome of consuming a pending response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    Matched(u16),
    Mismatched(u16),
}

#[allow(clippy::cast_lossless)]
const fn pack(state: SlotState, code: u16) -> u32 {
    (state.bits() << STATE_SHIFT) | code as u32
}

const fn unpack(word: u32) -> (SlotState, u16) {
    #[allow(clippy::cast_possible_truncation)]
    let code = (word & CODE_MASK) as u16;
    (SlotState::from_bits(word >> STATE_SHIFT), code)
}

/// Lock-free single-producer/single-consumer response cell.
pub struct ResponseMailbox {
    slot: AtomicU32,
}

impl ResponseMailbox {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: AtomicU32::new(pack(SlotState::Empty, 0)),
        }
    }

    /// Records `code` as a new response. Safe to call from interrupt context.
    ///
    /// A response that was never consumed is overwritten by the newer one.
    pub fn post(&self, code: u16) {
        self.slot
            .store(pack(SlotState::New, code), Ordering::Release);
    }

    /// Drops whatever is pending.
    pub fn clear(&self) {
        self.slot
            .store(pack(SlotState::Empty, 0), Ordering::Release);
    }

    /// Consumes a new response, comparing it against `expected`.
    ///
    /// Returns `None` when nothing new is pending. A matching response empties
    /// the slot; a mismatching one is marked [`SlotState::ConsumedMismatch`]
    /// so it is reported exactly once. If the producer posts between the load
    /// and the exchange, the fresh word is re-examined, so a response present
    /// at any point during the call is never left behind.
    pub fn take(&self, expected: u16) -> Option<Response> {
        let mut current = self.slot.load(Ordering::Acquire);
        loop {
            let (state, code) = unpack(current);
            if state != SlotState::New {
                return None;
            }

            let (next, response) = if code == expected {
                (pack(SlotState::Empty, 0), Response::Matched(code))
            } else {
                (
                    pack(SlotState::ConsumedMismatch, code),
                    Response::Mismatched(code),
                )
            };

            match self
                .slot
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(response),
                Err(observed) => current = observed,
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> SlotState {
        unpack(self.slot.load(Ordering::Acquire)).0
    }

    /// Last code recorded in the slot (zero once a match has been consumed).
    #[must_use]
    pub fn code(&self) -> u16 {
        unpack(self.slot.load(Ordering::Acquire)).1
    }
}

impl Default for ResponseMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mailbox_yields_nothing() {
        let mailbox = ResponseMailbox::new();
        assert_eq!(mailbox.take(0xC022), None);
        assert_eq!(mailbox.state(), SlotState::Empty);
    }

    #[test]
    fn matching_response_empties_slot() {
        let mailbox = ResponseMailbox::new();
        mailbox.post(0xC022);
        assert_eq!(mailbox.state(), SlotState::New);
        assert_eq!(mailbox.take(0xC022), Some(Response::Matched(0xC022)));
        assert_eq!(mailbox.state(), SlotState::Empty);
        assert_eq!(mailbox.take(0xC022), None);
    }

    #[test]
    fn mismatch_is_reported_once() {
        let mailbox = ResponseMailbox::new();
        mailbox.post(0x1234);
        assert_eq!(mailbox.take(0xC022), Some(Response::Mismatched(0x1234)));
        assert_eq!(mailbox.state(), SlotState::ConsumedMismatch);
        assert_eq!(mailbox.code(), 0x1234);
        assert_eq!(mailbox.take(0xC022), None);
    }

    #[test]
    fn later_post_replaces_stale_mismatch() {
        let mailbox = ResponseMailbox::new();
        mailbox.post(0x0001);
        let _ = mailbox.take(0x2604);
        mailbox.post(0x2604);
        assert_eq!(mailbox.take(0x2604), Some(Response::Matched(0x2604)));
    }

    #[test]
    fn clear_discards_pending_response() {
        let mailbox = ResponseMailbox::new();
        mailbox.post(0x2036);
        mailbox.clear();
        assert_eq!(mailbox.take(0x2036), None);
    }
}
