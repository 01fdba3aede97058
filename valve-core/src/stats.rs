//! Running pass/fail statistics for a test station.
//!
//! Counters and a short history of [`TestRecord`]s are kept in RAM. Records
//! are built from a finished [`Session`] once the caller sees a terminal
//! result.

use heapless::{HistoryBuf, OldestOrdered};

use crate::valve::{FailReason, Session, TestResult, TestStep};

/// Number of recent test records retained.
pub const STATS_HISTORY_CAPACITY: usize = 32;

/// Summary of one finished test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestRecord {
    pub test_id: u32,
    pub timestamp_ms: u32,
    pub station_id: u8,
    pub result: TestResult,
    /// `None` when the test passed.
    pub fail_step: Option<TestStep>,
    pub fail_reason: FailReason,
    pub duration_ms: u32,
}

impl TestRecord {
    /// Builds a record from a session that reached a terminal result.
    ///
    /// Returns `None` for sessions that are idle or still running.
    #[must_use]
    pub fn from_session(session: &Session, test_id: u32, station_id: u8) -> Option<Self> {
        let result = session.result();
        if !result.is_terminal() {
            return None;
        }
        let fail_step = (result != TestResult::Success).then(|| session.fail_step());
        Some(Self {
            test_id,
            timestamp_ms: session.started_at_ms(),
            station_id,
            result,
            fail_step,
            fail_reason: session.fail_reason(),
            duration_ms: session.total_elapsed_ms(),
        })
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.result == TestResult::Success
    }
}

/// Aggregate counters plus a ring of recent records.
pub struct TestStats<const HISTORY: usize = STATS_HISTORY_CAPACITY> {
    station_id: u8,
    total: u32,
    passed: u32,
    failed: u32,
    timed_out: u32,
    step_failures: [u32; TestStep::COUNT],
    history: HistoryBuf<TestRecord, HISTORY>,
}

impl<const HISTORY: usize> TestStats<HISTORY> {
    #[must_use]
    pub const fn new(station_id: u8) -> Self {
        Self {
            station_id,
            total: 0,
            passed: 0,
            failed: 0,
            timed_out: 0,
            step_failures: [0; TestStep::COUNT],
            history: HistoryBuf::new(),
        }
    }

    /// Folds a finished session into the statistics.
    ///
    /// Returns the stored record, or `None` when the session has no verdict
    /// yet (nothing is counted in that case).
    pub fn record_session(&mut self, session: &Session) -> Option<TestRecord> {
        let test_id = self.total.wrapping_add(1);
        let record = TestRecord::from_session(session, test_id, self.station_id)?;
        self.record(record);
        Some(record)
    }

    pub fn record(&mut self, record: TestRecord) {
        self.total = self.total.saturating_add(1);
        match record.result {
            TestResult::Success => self.passed = self.passed.saturating_add(1),
            TestResult::Timeout => self.timed_out = self.timed_out.saturating_add(1),
            TestResult::Fail | TestResult::Idle | TestResult::Running => {
                self.failed = self.failed.saturating_add(1);
            }
        }
        if let Some(step) = record.fail_step {
            let slot = &mut self.step_failures[step.index()];
            *slot = slot.saturating_add(1);
        }
        self.history.write(record);
    }

    #[must_use]
    pub const fn station_id(&self) -> u8 {
        self.station_id
    }

    pub fn set_station_id(&mut self, station_id: u8) {
        self.station_id = station_id;
    }

    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub const fn passed(&self) -> u32 {
        self.passed
    }

    /// Sessions that ended in `Fail`.
    #[must_use]
    pub const fn failed(&self) -> u32 {
        self.failed
    }

    #[must_use]
    pub const fn timed_out(&self) -> u32 {
        self.timed_out
    }

    #[must_use]
    pub const fn step_failures(&self, step: TestStep) -> u32 {
        self.step_failures[step.index()]
    }

    /// Integer pass rate in percent; zero before the first test.
    #[must_use]
    pub fn pass_rate_percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let rate = u64::from(self.passed) * 100 / u64::from(self.total);
        u32::try_from(rate).unwrap_or(100)
    }

    #[must_use]
    pub fn last(&self) -> Option<&TestRecord> {
        self.history.recent()
    }

    pub fn history(&self) -> OldestOrdered<'_, TestRecord> {
        self.history.oldest_ordered()
    }

    /// Clears counters and history; the station id is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.station_id);
    }
}

impl<const HISTORY: usize> Default for TestStats<HISTORY> {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(test_id: u32, result: TestResult, fail_step: Option<TestStep>) -> TestRecord {
        TestRecord {
            test_id,
            timestamp_ms: 0,
            station_id: 1,
            result,
            fail_step,
            fail_reason: FailReason::NoFailure,
            duration_ms: 0,
        }
    }

    #[test]
    fn counters_split_by_verdict() {
        let mut stats: TestStats = TestStats::new(1);
        stats.record(record(1, TestResult::Success, None));
        stats.record(record(2, TestResult::Fail, Some(TestStep::CheckInitial)));
        stats.record(record(3, TestResult::Timeout, Some(TestStep::DetectClosing)));
        stats.record(record(4, TestResult::Success, None));

        assert_eq!(stats.total(), 4);
        assert_eq!(stats.passed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.timed_out(), 1);
        assert_eq!(stats.pass_rate_percent(), 50);
        assert_eq!(stats.step_failures(TestStep::DetectClosing), 1);
        assert_eq!(stats.step_failures(TestStep::Config), 0);
        assert_eq!(stats.last().map(|r| r.test_id), Some(4));
    }

    #[test]
    fn history_keeps_most_recent_records() {
        let mut stats: TestStats<2> = TestStats::new(3);
        for id in 1..=3 {
            stats.record(record(id, TestResult::Success, None));
        }
        let mut ids = stats.history().map(|r| r.test_id);
        assert_eq!(ids.next(), Some(2));
        assert_eq!(ids.next(), Some(3));
        assert_eq!(ids.next(), None);
    }

    #[test]
    fn unfinished_session_is_not_counted() {
        let mut stats: TestStats = TestStats::default();
        assert_eq!(stats.record_session(&Session::new()), None);
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.pass_rate_percent(), 0);
    }

    #[test]
    fn reset_keeps_station() {
        let mut stats: TestStats = TestStats::new(7);
        stats.record(record(1, TestResult::Fail, Some(TestStep::Config)));
        stats.reset();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.station_id(), 7);
        assert!(stats.last().is_none());
    }
}
