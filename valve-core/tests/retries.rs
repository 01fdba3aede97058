mod support;

use support::{AckScript, Profile, TICK_MS, assert_verdict_consistent, engine, run_to_verdict};
use valve_core::telemetry::TraceEvent;
use valve_core::valve::{FailReason, ResponseMailbox, TestResult, TestStep};

fn verdict(profile: Profile) -> (TestResult, FailReason) {
    let mailbox = ResponseMailbox::new();
    let mut engine = engine(&mailbox, profile);
    engine.start();
    let result = run_to_verdict(&mut engine, 70_000);
    assert_verdict_consistent(&engine);
    (result, engine.fail_reason())
}

const PASS: (TestResult, FailReason) = (TestResult::Success, FailReason::NoFailure);

#[test]
fn config_tolerates_three_mismatches() {
    let profile = Profile {
        config_ack: AckScript::wrong_then_correct(3),
        ..Profile::HEALTHY
    };
    assert_eq!(verdict(profile), PASS);
}

#[test]
fn config_fourth_mismatch_exhausts_budget() {
    let profile = Profile {
        config_ack: AckScript::wrong_then_correct(4),
        ..Profile::HEALTHY
    };
    assert_eq!(
        verdict(profile),
        (TestResult::Fail, FailReason::ConfigRetryExhausted)
    );
}

#[test]
fn config_timeout_after_a_retry_counts_as_exhausted() {
    let profile = Profile {
        config_ack: AckScript::wrong_then_silent(1),
        ..Profile::HEALTHY
    };
    assert_eq!(
        verdict(profile),
        (TestResult::Fail, FailReason::ConfigRetryExhausted)
    );
}

#[test]
fn open_command_tolerates_three_mismatches() {
    let mailbox = ResponseMailbox::new();
    let profile = Profile {
        open_ack: AckScript::wrong_then_correct(3),
        ..Profile::HEALTHY
    };
    let mut engine = engine(&mailbox, profile);
    engine.start();

    assert_eq!(run_to_verdict(&mut engine, 60_000), TestResult::Success);
    assert_eq!(engine.hal().sent.opens, 4);
    assert_eq!(
        engine.hal().count_traced(|event| matches!(
            event,
            TraceEvent::AckMismatch {
                step: TestStep::SendOpen,
                ..
            }
        )),
        3
    );
}

#[test]
fn open_command_fourth_mismatch_fails() {
    let profile = Profile {
        open_ack: AckScript::wrong_then_correct(4),
        ..Profile::HEALTHY
    };
    assert_eq!(
        verdict(profile),
        (TestResult::Fail, FailReason::OpenCmdTimeout)
    );
}

#[test]
fn close_command_mismatch_budget() {
    let tolerated = Profile {
        close_ack: AckScript::wrong_then_correct(3),
        ..Profile::HEALTHY
    };
    assert_eq!(verdict(tolerated), PASS);

    let exhausted = Profile {
        close_ack: AckScript::wrong_then_correct(4),
        ..Profile::HEALTHY
    };
    assert_eq!(
        verdict(exhausted),
        (TestResult::Fail, FailReason::CloseCmdTimeout)
    );
}

#[test]
fn initial_check_tolerates_three_bad_rounds() {
    let tolerated = Profile {
        bad_idle_attempts: 3,
        ..Profile::HEALTHY
    };
    assert_eq!(verdict(tolerated), PASS);

    let exhausted = Profile {
        bad_idle_attempts: 4,
        ..Profile::HEALTHY
    };
    assert_eq!(
        verdict(exhausted),
        (TestResult::Fail, FailReason::InitialVoltageB)
    );
}

#[test]
fn opening_detection_tolerates_three_timeouts() {
    // First open at 610 ms; each detection window is 5 s plus a resend tick.
    let tolerated = Profile {
        opening_after_ms: 16_000,
        ..Profile::HEALTHY
    };
    assert_eq!(verdict(tolerated), PASS);

    let exhausted = Profile {
        opening_after_ms: 30_000,
        ..Profile::HEALTHY
    };
    assert_eq!(
        verdict(exhausted),
        (TestResult::Timeout, FailReason::OpenDetectTimeout)
    );
}

#[test]
fn retry_budget_resets_between_step_groups() {
    // Three bad idle rounds, then three mismatched open acks: both budgets
    // are consumed independently.
    let profile = Profile {
        bad_idle_attempts: 3,
        open_ack: AckScript::wrong_then_correct(3),
        close_ack: AckScript::wrong_then_correct(3),
        ..Profile::HEALTHY
    };
    assert_eq!(verdict(profile), PASS);
}

#[test]
fn initial_thresholds_are_strict() {
    let at = |a: u32, b: u32| Profile {
        closed: (a, b),
        ..Profile::HEALTHY
    };

    assert_eq!(verdict(at(101, 0)), PASS);
    assert_eq!(
        verdict(at(100, 0)),
        (TestResult::Fail, FailReason::InitialVoltageA)
    );
    assert_eq!(
        verdict(at(99, 0)),
        (TestResult::Fail, FailReason::InitialVoltageA)
    );

    assert_eq!(verdict(at(3_000, 99)), PASS);
    assert_eq!(
        verdict(at(3_000, 100)),
        (TestResult::Fail, FailReason::InitialVoltageB)
    );
    assert_eq!(
        verdict(at(3_000, 101)),
        (TestResult::Fail, FailReason::InitialVoltageB)
    );
}

#[test]
fn opening_high_threshold_is_strict() {
    let opening = |a: u32, b: u32| Profile {
        closed: (3_000, 0),
        opening: (a, b),
        ..Profile::HEALTHY
    };

    assert_eq!(verdict(opening(2_801, 0)), PASS);
    assert_eq!(
        verdict(opening(2_800, 0)),
        (TestResult::Timeout, FailReason::OpenDetectTimeout)
    );
    assert_eq!(
        verdict(opening(2_799, 0)),
        (TestResult::Timeout, FailReason::OpenDetectTimeout)
    );
    assert_eq!(verdict(opening(3_000, 99)), PASS);
    assert_eq!(
        verdict(opening(3_000, 100)),
        (TestResult::Timeout, FailReason::OpenDetectTimeout)
    );
}

#[test]
fn closing_high_threshold_is_strict() {
    let closing = |a: u32, b: u32| Profile {
        closing: (a, b),
        ..Profile::HEALTHY
    };

    assert_eq!(verdict(closing(0, 2_801)), PASS);
    assert_eq!(
        verdict(closing(0, 2_800)),
        (TestResult::Timeout, FailReason::CloseDetectTimeout)
    );
    assert_eq!(
        verdict(closing(0, 2_799)),
        (TestResult::Timeout, FailReason::CloseDetectTimeout)
    );
    assert_eq!(verdict(closing(99, 3_000)), PASS);
    assert_eq!(
        verdict(closing(100, 3_000)),
        (TestResult::Timeout, FailReason::CloseDetectTimeout)
    );
}

#[test]
fn state_check_low_threshold_is_strict() {
    let open = |a: u32, b: u32| Profile {
        open: (a, b),
        ..Profile::HEALTHY
    };
    assert_eq!(verdict(open(99, 99)), PASS);
    assert_eq!(
        verdict(open(100, 0)),
        (TestResult::Fail, FailReason::OpenStateCheck)
    );
    assert_eq!(
        verdict(open(0, 100)),
        (TestResult::Fail, FailReason::OpenStateCheck)
    );
}

#[test]
fn start_then_stop_leaves_session_idle() {
    let mailbox = ResponseMailbox::new();
    let mut engine = engine(&mailbox, Profile::HEALTHY);
    engine.start();
    let voltages = engine.session().voltages();
    engine.stop();

    assert_eq!(engine.result(), TestResult::Idle);
    assert_eq!(engine.step(), TestStep::Init);
    assert_eq!(engine.fail_reason(), FailReason::NoFailure);
    assert!(!engine.is_running());
    assert_eq!(engine.session().voltages(), voltages);
    assert_eq!(engine.hal().restores, 1);
    assert_eq!(engine.hal().sent, support::SentCommands::default());

    engine.hal_mut().advance(TICK_MS);
    assert_eq!(engine.tick(TICK_MS), TestResult::Idle);
}

#[test]
fn stop_mid_test_then_restart_runs_clean_session() {
    let mailbox = ResponseMailbox::new();
    let mut engine = engine(&mailbox, Profile::HEALTHY);
    engine.start();
    for _ in 0..120 {
        engine.hal_mut().advance(TICK_MS);
        engine.tick(TICK_MS);
    }
    assert!(engine.step() > TestStep::Config);
    engine.stop();
    assert_eq!(engine.hal().restores, 1);

    engine.hal_mut().phase = support::Phase::Closed;
    engine.start();
    assert_eq!(engine.session().total_elapsed_ms(), 0);
    assert_eq!(run_to_verdict(&mut engine, 60_000), TestResult::Success);
}
