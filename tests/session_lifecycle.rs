//! Lifecycle-contract tests that run without a browser: the unknown-job and
//! idempotency guarantees must hold before any Chromium process exists.

use quotebot::controller::{self, SESSION_NOT_FOUND};
use quotebot::core::config::BotConfig;
use quotebot::types::{JobState, JobStatus};
use quotebot::AppState;

fn state() -> AppState {
    AppState::with_config(BotConfig::default())
}

#[tokio::test]
async fn submit_otp_on_unknown_job_is_failed_shaped_and_mutation_free() {
    let state = state();

    let status = controller::submit_otp(&state, "no-such-job", "123456").await;

    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.message, SESSION_NOT_FOUND);
    assert!(status.error.is_some());

    // No state mutation: nothing stored, nothing recorded, nothing pollable.
    assert!(state.sessions.is_empty().await);
    assert!(state.terminal_status("no-such-job").is_none());
    assert!(controller::get_status(&state, "no-such-job").await.is_none());
}

#[tokio::test]
async fn cancel_is_idempotent_and_never_errors() {
    let state = state();

    // Both calls observe the same absent-session outcome.
    assert!(!controller::cancel_session(&state, "job-1").await);
    assert!(!controller::cancel_session(&state, "job-1").await);
    assert!(state.sessions.is_empty().await);
}

#[tokio::test]
async fn status_lookup_misses_unknown_jobs() {
    let state = state();
    assert!(controller::get_status(&state, "ghost").await.is_none());
}

#[tokio::test]
async fn terminal_records_remain_pollable_after_session_teardown() {
    let state = state();

    // A completed job's session is gone, but the caller-side record answers.
    state.record_terminal(JobStatus::completed("job-done", None));

    let status = controller::get_status(&state, "job-done").await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert!(status.result.is_none());

    // Cancelling a terminal job is still a no-op, and the record survives it.
    assert!(!controller::cancel_session(&state, "job-done").await);
    assert!(controller::get_status(&state, "job-done").await.is_some());
}

#[tokio::test]
async fn failed_records_carry_the_error_detail() {
    let state = state();
    state.record_terminal(JobStatus::failed(
        "job-bad",
        "form automation failed",
        "navigation to https://example.com failed: page load timed out after 30000ms",
    ));

    let status = controller::get_status(&state, "job-bad").await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn live_state_statuses_are_never_served_from_the_terminal_record() {
    let state = state();

    // A live-shaped status without a backing session is stale by definition;
    // the record layer refuses to store it, so projection reports a miss.
    state.record_terminal(JobStatus::progress(
        "job-stale",
        JobState::AwaitingOtp,
        "waiting",
    ));
    assert!(controller::get_status(&state, "job-stale").await.is_none());
}
