//! Session lifecycle controller.
//!
//! Orchestrates the form stages in order, emits status transitions through
//! the caller's update callback, suspends at the OTP boundary, resumes on
//! OTP submission, and guarantees browser teardown on every terminal path:
//! success, stage failure, OTP failure, and cancellation.
//!
//! Recovery policy is deliberately single-shot: any failure in any stage
//! closes the browser, removes the session, and produces exactly one
//! terminal `failed` update. No stage is individually retried — the caller
//! starts a new job if one fails.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use tracing::{info, warn};

use super::session::Session;
use super::{browser, extract, photos, stages, AutomationError};
use crate::core::types::{JobRequest, JobState, JobStatus};
use crate::core::AppState;

/// Progress sink for a running session. Invoked once per status transition,
/// in stage order; a terminal update is always the last invocation.
pub type StatusCallback = Arc<dyn Fn(JobStatus) + Send + Sync>;

/// Message used for the reportable-not-fatal unknown-job case. Callers
/// distinguish it from a true failed job by this message content.
pub const SESSION_NOT_FOUND: &str = "session not found";

/// Replace the session's cached status and notify the caller. The cache
/// write no-ops when the session is already gone (e.g. pre-launch or
/// post-teardown updates).
async fn push_update(state: &AppState, on_update: &StatusCallback, status: JobStatus) {
    state
        .sessions
        .update_status(&status.job_id, status.clone())
        .await;
    on_update(status);
}

/// Start a new automation session for `job_id`.
///
/// Acquires a browser + page, registers the session, runs the form stages in
/// order, and on success leaves the session open in `awaiting_otp` —
/// suspended until [`submit_otp`] or [`cancel_session`] arrives. On any
/// failure the browser is closed, the session removed, and a single terminal
/// `failed` update emitted.
///
/// Progress is communicated exclusively through `on_update`.
pub async fn start_session(
    state: &AppState,
    job_id: &str,
    request: JobRequest,
    on_update: StatusCallback,
) {
    info!("session {}: starting ({})", job_id, request.category);
    on_update(JobStatus::progress(
        job_id,
        JobState::Pending,
        "launching browser",
    ));

    let (browser, page, handler_task) = match browser::launch(&state.config).await {
        Ok(parts) => parts,
        Err(e) => {
            warn!("session {}: launch failed: {}", job_id, e);
            on_update(JobStatus::failed(job_id, "browser launch failed", e.to_string()));
            return;
        }
    };

    let session = Session::new(
        job_id,
        request.clone(),
        JobStatus::progress(job_id, JobState::Pending, "browser ready"),
        browser,
        page.clone(),
        handler_task,
    );
    state.sessions.insert(session).await;

    match run_form_stages(state, job_id, &request, &page, &on_update).await {
        Ok(()) => {
            let message = format!(
                "an SMS verification code has been sent to {} — submit it to finish",
                request.contact.phone
            );
            push_update(
                state,
                &on_update,
                JobStatus::progress(job_id, JobState::AwaitingOtp, message),
            )
            .await;
            info!("session {}: suspended awaiting OTP", job_id);
        }
        Err(e) => {
            warn!("session {}: stage failure: {}", job_id, e);
            state.sessions.remove_and_close(job_id).await;
            on_update(JobStatus::failed(
                job_id,
                "form automation failed",
                e.to_string(),
            ));
        }
    }
}

/// The fixed stage sequence, up to (but not including) OTP suspension.
async fn run_form_stages(
    state: &AppState,
    job_id: &str,
    request: &JobRequest,
    page: &Page,
    on_update: &StatusCallback,
) -> Result<(), AutomationError> {
    let cfg = &state.config;
    let target_url = cfg.resolve_target_url();

    // Initial load is the one critical-path wait: exceeding it fails the job.
    let nav_timeout = Duration::from_millis(cfg.resolve_nav_timeout_ms());
    match tokio::time::timeout(nav_timeout, page.goto(target_url.clone())).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            return Err(AutomationError::Navigation {
                url: target_url,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(AutomationError::Navigation {
                url: target_url,
                reason: format!("page load timed out after {}ms", nav_timeout.as_millis()),
            })
        }
    }
    stages::wait_for_transition(page, 800, cfg.resolve_nav_timeout_ms() / 2).await;

    push_update(
        state,
        on_update,
        JobStatus::progress(job_id, JobState::FillingForm, "selecting job category"),
    )
    .await;
    stages::fill_category(page, cfg, &request.category).await?;

    push_update(
        state,
        on_update,
        JobStatus::progress(job_id, JobState::FillingForm, "entering location"),
    )
    .await;
    stages::fill_location(page, cfg, &request.postcode).await?;
    stages::advance(page, cfg).await?;

    push_update(
        state,
        on_update,
        JobStatus::progress(job_id, JobState::FillingForm, "answering job questions"),
    )
    .await;
    let preferences = [
        request.property_type.to_lowercase(),
        request.timing.label().to_string(),
    ];
    stages::answer_questions(page, cfg, &preferences).await?;

    push_update(
        state,
        on_update,
        JobStatus::progress(job_id, JobState::FillingForm, "entering job description"),
    )
    .await;
    stages::fill_description(page, cfg, &request.description).await?;

    if let Some(attachments) = request.photos.as_ref().filter(|p| !p.is_empty()) {
        push_update(
            state,
            on_update,
            JobStatus::progress(job_id, JobState::UploadingPhotos, "uploading photos"),
        )
        .await;
        photos::upload_photos(page, attachments, cfg.resolve_stage_pause_ms()).await?;
        push_update(
            state,
            on_update,
            JobStatus::progress(job_id, JobState::FillingForm, "photos uploaded"),
        )
        .await;
    }

    push_update(
        state,
        on_update,
        JobStatus::progress(job_id, JobState::FillingForm, "entering contact details"),
    )
    .await;
    stages::fill_contact(page, cfg, &request.contact).await?;

    Ok(())
}

/// Resume a suspended session with the SMS one-time code.
///
/// Unknown job ids return a `failed`-shaped status with message
/// [`SESSION_NOT_FOUND`] — reportable, not fatal, and mutation-free. For a
/// known session the code is typed and verified, the job reference extracted
/// best-effort, and the browser unconditionally closed with the session
/// removed. Exactly one of `completed`/`failed` comes back; a dangling
/// session is impossible.
pub async fn submit_otp(state: &AppState, job_id: &str, code: &str) -> JobStatus {
    let Some(page) = state.sessions.page(job_id).await else {
        return JobStatus::failed(
            job_id,
            SESSION_NOT_FOUND,
            "no live session for this job id — it may have completed, failed, or been cancelled",
        );
    };

    info!("session {}: submitting OTP", job_id);
    state
        .sessions
        .update_status(
            job_id,
            JobStatus::progress(job_id, JobState::Submitting, "verifying SMS code"),
        )
        .await;

    let cfg = &state.config;
    let verified: Result<Option<crate::core::types::JobResult>, AutomationError> = async {
        let input = stages::find_first(&page, stages::selectors::OTP_INPUTS)
            .await
            .ok_or(AutomationError::MissingElement("one-time code input"))?;
        stages::type_into(&input, code, cfg.resolve_type_delay_ms()).await?;

        if !stages::click_labeled_control(&page, stages::labels::VERIFY).await? {
            input.press_key("Enter").await?;
        }
        stages::wait_for_transition(&page, 1_000, cfg.resolve_otp_settle_ms()).await;

        let current_url = page.url().await.ok().flatten().unwrap_or_default();
        let html = page.content().await.unwrap_or_default();
        Ok(extract::extract_job_reference(&current_url, &html))
    }
    .await;

    // Unconditional teardown — verification outcome does not change it.
    state.sessions.remove_and_close(job_id).await;

    match verified {
        Ok(result) => {
            if result.is_none() {
                warn!(
                    "session {}: verified but no job reference found on confirmation page",
                    job_id
                );
            }
            info!("session {}: completed", job_id);
            JobStatus::completed(job_id, result)
        }
        Err(e) => {
            warn!("session {}: OTP submission failed: {}", job_id, e);
            JobStatus::failed(job_id, "verification failed", e.to_string())
        }
    }
}

/// Cancel a session at any stage. Idempotent: closes the browser and removes
/// the entry when present, no-ops when already absent. Close errors are
/// swallowed — cleanup is best-effort and never propagates.
pub async fn cancel_session(state: &AppState, job_id: &str) -> bool {
    let removed = state.sessions.remove_and_close(job_id).await;
    if removed {
        info!("session {}: cancelled", job_id);
    }
    removed
}

/// Status projection: the live session's cached status when one exists,
/// otherwise the retained terminal record, otherwise a miss. A live-shaped
/// status can only ever come from an existing session, so a stale record is
/// structurally impossible here.
pub async fn get_status(state: &AppState, job_id: &str) -> Option<JobStatus> {
    if let Some(status) = state.sessions.status(job_id).await {
        return Some(status);
    }
    state
        .terminal_status(job_id)
        .filter(|s| s.state.is_terminal())
}
