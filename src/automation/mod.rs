//! Automation core — per-job browser sessions driving the target site's
//! multi-step quote-request form.
//!
//! * [`browser`] — Chromium discovery, headless config, launch.
//! * [`session`] — in-memory store of live sessions (owned browser + page).
//! * [`stages`] — best-effort form-stage handlers with selector fallbacks.
//! * [`photos`] — photo-upload stage with scoped temp files.
//! * [`extract`] — heuristic job-reference extraction after verification.
//! * [`controller`] — lifecycle orchestration: start, OTP submit, cancel,
//!   status lookup. The only module that creates or destroys sessions.

pub mod browser;
pub mod controller;
pub mod extract;
pub mod photos;
pub mod session;
pub mod stages;

pub use controller::{cancel_session, get_status, start_session, submit_otp, StatusCallback};

/// Failure taxonomy for the automation core.
///
/// Element absence is deliberately *not* represented here — missing elements
/// are skips, not errors. These variants cover the cases that fail a job:
/// launch problems, critical-path navigation, and interaction errors raised
/// by the browser mid-stage.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("no usable browser found — install Chrome/Chromium or set CHROME_EXECUTABLE")]
    BrowserNotFound,

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A required control could not be located by any selector strategy.
    /// Only raised on the critical path (the OTP input); ordinary form
    /// elements are skipped when absent.
    #[error("required element not found: {0}")]
    MissingElement(&'static str),

    #[error("browser interaction failed: {0}")]
    Interaction(#[from] chromiumoxide::error::CdpError),

    #[error("photo payload rejected: {0}")]
    Photo(String),
}
