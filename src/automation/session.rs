//! In-memory session store — job id → live automation session.
//!
//! A `Session` exists if and only if its browser process is alive and not yet
//! closed: entry removal and browser close always happen together, via
//! [`Session::close`] on a session taken out of the store. Nothing outside
//! the lifecycle controller creates or destroys entries.
//!
//! The store mutex is only held for map operations — never across a page
//! interaction. Stage handlers work on a cloned `Page` handle (cheap, it is
//! an `Arc` internally), so a racing `cancel_session` can close the browser
//! mid-stage; the resulting interaction error surfaces as an ordinary stage
//! failure and removal stays idempotent.

use std::collections::HashMap;

use chromiumoxide::{Browser, Page};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::types::{JobRequest, JobStatus};

/// One live automation session: the resource-owning context for an
/// in-progress job.
pub struct Session {
    pub job_id: String,
    pub request: JobRequest,
    /// Latest caller-visible status, replaced whole on every transition.
    pub status: JobStatus,
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl Session {
    pub fn new(
        job_id: impl Into<String>,
        request: JobRequest,
        status: JobStatus,
        browser: Browser,
        page: Page,
        handler_task: JoinHandle<()>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            request,
            status,
            browser,
            page,
            handler_task,
        }
    }

    /// Cloned page handle for stage work outside the store lock.
    pub fn page(&self) -> Page {
        self.page.clone()
    }

    /// Close the browser and stop the CDP event task. Best-effort: close
    /// errors are logged and swallowed, never propagated.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("session {}: browser close error (non-fatal): {}", self.job_id, e);
        }
        self.handler_task.abort();
        debug!("session {}: browser closed", self.job_id);
    }
}

/// Mapping from job identifier to live session. Not persisted — a process
/// restart cancels all in-flight jobs.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) {
        self.inner
            .lock()
            .await
            .insert(session.job_id.clone(), session);
    }

    /// Remove and return the session, transferring browser ownership to the
    /// caller. The caller must `close()` it.
    pub async fn take(&self, job_id: &str) -> Option<Session> {
        self.inner.lock().await.remove(job_id)
    }

    pub async fn contains(&self, job_id: &str) -> bool {
        self.inner.lock().await.contains_key(job_id)
    }

    /// Cached status of a live session, or a miss when none exists.
    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.inner
            .lock()
            .await
            .get(job_id)
            .map(|s| s.status.clone())
    }

    /// Replace the cached status whole (last-writer-wins; readers never see
    /// a partial record). No-ops when the session is already gone.
    pub async fn update_status(&self, job_id: &str, status: JobStatus) -> bool {
        match self.inner.lock().await.get_mut(job_id) {
            Some(session) => {
                session.status = status;
                true
            }
            None => false,
        }
    }

    /// Page handle of a live session, for stage work outside the lock.
    pub async fn page(&self, job_id: &str) -> Option<Page> {
        self.inner.lock().await.get(job_id).map(|s| s.page())
    }

    /// Take the session out of the map and close its browser. Returns
    /// whether a session was present — calling again is a no-op.
    pub async fn remove_and_close(&self, job_id: &str) -> bool {
        match self.take(job_id).await {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn job_ids(&self) -> Vec<String> {
        self.inner.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Close every live session. Used at graceful shutdown so no Chromium
    /// process outlives us.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Session> = {
            let mut guard = self.inner.lock().await;
            guard.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.close().await;
        }
    }
}
