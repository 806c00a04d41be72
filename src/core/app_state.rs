use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::automation::session::SessionStore;
use crate::core::config::BotConfig;
use crate::core::types::JobStatus;

/// Shared state for the routing layer.
///
/// `sessions` is the single source of truth for in-flight jobs; `terminal`
/// is the caller-side record of the last terminal status per job so polling
/// still answers after the session (and its browser) has been torn down.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub config: Arc<BotConfig>,
    // Terminal JobStatus records, kept after session teardown. Never holds a
    // live-state record. Access via `record_terminal` / `terminal_status`.
    terminal: Arc<Mutex<HashMap<String, JobStatus>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(crate::core::config::load_bot_config())
    }

    pub fn with_config(config: BotConfig) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(config),
            terminal: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Retain a terminal status record. Non-terminal statuses are ignored —
    /// live state is only ever read from the session store.
    pub fn record_terminal(&self, status: JobStatus) {
        if !status.state.is_terminal() {
            return;
        }
        self.terminal
            .lock()
            .expect("terminal map lock poisoned")
            .insert(status.job_id.clone(), status);
    }

    pub fn terminal_status(&self, job_id: &str) -> Option<JobStatus> {
        self.terminal
            .lock()
            .expect("terminal map lock poisoned")
            .get(job_id)
            .cloned()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("target_url", &self.config.resolve_target_url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{JobState, JobStatus};

    #[test]
    fn non_terminal_statuses_are_not_recorded() {
        let state = AppState::with_config(BotConfig::default());
        state.record_terminal(JobStatus::progress("j1", JobState::AwaitingOtp, "waiting"));
        assert!(state.terminal_status("j1").is_none());

        state.record_terminal(JobStatus::completed("j1", None));
        assert_eq!(
            state.terminal_status("j1").map(|s| s.state),
            Some(JobState::Completed)
        );
    }
}
