use std::path::Path;

// ---------------------------------------------------------------------------
// BotConfig — file-based config loader (quotebot.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Top-level config loaded from `quotebot.json`.
///
/// Every field is optional: JSON field → env var → built-in default. Timing
/// values are generous fixed waits sized for a consumer site over residential
/// connections; tune them down for a fast test target.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BotConfig {
    /// Landing URL of the quote-request form.
    pub target_url: Option<String>,
    /// Explicit browser binary path; overrides auto-discovery.
    pub chrome_executable: Option<String>,
    /// Run the browser headless. Default `true`; set `false` to watch runs.
    pub headless: Option<bool>,
    /// Hard upper bound for the initial page load (critical path — exceeding
    /// it fails the job).
    pub nav_timeout_ms: Option<u64>,
    /// Settle time after typing into a search field before the autocomplete
    /// dropdown is inspected.
    pub autocomplete_wait_ms: Option<u64>,
    /// Pause after interactions that trigger an async UI update.
    pub stage_pause_ms: Option<u64>,
    /// Per-character delay when typing into short fields.
    pub type_delay_ms: Option<u64>,
    /// Settle time after submitting the OTP before reference extraction.
    pub otp_settle_ms: Option<u64>,
    /// Upper bound on the dynamic question-answering loop.
    pub max_question_rounds: Option<usize>,
}

impl BotConfig {
    /// Target form URL: JSON field → `QUOTEBOT_TARGET_URL` env var → default.
    pub fn resolve_target_url(&self) -> String {
        if let Some(u) = &self.target_url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("QUOTEBOT_TARGET_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://www.hipages.com.au/get_quotes_trade".to_string())
    }

    /// Browser binary override: JSON field → `None` (auto-discovery handles
    /// the `CHROME_EXECUTABLE` env var itself).
    pub fn resolve_chrome_executable(&self) -> Option<String> {
        self.chrome_executable
            .as_ref()
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    /// Headless toggle: JSON field → `QUOTEBOT_HEADLESS` env var ("0" means
    /// headful) → `true`.
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        std::env::var("QUOTEBOT_HEADLESS")
            .map(|v| v.trim() != "0")
            .unwrap_or(true)
    }

    /// Initial navigation timeout: JSON field → `QUOTEBOT_NAV_TIMEOUT_MS` → 30 000.
    pub fn resolve_nav_timeout_ms(&self) -> u64 {
        resolve_u64(self.nav_timeout_ms, "QUOTEBOT_NAV_TIMEOUT_MS", 30_000)
    }

    /// Autocomplete settle: JSON field → `QUOTEBOT_AUTOCOMPLETE_WAIT_MS` → 1 500.
    pub fn resolve_autocomplete_wait_ms(&self) -> u64 {
        resolve_u64(
            self.autocomplete_wait_ms,
            "QUOTEBOT_AUTOCOMPLETE_WAIT_MS",
            1_500,
        )
    }

    /// Post-interaction pause: JSON field → `QUOTEBOT_STAGE_PAUSE_MS` → 1 200.
    pub fn resolve_stage_pause_ms(&self) -> u64 {
        resolve_u64(self.stage_pause_ms, "QUOTEBOT_STAGE_PAUSE_MS", 1_200)
    }

    /// Per-char type delay: JSON field → `QUOTEBOT_TYPE_DELAY_MS` → 40.
    pub fn resolve_type_delay_ms(&self) -> u64 {
        resolve_u64(self.type_delay_ms, "QUOTEBOT_TYPE_DELAY_MS", 40)
    }

    /// OTP settle wait: JSON field → `QUOTEBOT_OTP_SETTLE_MS` → 8 000.
    pub fn resolve_otp_settle_ms(&self) -> u64 {
        resolve_u64(self.otp_settle_ms, "QUOTEBOT_OTP_SETTLE_MS", 8_000)
    }

    /// Question-loop bound: JSON field → `QUOTEBOT_MAX_QUESTION_ROUNDS` → 8.
    pub fn resolve_max_question_rounds(&self) -> usize {
        if let Some(n) = self.max_question_rounds {
            return n;
        }
        std::env::var("QUOTEBOT_MAX_QUESTION_ROUNDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8)
    }
}

fn resolve_u64(field: Option<u64>, env_key: &str, default: u64) -> u64 {
    if let Some(n) = field {
        return n;
    }
    std::env::var(env_key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load `quotebot.json` from `QUOTEBOT_CONFIG` or the working directory.
/// A missing or unparsable file yields the all-defaults config — env vars and
/// built-in defaults still apply per field.
pub fn load_bot_config() -> BotConfig {
    let path = std::env::var("QUOTEBOT_CONFIG").unwrap_or_else(|_| "quotebot.json".to_string());
    if !Path::new(&path).exists() {
        return BotConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str::<BotConfig>(&raw) {
            Ok(cfg) => {
                tracing::info!("config: loaded {}", path);
                cfg
            }
            Err(e) => {
                tracing::warn!("config: {} is not valid JSON ({}) — using defaults", path, e);
                BotConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("config: failed to read {} ({}) — using defaults", path, e);
            BotConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_absent() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.resolve_nav_timeout_ms(), 30_000);
        assert_eq!(cfg.resolve_type_delay_ms(), 40);
        assert_eq!(cfg.resolve_max_question_rounds(), 8);
        assert!(cfg.resolve_headless());
        assert!(cfg.resolve_chrome_executable().is_none());
    }

    #[test]
    fn json_fields_win_over_defaults() {
        let cfg: BotConfig = serde_json::from_str(
            r#"{"target_url": "http://localhost:8099/form", "headless": false, "nav_timeout_ms": 5000}"#,
        )
        .unwrap();
        assert_eq!(cfg.resolve_target_url(), "http://localhost:8099/form");
        assert!(!cfg.resolve_headless());
        assert_eq!(cfg.resolve_nav_timeout_ms(), 5_000);
    }

    #[test]
    fn blank_executable_is_treated_as_unset() {
        let cfg: BotConfig = serde_json::from_str(r#"{"chrome_executable": "  "}"#).unwrap();
        assert!(cfg.resolve_chrome_executable().is_none());
    }
}
