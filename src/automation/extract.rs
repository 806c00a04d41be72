//! Heuristic extraction of the site's job reference after OTP verification.
//!
//! The confirmation page usually encodes the created job's identifier in the
//! URL (`/jobs/12345678`, `?job_id=...`) or prints it in the page body
//! ("Job number: 12345678"). Both are best-effort pattern matches; a layout
//! change makes them silently return `None`, which the controller treats as
//! non-fatal (`completed` without result fields).
//
// Known risk: silent data loss on site redesign. Flagged to product — the
// job is still posted, we just lose the reference.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::types::JobResult;

fn url_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/(?:jobs?|requests?|quotes?)/(\d{4,})").expect("valid url path pattern")
    })
}

fn url_query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[?&](?:job_?id|request_?id|reference)=([A-Za-z0-9-]{4,})")
            .expect("valid url query pattern")
    })
}

fn content_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:job|request|reference)\s*(?:number|no\.?|id)?\s*[:#]\s*([A-Z0-9][A-Z0-9-]{3,})")
            .expect("valid content pattern")
    })
}

/// Extract the external job identifier/URL from the post-verification page.
///
/// URL patterns are tried first (they also give us a canonical URL for the
/// result); the page body is the fallback. Returns `None` when nothing
/// matches.
pub fn extract_job_reference(current_url: &str, html: &str) -> Option<JobResult> {
    if let Some(caps) = url_path_re()
        .captures(current_url)
        .or_else(|| url_query_re().captures(current_url))
    {
        // Only report a canonical URL when the browser gave us a real one
        // (about:blank and empty strings carry no useful link).
        let external_url = url::Url::parse(current_url)
            .ok()
            .filter(|u| u.has_host())
            .map(|u| u.to_string());
        return Some(JobResult {
            external_id: Some(caps[1].to_string()),
            external_url,
        });
    }

    if let Some(caps) = content_re().captures(html) {
        return Some(JobResult {
            external_id: Some(caps[1].to_string()),
            external_url: None,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_url_path() {
        let result = extract_job_reference(
            "https://www.example.com.au/jobs/87654321/confirmation",
            "",
        )
        .unwrap();
        assert_eq!(result.external_id.as_deref(), Some("87654321"));
        assert!(result.external_url.as_deref().unwrap().contains("/jobs/"));
    }

    #[test]
    fn extracts_id_from_query_param() {
        let result =
            extract_job_reference("https://example.com/thanks?job_id=AB-12345", "").unwrap();
        assert_eq!(result.external_id.as_deref(), Some("AB-12345"));
    }

    #[test]
    fn falls_back_to_page_content() {
        let html = "<p>Thanks! Your job number: 20451133 has been posted.</p>";
        let result = extract_job_reference("https://example.com/thanks", html).unwrap();
        assert_eq!(result.external_id.as_deref(), Some("20451133"));
        assert!(result.external_url.is_none());
    }

    #[test]
    fn url_match_wins_over_content_match() {
        let html = "<p>Reference: 999</p>";
        let result =
            extract_job_reference("https://example.com/requests/12345678", html).unwrap();
        assert_eq!(result.external_id.as_deref(), Some("12345678"));
    }

    #[test]
    fn no_match_is_none_not_error() {
        assert!(extract_job_reference("https://example.com/", "<p>Thanks!</p>").is_none());
        // Short digit runs must not be mistaken for references.
        assert!(extract_job_reference("https://example.com/jobs/12", "").is_none());
    }
}
