//! Form-stage driver — best-effort handlers for the target site's multi-step
//! quote-request form.
//!
//! Every stage works against the live page and a piece of the job request.
//! Locating an element is attempted with an ordered chain of selector
//! strategies (structural/semantic attributes first, visible-label matching
//! last); absence of an element is a skip, never an error. Only an
//! interaction the browser itself rejects (element detached, tab closed)
//! fails the stage, and the controller converts that into the single
//! terminal `failed` update.
//!
//! The site's layout varies; no layout variant is ever detected — selector
//! strategies are simply exhausted in order.

use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::Page;
use tracing::{debug, info};

use super::AutomationError;
use crate::core::config::BotConfig;
use crate::core::types::ContactDetails;

/// Selector-strategy tables, one chain per stage, tried in order.
pub mod selectors {
    pub const CATEGORY_INPUTS: &[&str] = &[
        "input[name*='category' i]",
        "input[name*='job' i][type='text']",
        "input[placeholder*='what do you need' i]",
        "input[placeholder*='service' i]",
        "input[type='search']",
        "form input[type='text']",
    ];

    pub const LOCATION_INPUTS: &[&str] = &[
        "input[autocomplete='postal-code']",
        "input[name*='postcode' i]",
        "input[name*='suburb' i]",
        "input[name*='location' i]",
        "input[placeholder*='postcode' i]",
        "input[placeholder*='suburb' i]",
    ];

    pub const SUGGESTION_ITEMS: &[&str] = &[
        "[role='listbox'] [role='option']",
        "[role='option']",
        "ul[class*='autocomplete' i] li",
        "ul[class*='suggest' i] li",
        ".autocomplete-results li",
    ];

    /// Anything clickable enough to be a form action.
    pub const CLICKABLES: &str =
        "button, [role='button'], input[type='submit'], a[class*='btn' i]";

    pub const UNSELECTED_CHOICES: &[&str] = &[
        "input[type='radio']:not(:checked)",
        "[role='radio'][aria-checked='false']",
        "input[type='checkbox']:not(:checked)",
        "label[class*='option' i]:not([class*='selected' i])",
    ];

    pub const DESCRIPTION_AREAS: &[&str] = &[
        "textarea[name*='desc' i]",
        "textarea[placeholder*='describe' i]",
        "textarea",
    ];

    pub const FILE_INPUTS: &[&str] = &["input[type='file']"];

    pub const NAME_INPUTS: &[&str] = &[
        "input[autocomplete='name']",
        "input[name*='name' i]:not([name*='user' i])",
        "input[placeholder*='name' i]",
    ];

    pub const EMAIL_INPUTS: &[&str] = &[
        "input[type='email']",
        "input[name*='email' i]",
        "input[placeholder*='email' i]",
    ];

    pub const PHONE_INPUTS: &[&str] = &[
        "input[type='tel']",
        "input[name*='phone' i]",
        "input[name*='mobile' i]",
        "input[placeholder*='phone' i]",
        "input[placeholder*='mobile' i]",
    ];

    pub const OTP_INPUTS: &[&str] = &[
        "input[autocomplete='one-time-code']",
        "input[name*='otp' i]",
        "input[name*='verification' i]",
        "input[name*='code' i]",
        "input[id*='otp' i]",
        "input[inputmode='numeric']",
    ];
}

/// Expected visible labels per action, matched case-insensitively as
/// substrings of a control's inner text.
pub mod labels {
    pub const ADVANCE: &[&str] = &["get quotes", "get free quotes", "continue", "next", "start"];
    pub const NEXT: &[&str] = &["next", "continue"];
    pub const SUBMIT: &[&str] = &["submit", "send", "post my job", "get quotes"];
    pub const VERIFY: &[&str] = &["verify", "confirm", "submit", "continue"];
}

/// Case-insensitive substring match of a control's visible text against the
/// allow-list for a stage.
pub fn label_matches(text: &str, expected: &[&str]) -> bool {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return false;
    }
    expected.iter().any(|label| text.contains(label))
}

// ---------------------------------------------------------------------------
// Element helpers
// ---------------------------------------------------------------------------

/// Try each selector in order; first hit wins, exhaustion is `None`.
pub async fn find_first(page: &Page, chain: &[&str]) -> Option<Element> {
    for sel in chain {
        if let Ok(el) = page.find_element(*sel).await {
            return Some(el);
        }
    }
    None
}

/// Locate a clickable control whose visible text matches one of `expected`.
pub async fn find_labeled_control(page: &Page, expected: &[&str]) -> Option<Element> {
    let candidates = page.find_elements(selectors::CLICKABLES).await.ok()?;
    for el in candidates {
        if let Ok(Some(text)) = el.inner_text().await {
            if label_matches(&text, expected) {
                return Some(el);
            }
        }
    }
    None
}

/// Click the first control matching `expected`. Returns whether one was
/// found; click errors on a found control do propagate.
pub async fn click_labeled_control(
    page: &Page,
    expected: &[&str],
) -> Result<bool, AutomationError> {
    match find_labeled_control(page, expected).await {
        Some(el) => {
            el.click().await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Focus the element and type `text` character by character with a fixed
/// per-char delay, approximating human input for autocomplete fields.
pub async fn type_into(
    el: &Element,
    text: &str,
    per_char_delay_ms: u64,
) -> Result<(), AutomationError> {
    el.click().await?;
    if per_char_delay_ms == 0 {
        el.type_str(text).await?;
        return Ok(());
    }
    for ch in text.chars() {
        el.type_str(ch.to_string()).await?;
        tokio::time::sleep(Duration::from_millis(per_char_delay_ms)).await;
    }
    Ok(())
}

/// Wait for a click-triggered page transition to settle: poll
/// `document.readyState` and the resource-entry count until quiet or until
/// `timeout_ms` elapses. A timeout is not an error — the wait is advisory
/// ("didn't happen, continue") for non-critical transitions.
pub async fn wait_for_transition(page: &Page, quiet_ms: u64, timeout_ms: u64) {
    let poll_ms = 250u64;
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            debug!("wait_for_transition: timeout after {}ms", timeout_ms);
            return;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete {
            stable_since = std::time::Instant::now();
            last_count = count;
        } else if count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            return;
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
}

async fn pause(cfg: &BotConfig) {
    tokio::time::sleep(Duration::from_millis(cfg.resolve_stage_pause_ms())).await;
}

// ---------------------------------------------------------------------------
// Stages, in execution order
// ---------------------------------------------------------------------------

/// Stage 1 — category: type into the search-like field, wait for the
/// autocomplete to populate, pick the first suggestion; fall back to Enter
/// when no dropdown appears.
pub async fn fill_category(
    page: &Page,
    cfg: &BotConfig,
    category: &str,
) -> Result<(), AutomationError> {
    let Some(input) = find_first(page, selectors::CATEGORY_INPUTS).await else {
        debug!("category: no search field on page — skipping");
        return Ok(());
    };
    type_into(&input, category, cfg.resolve_type_delay_ms()).await?;
    tokio::time::sleep(Duration::from_millis(cfg.resolve_autocomplete_wait_ms())).await;

    match find_first(page, selectors::SUGGESTION_ITEMS).await {
        Some(suggestion) => {
            suggestion.click().await?;
            debug!("category: picked autocomplete suggestion");
        }
        None => {
            input.press_key("Enter").await?;
            debug!("category: no suggestions — confirmed with Enter");
        }
    }
    pause(cfg).await;
    Ok(())
}

/// Stage 2 — location: same pattern as category, keyed to the postcode.
pub async fn fill_location(
    page: &Page,
    cfg: &BotConfig,
    postcode: &str,
) -> Result<(), AutomationError> {
    let Some(input) = find_first(page, selectors::LOCATION_INPUTS).await else {
        debug!("location: no postcode field on page — skipping");
        return Ok(());
    };
    type_into(&input, postcode, cfg.resolve_type_delay_ms()).await?;
    tokio::time::sleep(Duration::from_millis(cfg.resolve_autocomplete_wait_ms())).await;

    match find_first(page, selectors::SUGGESTION_ITEMS).await {
        Some(suggestion) => suggestion.click().await.map(|_| ())?,
        None => input.press_key("Enter").await.map(|_| ())?,
    }
    pause(cfg).await;
    Ok(())
}

/// Stage 3 — advance past the landing step via the primary action control
/// ("Get quotes"/"Continue"), then wait out the resulting navigation.
pub async fn advance(page: &Page, cfg: &BotConfig) -> Result<(), AutomationError> {
    if click_labeled_control(page, labels::ADVANCE).await? {
        wait_for_transition(page, 800, cfg.resolve_nav_timeout_ms() / 2).await;
    } else {
        debug!("advance: no primary action control found — skipping");
    }
    Ok(())
}

/// Stage 4 — dynamic question answering. The site asks a variable run of
/// single-choice questions (property type, timing, and whatever else the
/// category adds) before the description step. Prefer a choice whose label
/// matches one of the request-derived `preferences`; otherwise pick the
/// first unselected choice. Click "next", repeat. Stop as soon as a
/// free-text area appears (that is the description field) or no "next"
/// control remains, bounded by `max_question_rounds`.
pub async fn answer_questions(
    page: &Page,
    cfg: &BotConfig,
    preferences: &[String],
) -> Result<(), AutomationError> {
    for round in 0..cfg.resolve_max_question_rounds() {
        if find_first(page, selectors::DESCRIPTION_AREAS).await.is_some() {
            debug!("questions: description field visible after {} rounds", round);
            return Ok(());
        }
        let choice = match find_preferred_choice(page, preferences).await {
            Some(el) => Some(el),
            None => find_first(page, selectors::UNSELECTED_CHOICES).await,
        };
        if let Some(choice) = choice {
            choice.click().await?;
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        if !click_labeled_control(page, labels::NEXT).await? {
            debug!("questions: no next control after {} rounds", round);
            return Ok(());
        }
        wait_for_transition(page, 600, cfg.resolve_stage_pause_ms() * 4).await;
    }
    info!("questions: round limit reached — proceeding");
    Ok(())
}

/// A selectable control whose visible label matches one of the request's
/// preferred answers (property type, timing). Labels only — structural
/// choice inputs rarely carry text themselves.
async fn find_preferred_choice(page: &Page, preferences: &[String]) -> Option<Element> {
    if preferences.is_empty() {
        return None;
    }
    let expected: Vec<&str> = preferences.iter().map(String::as_str).collect();
    let candidates = page
        .find_elements("label, [role='radio'], [role='option']")
        .await
        .ok()?;
    for el in candidates {
        if let Ok(Some(text)) = el.inner_text().await {
            if label_matches(&text, &expected) {
                return Some(el);
            }
        }
    }
    None
}

/// Stage 5 — description into the first free-text area.
pub async fn fill_description(
    page: &Page,
    cfg: &BotConfig,
    description: &str,
) -> Result<(), AutomationError> {
    let Some(area) = find_first(page, selectors::DESCRIPTION_AREAS).await else {
        debug!("description: no free-text area on page — skipping");
        return Ok(());
    };
    // Long text: single burst, no per-char delay.
    type_into(&area, description, 0).await?;
    pause(cfg).await;
    Ok(())
}

/// Stage 7 — contact details by attribute-based matching, then the final
/// submit. Submitting triggers the site's SMS one-time code.
pub async fn fill_contact(
    page: &Page,
    cfg: &BotConfig,
    contact: &ContactDetails,
) -> Result<(), AutomationError> {
    let fields: [(&[&str], &str, &str); 3] = [
        (selectors::NAME_INPUTS, &contact.name, "name"),
        (selectors::EMAIL_INPUTS, &contact.email, "email"),
        (selectors::PHONE_INPUTS, &contact.phone, "phone"),
    ];
    for (chain, value, field) in fields {
        match find_first(page, chain).await {
            Some(el) => type_into(&el, value, cfg.resolve_type_delay_ms()).await?,
            None => debug!("contact: no {} field on page — skipping", field),
        }
    }

    if !click_labeled_control(page, labels::SUBMIT).await? {
        // Label mismatch — fall back to the structural submit control.
        if let Some(el) =
            find_first(page, &["button[type='submit']", "input[type='submit']"]).await
        {
            el.click().await?;
        } else {
            debug!("contact: no submit control found");
            return Ok(());
        }
    }
    wait_for_transition(page, 800, cfg.resolve_nav_timeout_ms() / 2).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matching_is_case_insensitive_substring() {
        assert!(label_matches("  Get Quotes Now ", labels::ADVANCE));
        assert!(label_matches("CONTINUE", labels::ADVANCE));
        assert!(label_matches("Verify code", labels::VERIFY));
        assert!(!label_matches("Cancel", labels::ADVANCE));
        assert!(!label_matches("", labels::ADVANCE));
    }

    #[test]
    fn selector_chains_prefer_semantic_attributes() {
        // Structural/semantic strategies must come before generic fallbacks,
        // otherwise the generic selector would always win.
        assert_eq!(
            selectors::LOCATION_INPUTS[0],
            "input[autocomplete='postal-code']"
        );
        assert_eq!(selectors::OTP_INPUTS[0], "input[autocomplete='one-time-code']");
        assert_eq!(selectors::EMAIL_INPUTS[0], "input[type='email']");
        assert_eq!(
            *selectors::DESCRIPTION_AREAS.last().unwrap(),
            "textarea",
            "generic textarea must be the last resort"
        );
    }

    #[test]
    fn every_chain_is_non_empty() {
        for chain in [
            selectors::CATEGORY_INPUTS,
            selectors::LOCATION_INPUTS,
            selectors::SUGGESTION_ITEMS,
            selectors::UNSELECTED_CHOICES,
            selectors::DESCRIPTION_AREAS,
            selectors::FILE_INPUTS,
            selectors::NAME_INPUTS,
            selectors::EMAIL_INPUTS,
            selectors::PHONE_INPUTS,
            selectors::OTP_INPUTS,
        ] {
            assert!(!chain.is_empty());
        }
    }
}
