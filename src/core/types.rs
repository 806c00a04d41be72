use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Job request — caller-supplied, immutable for the life of the session
// ---------------------------------------------------------------------------

/// Contact block for the final form stage. All fields are required and
/// non-empty; the SMS one-time code is sent to `phone`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Optional photo payloads, each a `data:image/...;base64,...` URI.
/// `visualization` is a rendered mock-up of the finished job; `original`
/// is a photo of the current state.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PhotoAttachments {
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub visualization: Option<String>,
}

impl PhotoAttachments {
    pub fn is_empty(&self) -> bool {
        self.original.is_none() && self.visualization.is_none()
    }

    /// The payloads actually present, in upload order.
    pub fn payloads(&self) -> Vec<&str> {
        [self.original.as_deref(), self.visualization.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// How soon the caller wants the work done.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Asap,
    #[serde(rename = "within_2_weeks")]
    WithinTwoWeeks,
    #[serde(rename = "within_1_month")]
    WithinOneMonth,
    #[serde(rename = "within_3_months")]
    WithinThreeMonths,
    #[default]
    Flexible,
}

impl Timing {
    /// Visible label the target site uses for this option, matched
    /// case-insensitively against choice controls in the question stage.
    pub fn label(self) -> &'static str {
        match self {
            Timing::Asap => "as soon as possible",
            Timing::WithinTwoWeeks => "within 2 weeks",
            Timing::WithinOneMonth => "within 1 month",
            Timing::WithinThreeMonths => "within 3 months",
            Timing::Flexible => "flexible",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobRequest {
    /// Category name typed into the site's search field, e.g. "Plumbing".
    pub category: String,
    pub postcode: String,
    pub description: String,
    pub property_type: String,
    #[serde(default)]
    pub timing: Timing,
    pub contact: ContactDetails,
    #[serde(default)]
    pub photos: Option<PhotoAttachments>,
}

impl JobRequest {
    /// Reject malformed requests before the automation core is invoked.
    /// Validation lives at the routing layer; the core assumes these hold.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("category", &self.category),
            ("postcode", &self.postcode),
            ("description", &self.description),
            ("property_type", &self.property_type),
            ("contact.name", &self.contact.name),
            ("contact.email", &self.contact.email),
            ("contact.phone", &self.contact.phone),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("missing required field: {}", field));
            }
        }
        Ok(())
    }

    pub fn has_photos(&self) -> bool {
        self.photos.as_ref().is_some_and(|p| !p.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Job status — the caller-visible projection of a session
// ---------------------------------------------------------------------------

/// Session state machine:
/// `pending → filling_form → (uploading_photos)? → filling_form →
///  awaiting_otp → submitting → completed`, with `failed` reachable from
/// every non-terminal state. `awaiting_otp` is the only state in which the
/// controller suspends indefinitely, pending an external OTP submission.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    FillingForm,
    UploadingPhotos,
    AwaitingOtp,
    Submitting,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Coarse pipeline phase, used to assert update monotonicity.
    /// `FillingForm` and `UploadingPhotos` share a phase because the photo
    /// stage is an optional detour inside form filling and the sequence
    /// legitimately returns to `filling_form` afterwards.
    pub fn phase(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::FillingForm | JobState::UploadingPhotos => 1,
            JobState::AwaitingOtp => 2,
            JobState::Submitting => 3,
            JobState::Completed | JobState::Failed => 4,
        }
    }
}

/// The target site's own reference to the created quote request, extracted
/// best-effort after OTP verification. Both fields may be absent — extraction
/// failure is not a verification failure.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct JobResult {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: String,
}

impl JobStatus {
    pub fn progress(job_id: &str, state: JobState, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            state,
            message: message.into(),
            result: None,
            error: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn completed(job_id: &str, result: Option<JobResult>) -> Self {
        let message = match &result {
            Some(r) => format!(
                "quote request posted (reference {})",
                r.external_id.as_deref().unwrap_or("unknown")
            ),
            None => "quote request posted (no site reference found)".to_string(),
        };
        Self {
            job_id: job_id.to_string(),
            state: JobState::Completed,
            message,
            result,
            error: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn failed(job_id: &str, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobState::Failed,
            message: message.into(),
            result: None,
            error: Some(detail.into()),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing-layer wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct OtpRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            category: "Plumbing".into(),
            postcode: "2000".into(),
            description: "Leaking tap".into(),
            property_type: "House".into(),
            timing: Timing::Asap,
            contact: ContactDetails {
                name: "Jane Doe".into(),
                email: "jane@example.com".into(),
                phone: "0400000000".into(),
            },
            photos: None,
        }
    }

    #[test]
    fn valid_request_passes_validation() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn blank_contact_field_fails_validation() {
        let mut req = request();
        req.contact.phone = "   ".into();
        let err = req.validate().unwrap_err();
        assert!(err.contains("contact.phone"), "got: {err}");
    }

    #[test]
    fn timing_serializes_with_numeric_spellings() {
        assert_eq!(
            serde_json::to_string(&Timing::WithinTwoWeeks).unwrap(),
            "\"within_2_weeks\""
        );
        assert_eq!(
            serde_json::from_str::<Timing>("\"within_3_months\"").unwrap(),
            Timing::WithinThreeMonths
        );
        assert_eq!(serde_json::to_string(&Timing::Asap).unwrap(), "\"asap\"");
    }

    #[test]
    fn timing_labels_match_site_spellings() {
        assert_eq!(Timing::WithinTwoWeeks.label(), "within 2 weeks");
        assert_eq!(Timing::Asap.label(), "as soon as possible");
    }

    #[test]
    fn state_phases_follow_the_stage_order() {
        let sequence = [
            JobState::Pending,
            JobState::FillingForm,
            JobState::UploadingPhotos,
            JobState::FillingForm,
            JobState::AwaitingOtp,
            JobState::Submitting,
            JobState::Completed,
        ];
        for pair in sequence.windows(2) {
            assert!(
                pair[0].phase() <= pair[1].phase(),
                "{:?} must not come after {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::AwaitingOtp.is_terminal());
        assert!(!JobState::Submitting.is_terminal());
    }

    #[test]
    fn photo_payloads_preserve_upload_order() {
        let photos = PhotoAttachments {
            original: Some("data:image/png;base64,AAAA".into()),
            visualization: Some("data:image/jpeg;base64,BBBB".into()),
        };
        let payloads = photos.payloads();
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].contains("png"));
        assert!(payloads[1].contains("jpeg"));
        assert!(!photos.is_empty());
        assert!(PhotoAttachments::default().is_empty());
    }

    #[test]
    fn completed_status_without_result_keeps_fields_absent() {
        let status = JobStatus::completed("abc", None);
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["state"], "completed");
    }
}
