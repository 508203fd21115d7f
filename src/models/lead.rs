use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Context stored against an email by the session collaborator. Upserts are
/// idempotent and last-write-wins; no delete, no cross-tab conflict handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LeadContext {
    /// A context with a generated result attached, not just upload data.
    pub fn has_result(&self) -> bool {
        self.image_id.is_some() && self.preview_url.is_some()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpsert<'a> {
    pub email: &'a str,
    pub context: &'a LeadContext,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLookup {
    pub has_session: bool,
    #[serde(default)]
    pub session: Option<LeadContext>,
}

static EMAIL_RE: OnceLock<regex::Regex> = OnceLock::new();

/// Shallow shape check; the session collaborator is the authority.
pub fn is_valid_email(email: &str) -> bool {
    let re = EMAIL_RE.get_or_init(|| {
        regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("email regex")
    });
    re.is_match(email.trim())
}
