use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of an open generation flow. Carries the timestamps its
/// timers derive from, so no stage can leak an interval after exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    Preview,
    EmailCapture,
    Generating { started_at: DateTime<Utc> },
    Result { expires_at: DateTime<Utc> },
    Checkout,
    Email,
    Expired,
    Restoring,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Preview
    }
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Preview => "preview",
            Stage::EmailCapture => "email-capture",
            Stage::Generating { .. } => "generating",
            Stage::Result { .. } => "result",
            Stage::Checkout => "checkout",
            Stage::Email => "email",
            Stage::Expired => "expired",
            Stage::Restoring => "restoring",
        }
    }
}

/// A processed upload, exclusively owned by the session that created it.
#[derive(Debug, Clone)]
pub struct SourcePhoto {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub image_id: String,
    pub preview_url: String,
    pub hd_url: Option<String>,
    pub quote: Option<String>,
    pub pet_name: Option<String>,
}

/// One open flow. Created on photo selection or session restore; destroyed
/// by explicit reset or by the redirect out to checkout.
#[derive(Debug, Clone, Default)]
pub struct GenerationSession {
    pub stage: Stage,
    pub source: Option<SourcePhoto>,
    pub preview_data_uri: Option<String>,
    pub result: Option<GenerationOutcome>,
    pub email: Option<String>,
    pub pet_name: Option<String>,
    pub gender: Option<String>,
    pub style: Option<String>,
    /// Dismissible, surfaced inline next to the flow.
    pub error: Option<String>,
}
