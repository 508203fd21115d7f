pub mod checkout;
pub mod download;
pub mod generation;
pub mod session;

use crate::db::DbPool;
use crate::models::settings::Setting;

/// Displayable failure from any collaborator call.
#[derive(Debug)]
pub struct ApiError(pub String);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn base_url(pool: &DbPool) -> String {
    Setting::get_or(pool, "api_base_url", "https://api.furever.studio")
        .trim_end_matches('/')
        .to_string()
}

pub(crate) fn client(pool: &DbPool, timeout_key: &str, default_secs: i64) -> Result<reqwest::blocking::Client, ApiError> {
    let secs = Setting::get_i64_or(pool, timeout_key, default_secs) as u64;
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(secs))
        .build()
        .map_err(|e| ApiError(format!("HTTP client error: {}", e)))
}

/// Pull a human-readable message out of a collaborator error body, which is
/// JSON `{error}` on the happy-unhappy path but can be anything.
pub(crate) fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect());
    format!("service returned {}: {}", status, detail)
}
