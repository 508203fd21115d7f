use super::ApiError;
use crate::db::DbPool;
use crate::models::lead::{LeadContext, LeadUpsert, SessionLookup};

/// Look up a stored session by email.
pub fn lookup(pool: &DbPool, email: &str) -> Result<SessionLookup, ApiError> {
    let url = format!("{}/api/session", super::base_url(pool));
    let client = super::client(pool, "api_session_timeout_secs", 15)?;

    let resp = client
        .get(&url)
        .query(&[("email", email)])
        .send()
        .map_err(|e| ApiError(format!("session lookup failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(ApiError(format!(
            "session {}",
            super::error_message(status, &text)
        )));
    }

    resp.json()
        .map_err(|e| ApiError(format!("session JSON parse error: {}", e)))
}

/// Idempotent last-write-wins upsert of the visitor's context. Safe to call
/// on every email capture and generation success.
pub fn upsert_lead(pool: &DbPool, email: &str, context: &LeadContext) -> Result<(), ApiError> {
    let url = format!("{}/api/lead", super::base_url(pool));
    let client = super::client(pool, "api_session_timeout_secs", 15)?;

    let resp = client
        .post(&url)
        .json(&LeadUpsert { email, context })
        .send()
        .map_err(|e| ApiError(format!("lead upsert failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(ApiError(format!(
            "lead {}",
            super::error_message(status, &text)
        )));
    }

    Ok(())
}
