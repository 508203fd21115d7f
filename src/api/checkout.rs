use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::db::DbPool;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub image_id: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_type: Option<String>,
    pub cancel_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

/// Create a payment session with the external processor. The caller performs
/// a full browser redirect to the returned URL.
pub fn create_session(pool: &DbPool, req: &CheckoutRequest) -> Result<CheckoutResponse, ApiError> {
    let url = format!("{}/api/checkout", super::base_url(pool));
    let client = super::client(pool, "api_session_timeout_secs", 15)?;

    let resp = client
        .post(&url)
        .json(req)
        .send()
        .map_err(|e| ApiError(format!("checkout request failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(ApiError(format!(
            "checkout {}",
            super::error_message(status, &text)
        )));
    }

    resp.json()
        .map_err(|e| ApiError(format!("checkout JSON parse error: {}", e)))
}
