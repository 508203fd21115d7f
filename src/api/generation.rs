use serde::Deserialize;

use super::ApiError;
use crate::db::DbPool;
use crate::models::session::SourcePhoto;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub image_id: String,
    pub preview_url: String,
    #[serde(default)]
    pub hd_url: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub photo: SourcePhoto,
    pub gender: Option<String>,
    pub pet_name: Option<String>,
    pub style: Option<String>,
    pub use_pack_credit: bool,
    pub use_secret_credit: bool,
}

/// Multipart POST to the generation service. Oversized payloads come back as
/// HTTP 413 and are translated into an actionable message; other failures
/// carry the service's own error text when it sent one.
pub fn generate(pool: &DbPool, req: &GenerationRequest) -> Result<GenerationResponse, ApiError> {
    let url = format!("{}/api/generate", super::base_url(pool));

    let part = reqwest::blocking::multipart::Part::bytes(req.photo.bytes.clone())
        .file_name("photo.jpg")
        .mime_str(req.photo.content_type)
        .map_err(|e| ApiError(format!("invalid photo content type: {}", e)))?;

    let mut form = reqwest::blocking::multipart::Form::new().part("image", part);
    if let Some(gender) = &req.gender {
        form = form.text("gender", gender.clone());
    }
    if let Some(pet_name) = &req.pet_name {
        form = form.text("petName", pet_name.clone());
    }
    if let Some(style) = &req.style {
        form = form.text("style", style.clone());
    }
    if req.use_pack_credit {
        form = form.text("usePackCredit", "true");
    }
    if req.use_secret_credit {
        form = form.text("useSecretCredit", "true");
    }

    let client = super::client(pool, "api_timeout_secs", 120)?;
    let resp = client
        .post(&url)
        .multipart(form)
        .send()
        .map_err(|e| ApiError(format!("generation request failed: {}", e)))?;

    if resp.status() == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
        return Err(ApiError(
            "That photo is too large even after compression — please try a smaller one.".to_string(),
        ));
    }

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(ApiError(format!(
            "generation {}",
            super::error_message(status, &text)
        )));
    }

    resp.json()
        .map_err(|e| ApiError(format!("generation JSON parse error: {}", e)))
}
