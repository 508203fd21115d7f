use super::ApiError;
use crate::db::DbPool;

/// Fetch a generated image's bytes by identifier; `composited` requests the
/// tribute-overlay variant when one was stored server-side.
pub fn fetch_image(pool: &DbPool, image_id: &str, composited: bool) -> Result<Vec<u8>, ApiError> {
    let mut url = format!("{}/api/download/{}", super::base_url(pool), image_id);
    if composited {
        url.push_str("?composited=true");
    }
    fetch_url(pool, &url)
}

/// Fetch raw image bytes from a collaborator-provided URL (preview and HD
/// assets arrive as URLs, not identifiers).
pub fn fetch_url(pool: &DbPool, url: &str) -> Result<Vec<u8>, ApiError> {
    let client = super::client(pool, "api_timeout_secs", 120)?;

    let resp = client
        .get(url)
        .send()
        .map_err(|e| ApiError(format!("download failed: {}", e)))?;

    if !resp.status().is_success() {
        return Err(ApiError(format!("download returned {}", resp.status())));
    }

    resp.bytes()
        .map(|b| b.to_vec())
        .map_err(|e| ApiError(format!("download read failed: {}", e)))
}
