use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageEncoder, ImageFormat, RgbImage};
use std::path::Path;

use crate::db::DbPool;
use crate::models::session::SourcePhoto;
use crate::models::settings::Setting;

/// Shrink an uploaded photo before it goes anywhere near the generation
/// service. A JPEG already under the threshold passes through untouched;
/// everything else is decoded, bounded to the maximum dimension, flattened
/// onto an opaque background and re-encoded at a fixed quality factor.
pub fn process_upload(pool: &DbPool, file_bytes: &[u8]) -> Result<SourcePhoto, String> {
    let format = image::guess_format(file_bytes)
        .map_err(|e| format!("Unrecognized image data: {}", e))?;

    let threshold = Setting::get_i64_or(pool, "upload_passthrough_bytes", 3_500_000) as usize;
    let max_dim = Setting::get_i64_or(pool, "upload_max_dimension", 2048) as u32;

    let img = image::load_from_memory(file_bytes)
        .map_err(|e| format!("Could not read that photo: {}", e))?;
    let (w, h) = img.dimensions();

    if format == ImageFormat::Jpeg && file_bytes.len() <= threshold && w.max(h) <= max_dim {
        return Ok(SourcePhoto {
            bytes: file_bytes.to_vec(),
            content_type: "image/jpeg",
            width: w,
            height: h,
        });
    }

    let img = if w.max(h) > max_dim {
        img.resize(max_dim, max_dim, FilterType::Lanczos3)
    } else {
        img
    };

    // Opaque background first: transparent PNGs would otherwise come out
    // letterboxed in black after JPEG encoding.
    let flat = flatten_onto_white(&img);
    let (out_w, out_h) = flat.dimensions();

    let quality = Setting::get_i64(pool, "upload_jpeg_quality") as u8;
    let quality = if quality == 0 { 82 } else { quality };

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(flat.as_raw(), out_w, out_h, image::ExtendedColorType::Rgb8)
        .map_err(|e| format!("Photo re-encode failed: {}", e))?;

    log::info!(
        "[upload] {}x{} {} bytes -> {}x{} {} bytes (q{})",
        w,
        h,
        file_bytes.len(),
        out_w,
        out_h,
        out.len(),
        quality
    );

    Ok(SourcePhoto {
        bytes: out,
        content_type: "image/jpeg",
        width: out_w,
        height: out_h,
    })
}

fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut flat = RgbImage::new(w, h);
    for (dst, src) in flat.pixels_mut().zip(rgba.pixels()) {
        let a = src[3] as u32;
        let inv = 255 - a;
        dst[0] = ((src[0] as u32 * a + 255 * inv) / 255) as u8;
        dst[1] = ((src[1] as u32 * a + 255 * inv) / 255) as u8;
        dst[2] = ((src[2] as u32 * a + 255 * inv) / 255) as u8;
    }
    flat
}

/// Check if file size is within the configured upload limit
pub fn check_file_size(pool: &DbPool, size_bytes: usize) -> bool {
    let max = Setting::get_i64_or(pool, "upload_max_bytes", 20 * 1024 * 1024).max(1) as usize;
    size_bytes <= max
}

/// Extension check against the configured allow-list.
pub fn is_allowed_type(pool: &DbPool, filename: &str) -> bool {
    let allowed = Setting::get_or(pool, "upload_allowed_types", "jpg,jpeg,png,gif,bmp,webp");
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    allowed
        .split(',')
        .any(|a| a.trim().eq_ignore_ascii_case(&ext))
}

/// Data URI for the in-flow preview thumbnail.
pub fn to_data_uri(bytes: &[u8], content_type: &str) -> String {
    use base64::Engine as _;
    format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
