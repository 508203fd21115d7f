//! Premultiplied-RGBA8 pixel primitives used by the tribute compositor.

pub type PremulRgba8 = [u8; 4];

/// Source-over blend of one premultiplied pixel onto another.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255 - src[3] as u32;
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(((dst[i] as u32 * inv + 127) / 255) as u8);
    }
    out
}

/// Blend `src` over `dst` in place. Both buffers are premultiplied RGBA8 of
/// identical length.
pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> Result<(), String> {
    if dst.len() != src.len() || dst.len() % 4 != 0 {
        return Err("over_in_place expects equal-length rgba8 buffers".to_string());
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Straight-alpha to premultiplied, in place.
pub fn premultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 255 {
            continue;
        }
        px[0] = ((px[0] as u32 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u32 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u32 * a + 127) / 255) as u8;
    }
}

/// Premultiplied back to straight alpha, in place.
pub fn unpremultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u32 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u32 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u32 * 255 + a / 2) / a).min(255) as u8;
    }
}

/// Darken the bottom `region` fraction of the image with a vertical ramp:
/// fully transparent at the top of the band, `max_alpha` black at the bottom
/// edge. Keeps overlay text legible whatever the portrait looks like.
pub fn fade_to_black_bottom(
    buf: &mut [u8],
    width: u32,
    height: u32,
    region: f32,
    max_alpha: f32,
) -> Result<(), String> {
    if buf.len() != width as usize * height as usize * 4 {
        return Err("fade_to_black_bottom expects width*height*4 bytes".to_string());
    }
    let band = (height as f32 * region.clamp(0.0, 1.0)).round() as u32;
    if band == 0 {
        return Ok(());
    }
    let start = height - band;
    for y in start..height {
        let t = (y - start) as f32 / band.max(1) as f32;
        let a = (t * max_alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        let shade = [0, 0, 0, a];
        let row = &mut buf[(y * width * 4) as usize..((y + 1) * width * 4) as usize];
        for px in row.chunks_exact_mut(4) {
            let out = over([px[0], px[1], px[2], px[3]], shade);
            px.copy_from_slice(&out);
        }
    }
    Ok(())
}

/// Separable gaussian blur over a premultiplied RGBA8 buffer. Used to soften
/// text drop shadows, so radii stay small.
pub fn blur_premul(src: &[u8], width: u32, height: u32, radius: u32) -> Result<Vec<u8>, String> {
    let expected = width as usize * height as usize * 4;
    if src.len() != expected {
        return Err("blur_premul expects width*height*4 bytes".to_string());
    }
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel(radius);
    let mut tmp = vec![0u8; expected];
    let mut out = vec![0u8; expected];
    blur_pass(src, &mut tmp, width, height, &kernel, true);
    blur_pass(&tmp, &mut out, width, height, &kernel, false);
    Ok(out)
}

fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let sigma = radius as f32 / 2.0;
    let denom = 2.0 * sigma * sigma;
    let r = radius as i32;
    let mut weights: Vec<f32> = (-r..=r)
        .map(|i| (-(i as f32 * i as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

fn blur_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, kernel: &[f32], horiz: bool) {
    let radius = (kernel.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0f32; 4];
            for (k, weight) in kernel.iter().enumerate() {
                let off = k as i32 - radius;
                let (sx, sy) = if horiz {
                    ((x + off).clamp(0, w - 1), y)
                } else {
                    (x, (y + off).clamp(0, h - 1))
                };
                let idx = ((sy * w + sx) * 4) as usize;
                for c in 0..4 {
                    acc[c] += src[idx + c] as f32 * weight;
                }
            }
            let idx = ((y * w + x) * 4) as usize;
            for c in 0..4 {
                dst[idx + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Linear interpolation between two colors, `t` in 0..=1.
pub fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
    ]
}
