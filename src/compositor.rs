use image::{GenericImageView, ImageEncoder};
use std::fs;

use crate::db::DbPool;
use crate::models::settings::Setting;
use crate::raster;

const NAME_SCALE: f32 = 0.055;
const QUOTE_SCALE: f32 = 0.024;
const PADDING_SCALE: f32 = 0.04;
const GRADIENT_REGION: f32 = 0.25;
const GRADIENT_MAX_ALPHA: f32 = 0.70;

const GOLD_DARK: [u8; 3] = [158, 111, 22];
const GOLD_LIGHT: [u8; 3] = [246, 214, 126];

/// RGBA8 brush carried through Parley text layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl TextBrush {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

const QUOTE_BRUSH: TextBrush = TextBrush::rgba(246, 244, 238, 235);
const QUOTE_SHADOW: TextBrush = TextBrush::rgba(0, 0, 0, 110);
const NAME_SHADOW: TextBrush = TextBrush::rgba(0, 0, 0, 185);
const WHITE: TextBrush = TextBrush::rgba(255, 255, 255, 255);

/// Finished overlay render: lossless PNG plus its pixel dimensions.
pub struct ComposedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ComposedImage {
    pub fn data_uri(&self) -> String {
        use base64::Engine as _;
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

enum FontRole {
    Name,
    Quote,
}

/// Burns a pet's name and a tribute quote into a generated portrait. The
/// generation service returns plain images; the memorial variant needs the
/// text in the pixels so downloads and the success page carry it too.
pub struct Compositor {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    name_family: String,
    quote_family: String,
    name_font: vello_cpu::peniko::FontData,
    quote_font: vello_cpu::peniko::FontData,
}

impl Compositor {
    /// Load the configured tribute fonts. Missing font files reject here and
    /// the flow keeps going with un-composited images.
    pub fn from_settings(pool: &DbPool) -> Result<Self, String> {
        let name_path = Setting::get_or(
            pool,
            "tribute_name_font",
            "studio/assets/fonts/tribute-serif-bold.ttf",
        );
        let quote_path = Setting::get_or(
            pool,
            "tribute_quote_font",
            "studio/assets/fonts/tribute-serif-italic.ttf",
        );
        let name_bytes =
            fs::read(&name_path).map_err(|e| format!("name font {}: {}", name_path, e))?;
        let quote_bytes =
            fs::read(&quote_path).map_err(|e| format!("quote font {}: {}", quote_path, e))?;
        Self::new(name_bytes, quote_bytes)
    }

    pub fn new(name_font_bytes: Vec<u8>, quote_font_bytes: Vec<u8>) -> Result<Self, String> {
        let mut font_ctx = parley::FontContext::default();
        let name_family = register_font(&mut font_ctx, &name_font_bytes)?;
        let quote_family = register_font(&mut font_ctx, &quote_font_bytes)?;
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            name_family,
            quote_family,
            name_font: vello_cpu::peniko::FontData::new(
                vello_cpu::peniko::Blob::from(name_font_bytes),
                0,
            ),
            quote_font: vello_cpu::peniko::FontData::new(
                vello_cpu::peniko::Blob::from(quote_font_bytes),
                0,
            ),
        })
    }

    /// Render the tribute overlay onto `image_bytes` at its native
    /// resolution and export a lossless PNG.
    pub fn render_tribute(
        &mut self,
        image_bytes: &[u8],
        pet_name: &str,
        quote: &str,
    ) -> Result<ComposedImage, String> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| format!("tribute source failed to decode: {}", e))?;
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 || w > u16::MAX as u32 || h > u16::MAX as u32 {
            return Err(format!("tribute source has unusable dimensions {}x{}", w, h));
        }

        let mut base = img.to_rgba8().into_raw();
        raster::premultiply(&mut base);
        raster::fade_to_black_bottom(&mut base, w, h, GRADIENT_REGION, GRADIENT_MAX_ALPHA)?;

        let name_size = w as f32 * NAME_SCALE;
        let quote_size = w as f32 * QUOTE_SCALE;
        let padding = w as f32 * PADDING_SCALE;

        let name_upper = pet_name.to_uppercase();
        let name_layout = self.layout(&name_upper, FontRole::Name, name_size, WHITE)?;
        let name_w = name_layout.full_width();
        let name_h = name_layout.height();
        let name_x = (w as f32 - name_w) / 2.0;
        let name_y = h as f32 - padding - name_h;

        // Greedy wrap of the quoted text on measured widths.
        let quoted = format!("\u{201C}{}\u{201D}", quote);
        let max_line = w as f32 - 4.0 * padding;
        let lines = {
            let measure = |s: &str| match self.layout(s, FontRole::Quote, quote_size, QUOTE_BRUSH)
            {
                Ok(l) => l.full_width(),
                Err(_) => f32::INFINITY,
            };
            wrap_to_width(&quoted, max_line, measure)
        };

        // Stack the wrapped lines bottom-up, ending just above the name.
        let mut quote_layouts = Vec::new();
        let mut bottom = name_y - quote_size * 0.6;
        for line in lines.iter().rev() {
            let layout = self.layout(line, FontRole::Quote, quote_size, QUOTE_BRUSH)?;
            let top = bottom - layout.height();
            let x = (w as f32 - layout.full_width()) / 2.0;
            bottom = top - quote_size * 0.25;
            quote_layouts.push((layout, x, top));
        }

        let (w16, h16) = (w as u16, h as u16);

        // Shadow pass: all glyphs in offset black, softened with a blur.
        let off = (name_size * 0.045).max(1.0);
        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        for (layout, x, y) in &quote_layouts {
            draw_layout(&mut ctx, layout, &self.quote_font, x + off, y + off, Some(QUOTE_SHADOW));
        }
        draw_layout(
            &mut ctx,
            &name_layout,
            &self.name_font,
            name_x + off,
            name_y + off,
            Some(NAME_SHADOW),
        );
        let mut shadow_pix = vello_cpu::Pixmap::new(w16, h16);
        ctx.flush();
        ctx.render_to_pixmap(&mut shadow_pix);
        let radius = ((w / 512).max(2)).min(8);
        let blurred = raster::blur_premul(shadow_pix.data_as_u8_slice(), w, h, radius)?;
        raster::over_in_place(&mut base, &blurred)?;

        // Quote fill pass.
        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        for (layout, x, y) in &quote_layouts {
            draw_layout(&mut ctx, layout, &self.quote_font, *x, *y, None);
        }
        let mut quote_pix = vello_cpu::Pixmap::new(w16, h16);
        ctx.flush();
        ctx.render_to_pixmap(&mut quote_pix);
        raster::over_in_place(&mut base, quote_pix.data_as_u8_slice())?;

        // Name pass: white mask recolored with the horizontal gold ramp.
        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        draw_layout(&mut ctx, &name_layout, &self.name_font, name_x, name_y, None);
        let mut name_pix = vello_cpu::Pixmap::new(w16, h16);
        ctx.flush();
        ctx.render_to_pixmap(&mut name_pix);
        gold_ramp_colorize(
            name_pix.data_as_u8_slice_mut(),
            w,
            name_x,
            name_w.max(1.0),
        );
        raster::over_in_place(&mut base, name_pix.data_as_u8_slice())?;

        raster::unpremultiply(&mut base);

        let mut png = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(&base, w, h, image::ExtendedColorType::Rgba8)
            .map_err(|e| format!("tribute PNG encode failed: {}", e))?;

        Ok(ComposedImage {
            png,
            width: w,
            height: h,
        })
    }

    fn layout(
        &mut self,
        text: &str,
        role: FontRole,
        size_px: f32,
        brush: TextBrush,
    ) -> Result<parley::Layout<TextBrush>, String> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err("text size must be finite and positive".to_string());
        }
        let family = match role {
            FontRole::Name => self.name_family.clone(),
            FontRole::Quote => self.quote_family.clone(),
        };
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));
        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

fn register_font(font_ctx: &mut parley::FontContext, bytes: &[u8]) -> Result<String, String> {
    let families = font_ctx
        .collection
        .register_fonts(parley::fontique::Blob::from(bytes.to_vec()), None);
    let family_id = families
        .first()
        .map(|(id, _)| *id)
        .ok_or_else(|| "no font families registered from font bytes".to_string())?;
    let name = font_ctx
        .collection
        .family_name(family_id)
        .ok_or_else(|| "registered font family has no name".to_string())?
        .to_string();
    Ok(name)
}

fn draw_layout(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<TextBrush>,
    font: &vello_cpu::peniko::FontData,
    x: f32,
    y: f32,
    brush_override: Option<TextBrush>,
) {
    ctx.set_transform(vello_cpu::kurbo::Affine::translate((x as f64, y as f64)));
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let brush = brush_override.unwrap_or(run.style().brush);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
}

/// Recolor a premultiplied white text mask with the horizontal gold ramp:
/// dark at both edges of the text's bounding box, light in the middle.
fn gold_ramp_colorize(buf: &mut [u8], width: u32, text_x: f32, text_w: f32) {
    for (i, px) in buf.chunks_exact_mut(4).enumerate() {
        let a = px[3];
        if a == 0 {
            continue;
        }
        let x = (i as u32 % width) as f32;
        let t = ((x - text_x) / text_w).clamp(0.0, 1.0);
        let ramp = 1.0 - (2.0 * t - 1.0).abs();
        let rgb = raster::lerp_rgb(GOLD_DARK, GOLD_LIGHT, ramp);
        let a32 = a as u32;
        px[0] = ((rgb[0] as u32 * a32 + 127) / 255) as u8;
        px[1] = ((rgb[1] as u32 * a32 + 127) / 255) as u8;
        px[2] = ((rgb[2] as u32 * a32 + 127) / 255) as u8;
    }
}

/// Greedy word wrap: accumulate words into a line while the measured width
/// stays within `max_width`; the word that would overflow starts the next
/// line. A word too wide for an empty line gets a line to itself.
pub fn wrap_to_width(
    text: &str,
    max_width: f32,
    mut measure: impl FnMut(&str) -> f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if !current.is_empty() && measure(&candidate) > max_width {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn render_file_name(image_id: &str, variant: &str) -> String {
    let safe: String = image_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}.png", safe, variant)
}

/// Persist a finished render so display, HD download and the success page
/// never re-composite. Returns the stored path.
pub fn cache_render(
    pool: &DbPool,
    image_id: &str,
    variant: &str,
    png: &[u8],
) -> Result<String, String> {
    let dir = Setting::get_or(pool, "tribute_renders_path", "studio/renders/");
    fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    let path = format!("{}{}", dir, render_file_name(image_id, variant));
    fs::write(&path, png).map_err(|e| e.to_string())?;
    Ok(path)
}

pub fn cached_render(pool: &DbPool, image_id: &str, variant: &str) -> Option<Vec<u8>> {
    let dir = Setting::get_or(pool, "tribute_renders_path", "studio/renders/");
    let path = format!("{}{}", dir, render_file_name(image_id, variant));
    fs::read(path).ok()
}
