//! Text watermark rendering.
//!
//! Renders the watermark text to a transparent RGBA bitmap that the
//! compositing renderer then blends onto the source image.
//!
//! # Features
//!
//! - Font loaded from a TrueType/OpenType file at renderer construction
//! - Font size taken from a CSS font shorthand (`"24px sans-serif"`)
//! - Hex color parsing (#RGB and #RRGGBB) plus `white`/`black`
//! - Baseline reported alongside the bitmap so callers can anchor text

use super::RenderError;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Parsed RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255)
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Options for text rendering.
#[derive(Debug, Clone)]
pub struct TextRenderOptions {
    pub text: String,
    /// Font size in pixels.
    pub font_size: f32,
    pub color: Color,
}

/// Rendered text bitmap plus the distance from its top edge to the baseline.
#[derive(Debug, Clone)]
pub struct RenderedText {
    pub image: RgbaImage,
    pub baseline: u32,
}

/// Load a font file for text rendering.
pub fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    let data = std::fs::read(path).map_err(|e| {
        RenderError::Draw(format!("Failed to read font {}: {}", path.display(), e))
    })?;
    FontVec::try_from_vec(data)
        .map_err(|e| RenderError::Draw(format!("Invalid font {}: {}", path.display(), e)))
}

/// Extract the pixel size from a CSS font shorthand such as `"24px sans-serif"`.
pub fn parse_font_size(font: &str) -> Result<f32, RenderError> {
    let size = font
        .split_whitespace()
        .find_map(|token| token.strip_suffix("px"))
        .ok_or_else(|| RenderError::Draw(format!("Font '{}' has no pixel size", font)))?;

    let size: f32 = size
        .parse()
        .map_err(|_| RenderError::Draw(format!("Invalid font size in '{}'", font)))?;

    if size <= 0.0 || !size.is_finite() {
        return Err(RenderError::Draw(format!(
            "Font size must be positive, got {}",
            size
        )));
    }

    Ok(size)
}

/// Parse a color string: `#RGB`, `#RRGGBB`, `white` or `black`.
pub fn parse_color(value: &str) -> Result<Color, RenderError> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "white" => return Ok(Color::white()),
        "black" => return Ok(Color::black()),
        _ => {}
    }

    let hex = value
        .strip_prefix('#')
        .ok_or_else(|| RenderError::Draw(format!("Unsupported color '{}'", value)))?;
    if !hex.is_ascii() {
        return Err(RenderError::Draw(format!("Unsupported color '{}'", value)));
    }

    let digit = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| RenderError::Draw(format!("Invalid hex digit in '{}'", value)))
    };

    match hex.len() {
        // Each digit doubled: 0xF -> 0xFF
        3 => Ok(Color::new(
            digit(&hex[0..1])? * 17,
            digit(&hex[1..2])? * 17,
            digit(&hex[2..3])? * 17,
        )),
        6 => Ok(Color::new(
            digit(&hex[0..2])?,
            digit(&hex[2..4])?,
            digit(&hex[4..6])?,
        )),
        _ => Err(RenderError::Draw(format!(
            "Color must be #RGB or #RRGGBB format, got {} characters",
            hex.len()
        ))),
    }
}

/// Calculate the dimensions of rendered text as (width, height).
pub fn measure_text<F: Font>(font: &F, text: &str, font_size: f32) -> (u32, u32) {
    let scaled_font = font.as_scaled(PxScale::from(font_size));

    let mut width = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;

    for c in text.chars() {
        let glyph_id = scaled_font.glyph_id(c);
        if let Some(prev) = prev_glyph {
            width += scaled_font.kern(prev, glyph_id);
        }
        width += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    let padding = 2;
    (
        width.ceil() as u32 + padding,
        scaled_font.height().ceil() as u32 + padding,
    )
}

/// Render text to a fully opaque RGBA bitmap on a transparent background.
///
/// Opacity is applied later, when the bitmap is blended onto the target.
pub fn render_text<F: Font>(
    font: &F,
    options: &TextRenderOptions,
) -> Result<RenderedText, RenderError> {
    if options.text.is_empty() {
        return Err(RenderError::Draw("Cannot render empty text".to_string()));
    }

    let scale = PxScale::from(options.font_size);
    let scaled_font = font.as_scaled(scale);

    let (width, height) = measure_text(font, &options.text, options.font_size);
    let (canvas_width, canvas_height) = (width.max(1), height.max(1));
    let mut image = RgbaImage::new(canvas_width, canvas_height);

    let ascent = scaled_font.ascent();
    let mut cursor_x = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;

    for c in options.text.chars() {
        let glyph_id = scaled_font.glyph_id(c);
        if let Some(prev) = prev_glyph {
            cursor_x += scaled_font.kern(prev, glyph_id);
        }

        let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, ascent));

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();

            outlined.draw(|px, py, coverage| {
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;

                if x >= 0 && y >= 0 && x < canvas_width as i32 && y < canvas_height as i32 {
                    let pixel = Rgba([
                        options.color.r,
                        options.color.g,
                        options.color.b,
                        (coverage.clamp(0.0, 1.0) * 255.0) as u8,
                    ]);
                    let existing = image.get_pixel(x as u32, y as u32);
                    let blended = blend_pixels(*existing, pixel);
                    image.put_pixel(x as u32, y as u32, blended);
                }
            });
        }

        cursor_x += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    Ok(RenderedText {
        image,
        baseline: ascent.ceil().max(0.0) as u32,
    })
}

/// Alpha-composite `top` over `bottom` (anti-aliased glyph overlap).
fn blend_pixels(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = top[3] as f32 / 255.0;
    let bottom_alpha = bottom[3] as f32 / 255.0;

    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let result = (t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
        (result * 255.0) as u8
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        (out_alpha * 255.0) as u8,
    ])
}
