//! Built-in compositing renderer.
//!
//! Loads the source, decodes it, draws the watermark text at the requested
//! position with the requested opacity and returns the result as a PNG
//! `data:` URL, which can be written straight back into `src` or a `srcset`
//! candidate.

use super::position::{calculate_position, is_visible, ImageDimensions, PlacementPosition, TextDimensions};
use super::source::SourceLoader;
use super::text_renderer::{load_font, parse_color, parse_font_size, render_text, TextRenderOptions};
use super::{DrawParams, RenderError, Renderer};
use crate::config::RendererConfig;
use ab_glyph::FontVec;
use async_trait::async_trait;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use std::sync::Arc;

/// Renderer that composites text with ab_glyph and the `image` crate.
#[derive(Clone)]
pub struct CompositingRenderer {
    loader: SourceLoader,
    font: Option<Arc<FontVec>>,
}

impl CompositingRenderer {
    /// Build a renderer; the cross-origin capability is fixed here.
    ///
    /// # Errors
    ///
    /// Fails if the font file cannot be loaded or the source loader cannot be
    /// created.
    pub fn new(config: &RendererConfig) -> Result<Self, RenderError> {
        let loader = SourceLoader::new(config)?;
        let font = match config.font_path {
            Some(ref path) => Some(Arc::new(load_font(path)?)),
            None => None,
        };

        if font.is_none() {
            tracing::warn!("No font configured; renders with non-empty text will fail");
        }

        Ok(Self { loader, font })
    }
}

#[async_trait]
impl Renderer for CompositingRenderer {
    async fn render(&self, source: &str, params: &DrawParams) -> Result<String, RenderError> {
        let bytes = self.loader.load(source).await?;
        let font = self.font.clone();
        let params = params.clone();

        tokio::task::spawn_blocking(move || composite(&bytes, font.as_deref(), &params))
            .await
            .map_err(|e| RenderError::Draw(format!("Render task failed: {}", e)))?
    }
}

/// Decode `bytes`, draw the watermark and encode the result as a data URL.
///
/// Empty text leaves the pixels untouched (the image is still re-encoded).
pub fn composite(
    bytes: &[u8],
    font: Option<&FontVec>,
    params: &DrawParams,
) -> Result<String, RenderError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
    let mut target = decoded.to_rgba8();

    if !params.text.is_empty() {
        let font = font.ok_or_else(|| RenderError::Draw("No font configured".to_string()))?;
        let options = TextRenderOptions {
            text: params.text.clone(),
            font_size: parse_font_size(&params.font)?,
            color: parse_color(&params.color)?,
        };
        let rendered = render_text(font, &options)?;

        let image_dims = ImageDimensions {
            width: target.width(),
            height: target.height(),
        };
        let text_dims = TextDimensions {
            width: rendered.image.width(),
            height: rendered.image.height(),
            baseline: rendered.baseline,
        };
        let position = calculate_position(params.position, &image_dims, &text_dims, params.y_offset);

        if is_visible(&position, &image_dims, &text_dims) {
            blend_layer(&mut target, &rendered.image, position, params.opacity);
        }
    }

    encode_data_url(&target)
}

/// PNG-encode an image as a `data:image/png;base64,...` URL.
pub fn encode_data_url(image: &RgbaImage) -> Result<String, RenderError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;

    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&buffer)
    ))
}

/// Blend `layer` onto `target` at `position`, clipped to the target bounds.
fn blend_layer(target: &mut RgbaImage, layer: &RgbaImage, position: PlacementPosition, opacity: f32) {
    let target_width = target.width() as i32;
    let target_height = target.height() as i32;

    let x_start = position.x.max(0);
    let y_start = position.y.max(0);
    let x_end = (position.x + layer.width() as i32).min(target_width);
    let y_end = (position.y + layer.height() as i32).min(target_height);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let lx = (tx - position.x) as u32;
            let ly = (ty - position.y) as u32;

            let fg = layer.get_pixel(lx, ly);
            let bg = target.get_pixel(tx as u32, ty as u32);
            let blended = blend_pixels(*bg, *fg, opacity);
            target.put_pixel(tx as u32, ty as u32, blended);
        }
    }
}

/// Porter-Duff "over" with an extra opacity factor on the foreground.
fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let bg_alpha = background[3] as f32 / 255.0;

    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0) as u8,
    ])
}
