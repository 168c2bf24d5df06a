//! Watermark rendering.
//!
//! The orchestrator treats rendering as an opaque boundary: a [`Renderer`]
//! takes one image source plus [`DrawParams`] and asynchronously returns a new
//! source URL. Everything else in this module sits on one side or the other
//! of that call.
//!
//! # Components
//!
//! - **srcset**: split a responsive `srcset` into candidates and join them back
//! - **pipeline**: drive the renderer over one source or every srcset
//!   candidate concurrently, producing a single [`RenderResult`]
//! - **compositing**: the built-in renderer; decodes the source, draws the
//!   text with ab_glyph and returns a PNG `data:` URL
//!
//! # Drawing parameters
//!
//! Derived from the active options at the start of every render:
//! - font string `"{textSize}px sans-serif"`
//! - vertical offset equal to the text size for upper positions, else none
//! - color passed through, opacity normalised from percent to 0.0-1.0

pub mod compositing;
pub mod error;
pub mod pipeline;
pub mod position;
pub mod source;
pub mod srcset;
pub mod text_renderer;

pub use compositing::CompositingRenderer;
pub use error::RenderError;
pub use pipeline::{render, AttributeKind, RenderResult, RenderSource};
pub use srcset::SrcsetEntry;

use crate::config::{Options, Position};
use async_trait::async_trait;

/// Parameters handed to the renderer for every candidate of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawParams {
    pub text: String,
    /// CSS font shorthand, e.g. `"24px sans-serif"`
    pub font: String,
    pub color: String,
    /// 0.0 (transparent) to 1.0 (opaque)
    pub opacity: f32,
    /// Baseline offset from the top edge; only set for upper positions
    pub y_offset: Option<u32>,
    pub position: Position,
}

impl DrawParams {
    pub fn from_options(options: &Options) -> Self {
        Self {
            text: options.text.clone(),
            font: format!("{}px sans-serif", options.text_size),
            color: options.text_color.clone(),
            opacity: options.opacity.clamp(0.0, 100.0) / 100.0,
            y_offset: options.position.is_upper().then_some(options.text_size),
            position: options.position,
        }
    }
}

/// Composites a watermark onto an image source and returns the new source.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, source: &str, params: &DrawParams) -> Result<String, RenderError>;
}
