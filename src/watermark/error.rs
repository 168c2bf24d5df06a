//! Render error types.
//!
//! Defines the failures a renderer can report for one candidate source. Any
//! of them fails the whole image; the orchestrator logs it and flags the image
//! `error` without touching its attributes.

use thiserror::Error;

/// Errors that can occur while rendering a watermark onto one source.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to fetch the source image
    #[error("Failed to fetch image source: {0}")]
    Fetch(String),

    /// Source refused for pixel access by the cross-origin policy
    #[error("Cross-origin source not readable: {0}")]
    CrossOrigin(String),

    /// Failed to decode the source image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Failed to draw the watermark text
    #[error("Failed to draw watermark: {0}")]
    Draw(String),

    /// Failed to encode the watermarked image
    #[error("Failed to encode watermarked image: {0}")]
    Encode(String),

    /// The image has neither a usable `src` nor `srcset`
    #[error("Image has no source to watermark")]
    MissingSource,
}
