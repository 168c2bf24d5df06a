//! Position calculation for watermark placement.
//!
//! Corner placements keep a fixed margin from the nearest edges. Upper
//! placements may instead anchor the text baseline at an explicit vertical
//! offset from the top edge; `center` centres the text on both axes.
//!
//! # Example
//!
//! ```
//! use live_watermark::config::Position;
//! use live_watermark::watermark::position::{calculate_position, ImageDimensions, TextDimensions, PlacementPosition};
//!
//! let image = ImageDimensions { width: 800, height: 600 };
//! let text = TextDimensions { width: 100, height: 30, baseline: 24 };
//!
//! let pos = calculate_position(Position::LowerRight, &image, &text, None);
//! assert_eq!(pos, PlacementPosition::new(690, 560)); // 800 - 100 - 10, 600 - 30 - 10
//! ```

use crate::config::Position;

/// Distance from the image edges for corner placements.
pub const MARGIN: u32 = 10;

/// Dimensions of the target image.
#[derive(Debug, Clone, Copy)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Dimensions of the rendered text bitmap and its baseline.
#[derive(Debug, Clone, Copy)]
pub struct TextDimensions {
    pub width: u32,
    pub height: u32,
    pub baseline: u32,
}

/// Top-left corner where the text bitmap is drawn. May be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPosition {
    pub x: i32,
    pub y: i32,
}

impl PlacementPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Calculate where the text bitmap goes.
///
/// `y_offset` is the baseline distance from the top edge and only applies
/// to upper positions; without it they use the plain margin.
pub fn calculate_position(
    position: Position,
    image: &ImageDimensions,
    text: &TextDimensions,
    y_offset: Option<u32>,
) -> PlacementPosition {
    let img_w = image.width as i32;
    let img_h = image.height as i32;
    let txt_w = text.width as i32;
    let txt_h = text.height as i32;
    let m = MARGIN as i32;

    let upper_y = match y_offset {
        Some(offset) => offset as i32 - text.baseline as i32,
        None => m,
    };
    let lower_y = img_h - txt_h - m;

    match position {
        Position::UpperLeft => PlacementPosition::new(m, upper_y),
        Position::UpperRight => PlacementPosition::new(img_w - txt_w - m, upper_y),
        Position::LowerLeft => PlacementPosition::new(m, lower_y),
        Position::LowerRight => PlacementPosition::new(img_w - txt_w - m, lower_y),
        Position::Center => PlacementPosition::new((img_w - txt_w) / 2, (img_h - txt_h) / 2),
    }
}

/// Check if a placement is at least partially visible within the image.
pub fn is_visible(pos: &PlacementPosition, image: &ImageDimensions, text: &TextDimensions) -> bool {
    let right = pos.x + text.width as i32;
    let bottom = pos.y + text.height as i32;

    pos.x < image.width as i32 && pos.y < image.height as i32 && right > 0 && bottom > 0
}
