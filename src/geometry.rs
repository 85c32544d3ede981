//! Mapping of the model's 0..=1000 box onto real pixels.

use image::{DynamicImage, GenericImageView};
use thiserror::Error;

use crate::models::NormalizedBox;

/// Full extent of each normalized axis.
pub const NORMALIZED_SCALE: i64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CropError {
    #[error("box coordinate {0} is outside 0..=1000")]
    OutOfRange(i64),
    #[error("box ({x1},{y1})-({x2},{y2}) has no area")]
    Degenerate { x1: u32, y1: u32, x2: u32, y2: u32 },
}

/// Crop rectangle in pixels, `(x1, y1)` inclusive, `(x2, y2)` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

pub fn to_pixel_rect(bbox: &NormalizedBox, width: u32, height: u32) -> Result<PixelRect, CropError> {
    for value in [bbox.ymin, bbox.xmin, bbox.ymax, bbox.xmax] {
        if !(0..=NORMALIZED_SCALE).contains(&value) {
            return Err(CropError::OutOfRange(value));
        }
    }

    let rect = PixelRect {
        x1: scale(bbox.xmin, width),
        y1: scale(bbox.ymin, height),
        x2: scale(bbox.xmax, width),
        y2: scale(bbox.ymax, height),
    };
    if rect.x2 <= rect.x1 || rect.y2 <= rect.y1 {
        return Err(CropError::Degenerate {
            x1: rect.x1,
            y1: rect.y1,
            x2: rect.x2,
            y2: rect.y2,
        });
    }
    Ok(rect)
}

// floor(value / 1000 * extent) without going through floats
fn scale(value: i64, extent: u32) -> u32 {
    (value as u64 * extent as u64 / NORMALIZED_SCALE as u64) as u32
}

pub fn crop_to_box(image: &DynamicImage, bbox: &NormalizedBox) -> Result<(DynamicImage, PixelRect), CropError> {
    let (width, height) = image.dimensions();
    let rect = to_pixel_rect(bbox, width, height)?;
    let cropped = image.crop_imm(rect.x1, rect.y1, rect.width(), rect.height());
    Ok((cropped, rect))
}
