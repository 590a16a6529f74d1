//! Printable canvas placement
//!
//! Content is scaled to `content_width`, then pasted onto a canvas as wide as
//! the print head, centered and shifted by the per-device machine offset.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{PrintError, PrintResult};

/// Canvas geometry for one printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasLayout {
    /// Printable width of the head in dots (576 for 80mm at 203 DPI)
    pub canvas_width: u32,
    /// Width the content is scaled to
    pub content_width: u32,
    /// Horizontal calibration for print-head misalignment, in dots
    pub machine_offset: i32,
}

impl Default for CanvasLayout {
    fn default() -> Self {
        Self {
            canvas_width: 576,
            content_width: 560,
            machine_offset: 12,
        }
    }
}

impl CanvasLayout {
    /// Left edge of the pasted content
    ///
    /// `floor((canvas_width - content_width) / 2) + machine_offset`
    pub fn offset(&self) -> i64 {
        let slack = self.canvas_width as i64 - self.content_width as i64;
        slack.div_euclid(2) + self.machine_offset as i64
    }
}

/// Scale `content` to the layout's content width and place it on a fresh canvas
///
/// Height follows the aspect ratio. Anything pushed past the right (or left)
/// edge by the offset is clipped.
#[instrument(skip(content), fields(src_w = content.width(), src_h = content.height()))]
pub fn compose(content: &GrayImage, layout: &CanvasLayout, background: u8) -> PrintResult<GrayImage> {
    let (src_w, src_h) = content.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(PrintError::InvalidInput(format!(
            "zero-area content: {}x{}",
            src_w, src_h
        )));
    }
    if layout.canvas_width == 0 || layout.content_width == 0 {
        return Err(PrintError::InvalidInput(format!(
            "zero-width canvas layout: canvas={} content={}",
            layout.canvas_width, layout.content_width
        )));
    }

    let height = scaled_height(src_w, src_h, layout.content_width);
    let resized = if src_w == layout.content_width {
        content.clone()
    } else {
        imageops::resize(content, layout.content_width, height, FilterType::Triangle)
    };

    let mut canvas = GrayImage::from_pixel(layout.canvas_width, height, Luma([background]));
    let offset = layout.offset();
    imageops::replace(&mut canvas, &resized, offset, 0);

    debug!(offset, width = layout.canvas_width, height, "content placed on canvas");
    Ok(canvas)
}

fn scaled_height(src_w: u32, src_h: u32, target_w: u32) -> u32 {
    let h = (src_h as u64 * target_w as u64 + src_w as u64 / 2) / src_w as u64;
    h.clamp(1, u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([0]))
    }

    #[test]
    fn test_offset_with_machine_correction() {
        let layout = CanvasLayout {
            canvas_width: 576,
            content_width: 560,
            machine_offset: 12,
        };
        assert_eq!(layout.offset(), 20);
    }

    #[test]
    fn test_offset_floors() {
        let layout = CanvasLayout {
            canvas_width: 577,
            content_width: 560,
            machine_offset: 0,
        };
        assert_eq!(layout.offset(), 8);
    }

    #[test]
    fn test_content_left_edge() {
        let layout = CanvasLayout::default();
        let canvas = compose(&black(560, 40), &layout, 255).unwrap();

        assert_eq!(canvas.dimensions(), (576, 40));
        assert_eq!(canvas.get_pixel(19, 5)[0], 255);
        assert_eq!(canvas.get_pixel(20, 5)[0], 0);
        assert_eq!(canvas.get_pixel(575, 5)[0], 0);
    }

    #[test]
    fn test_resize_keeps_aspect() {
        let layout = CanvasLayout {
            canvas_width: 576,
            content_width: 280,
            machine_offset: 0,
        };
        let canvas = compose(&black(1120, 400), &layout, 255).unwrap();
        assert_eq!(canvas.height(), 100);
        assert_eq!(canvas.width(), 576);
    }

    #[test]
    fn test_overflow_is_clipped() {
        let layout = CanvasLayout {
            canvas_width: 100,
            content_width: 100,
            machine_offset: 30,
        };
        let canvas = compose(&black(100, 10), &layout, 255).unwrap();

        assert_eq!(canvas.width(), 100);
        assert_eq!(canvas.get_pixel(29, 0)[0], 255);
        assert_eq!(canvas.get_pixel(99, 0)[0], 0);
    }

    #[test]
    fn test_background_fill() {
        let layout = CanvasLayout {
            canvas_width: 64,
            content_width: 32,
            machine_offset: 0,
        };
        let canvas = compose(&GrayImage::from_pixel(32, 4, Luma([255])), &layout, 0).unwrap();
        assert_eq!(canvas.get_pixel(0, 0)[0], 0);
        assert_eq!(canvas.get_pixel(20, 0)[0], 255);
    }

    #[test]
    fn test_zero_width_layout_rejected() {
        let layout = CanvasLayout {
            canvas_width: 0,
            content_width: 560,
            machine_offset: 0,
        };
        assert!(matches!(
            compose(&black(10, 10), &layout, 255),
            Err(PrintError::InvalidInput(_))
        ));
    }
}
