//! TSPL label framing
//!
//! TSPL is line oriented: ASCII commands terminated by `\r\n`, except that
//! `BITMAP` carries the packed rows inline right after its last comma.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::raster::MonochromeRaster;

/// Dots per millimetre at 203 DPI
const DOTS_PER_MM: u32 = 8;

/// Label geometry for one TSPL printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsplSettings {
    /// Label stock width
    pub label_width_mm: u32,
    /// Gap between labels
    pub gap_mm: u32,
    /// Gap offset
    pub gap_offset_mm: u32,
    /// Extra label length so feed rounding does not clip the bottom rows
    pub vertical_buffer_mm: u32,
    /// Vertical placement of the bitmap inside the label, in dots
    pub y_offset: u32,
    /// Use this label length instead of deriving it from the image
    pub fixed_height_mm: Option<u32>,
    /// `PRINT` copies
    pub copies: u32,
}

impl Default for TsplSettings {
    fn default() -> Self {
        Self {
            label_width_mm: 80,
            gap_mm: 2,
            gap_offset_mm: 0,
            vertical_buffer_mm: 10,
            y_offset: 10,
            fixed_height_mm: None,
            copies: 1,
        }
    }
}

/// `SIZE`/`GAP`/`CLS`/`BITMAP`/`PRINT` framer
#[derive(Debug, Clone, Default)]
pub struct TsplRasterFramer {
    settings: TsplSettings,
}

impl TsplRasterFramer {
    pub fn new(settings: TsplSettings) -> Self {
        Self { settings }
    }

    /// Label length for a raster of `height` dots
    pub fn label_height_mm(&self, height: u32) -> u32 {
        self.settings
            .fixed_height_mm
            .unwrap_or_else(|| height.div_ceil(DOTS_PER_MM) + self.settings.vertical_buffer_mm)
    }

    /// Frame a raster as one label
    #[instrument(skip(self, raster), fields(bytes_per_row = raster.bytes_per_row(), height = raster.height()))]
    pub fn frame(&self, raster: &MonochromeRaster) -> Vec<u8> {
        let s = &self.settings;
        let height_mm = self.label_height_mm(raster.height());
        debug!(height_mm, "label size");

        let header = format!(
            "SIZE {} mm,{} mm\r\nGAP {} mm,{} mm\r\nCLS\r\nBITMAP 0,{},{},{},0,",
            s.label_width_mm,
            height_mm,
            s.gap_mm,
            s.gap_offset_mm,
            s.y_offset,
            raster.bytes_per_row(),
            raster.height(),
        );
        let footer = format!("\r\nPRINT {}\r\n", s.copies);

        let mut buf = Vec::with_capacity(header.len() + raster.data().len() + footer.len());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(raster.data());
        buf.extend_from_slice(footer.as_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn raster(width: u32, height: u32) -> MonochromeRaster {
        crate::raster::binarize(&GrayImage::from_pixel(width, height, Luma([0])), 128).unwrap()
    }

    #[test]
    fn test_frame_bit_exact() {
        let r = raster(576, 300);
        let data = TsplRasterFramer::default().frame(&r);

        let header = b"SIZE 80 mm,48 mm\r\nGAP 2 mm,0 mm\r\nCLS\r\nBITMAP 0,10,72,300,0,";
        assert_eq!(&data[..header.len()], header);

        let body = &data[header.len()..header.len() + 72 * 300];
        assert_eq!(body, r.data());
        assert_eq!(&data[header.len() + 72 * 300..], b"\r\nPRINT 1\r\n");
    }

    #[test]
    fn test_label_height_rounds_up() {
        let framer = TsplRasterFramer::new(TsplSettings {
            vertical_buffer_mm: 6,
            ..Default::default()
        });
        assert_eq!(framer.label_height_mm(8), 7);
        assert_eq!(framer.label_height_mm(9), 8);
    }

    #[test]
    fn test_fixed_label_height() {
        let framer = TsplRasterFramer::new(TsplSettings {
            fixed_height_mm: Some(80),
            ..Default::default()
        });
        let data = framer.frame(&raster(16, 1000));
        assert!(data.starts_with(b"SIZE 80 mm,80 mm\r\n"));
    }

    #[test]
    fn test_copies_and_offset() {
        let framer = TsplRasterFramer::new(TsplSettings {
            y_offset: 0,
            copies: 2,
            ..Default::default()
        });
        let data = framer.frame(&raster(8, 1));
        let text = String::from_utf8_lossy(&data);
        assert!(text.contains("BITMAP 0,0,1,1,0,"));
        assert!(text.ends_with("\r\nPRINT 2\r\n"));
    }
}
