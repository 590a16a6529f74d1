//! Monochrome raster conversion
//!
//! Turns a decoded image into the 1-bit packed bitmap both TSPL `BITMAP` and
//! ESC/POS `GS v 0` expect: row-major, 8 pixels per byte, bit 7 of each byte
//! is the leftmost pixel, a set bit prints black.

use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{PrintError, PrintResult};

/// Tunables for the greyscale and threshold steps
///
/// Screenshot renders and vector draws come out with different contrast, so
/// none of these are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterSettings {
    /// Luminance below this value is ink
    pub threshold: u8,
    /// Contrast adjustment in -1.0..1.0 (0 = unchanged)
    pub contrast: f32,
    /// Brightness adjustment in -1.0..1.0 (0 = unchanged)
    pub brightness: f32,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            threshold: 128,
            contrast: 0.4,
            brightness: 0.1,
        }
    }
}

/// Packed 1-bit-per-pixel bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonochromeRaster {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    data: Vec<u8>,
}

impl MonochromeRaster {
    /// Create an all-white raster
    ///
    /// Fails with `InvalidInput` for a zero-area size.
    pub fn blank(width: u32, height: u32) -> PrintResult<Self> {
        if width == 0 || height == 0 {
            return Err(PrintError::InvalidInput(format!(
                "zero-area raster: {}x{}",
                width, height
            )));
        }

        let bytes_per_row = width.div_ceil(8) as usize;
        Ok(Self {
            width,
            height,
            bytes_per_row,
            data: vec![0; bytes_per_row * height as usize],
        })
    }

    /// Width in dots
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in dots (rows)
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `ceil(width / 8)`
    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Packed rows, exactly `bytes_per_row * height` bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the dot at (x, y) prints. Out-of-range coordinates never do.
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let (index, mask) = self.locate(x, y);
        self.data[index] & mask != 0
    }

    fn set_ink(&mut self, x: u32, y: u32) {
        let (index, mask) = self.locate(x, y);
        self.data[index] |= mask;
    }

    fn locate(&self, x: u32, y: u32) -> (usize, u8) {
        let index = y as usize * self.bytes_per_row + (x / 8) as usize;
        (index, 0x80 >> (x % 8))
    }
}

/// Flatten, greyscale and contrast/brightness-adjust a decoded image
///
/// Luma uses Rec.709 weights. Transparent pixels (alpha < 128) become white
/// so they never print.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn normalize(image: &DynamicImage, settings: &RasterSettings) -> GrayImage {
    let rgba = image.to_rgba8();
    let factor = contrast_factor(settings.contrast);

    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let pixel = rgba.get_pixel(x, y);
        let luma = if pixel[3] < 128 {
            255.0
        } else {
            0.2126 * pixel[0] as f32 + 0.7152 * pixel[1] as f32 + 0.0722 * pixel[2] as f32
        };
        Luma([adjust(luma, factor, settings.brightness)])
    })
}

/// Pack a greyscale image into a monochrome raster
///
/// A pixel is ink iff its intensity is strictly below `threshold`.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn binarize(image: &GrayImage, threshold: u8) -> PrintResult<MonochromeRaster> {
    let mut raster = MonochromeRaster::blank(image.width(), image.height())?;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[0] < threshold {
            raster.set_ink(x, y);
        }
    }

    Ok(raster)
}

fn contrast_factor(contrast: f32) -> f32 {
    let c = contrast.clamp(-1.0, 0.99);
    (c + 1.0) / (1.0 - c)
}

fn adjust(value: f32, factor: f32, brightness: f32) -> u8 {
    let mut v = factor * (value - 127.0) + 127.0;
    let b = brightness.clamp(-1.0, 1.0);
    if b < 0.0 {
        v *= 1.0 + b;
    } else {
        v += (255.0 - v) * b;
    }
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    #[test]
    fn test_dimensions() {
        for width in [1u32, 7, 8, 9, 17, 560, 576] {
            let raster = binarize(&flat(width, 3, 255), 128).unwrap();
            assert_eq!(raster.bytes_per_row(), width.div_ceil(8) as usize);
            assert_eq!(raster.data().len(), raster.bytes_per_row() * 3);
            assert_eq!(raster.height(), 3);
        }
    }

    #[test]
    fn test_white_is_blank() {
        let raster = binarize(&flat(20, 4, 200), 170).unwrap();
        assert!(raster.data().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_black_sets_every_dot() {
        let raster = binarize(&flat(10, 2, 0), 128).unwrap();
        for y in 0..2 {
            for x in 0..10 {
                assert!(raster.is_ink(x, y));
            }
        }
        assert_eq!(raster.data()[0], 0xFF);
        assert_eq!(raster.data()[1] & 0xC0, 0xC0);
    }

    #[test]
    fn test_msb_is_leftmost() {
        let mut img = flat(16, 2, 255);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(9, 1, Luma([0]));

        let raster = binarize(&img, 128).unwrap();
        assert_eq!(raster.data(), &[0x80, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let raster = binarize(&flat(8, 1, 128), 128).unwrap();
        assert_eq!(raster.data(), &[0x00]);

        let raster = binarize(&flat(8, 1, 127), 128).unwrap();
        assert_eq!(raster.data(), &[0xFF]);
    }

    #[test]
    fn test_same_input_same_output() {
        let img = GrayImage::from_fn(33, 9, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let a = binarize(&img, 150).unwrap();
        let b = binarize(&img, 150).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_area_rejected() {
        assert!(matches!(
            binarize(&GrayImage::new(0, 10), 128),
            Err(PrintError::InvalidInput(_))
        ));
        assert!(MonochromeRaster::blank(10, 0).is_err());
    }

    #[test]
    fn test_out_of_range_is_never_ink() {
        let raster = binarize(&flat(3, 1, 0), 128).unwrap();
        assert!(!raster.is_ink(3, 0));
        assert!(!raster.is_ink(0, 1));
    }

    #[test]
    fn test_normalize_transparent_is_white() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let grey = normalize(&DynamicImage::ImageRgba8(img), &RasterSettings::default());
        assert!(grey.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_normalize_neutral_settings_keep_luma() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([90, 90, 90, 255]));
        let settings = RasterSettings {
            threshold: 128,
            contrast: 0.0,
            brightness: 0.0,
        };
        let grey = normalize(&DynamicImage::ImageRgba8(img), &settings);
        assert!(grey.pixels().all(|p| p[0] == 90));
    }

    #[test]
    fn test_normalize_weights_channels_rec709() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        img.put_pixel(2, 0, Rgba([0, 0, 255, 255]));
        let settings = RasterSettings {
            threshold: 128,
            contrast: 0.0,
            brightness: 0.0,
        };
        let grey = normalize(&DynamicImage::ImageRgba8(img), &settings);

        assert_eq!(grey.get_pixel(0, 0)[0], 54);
        assert_eq!(grey.get_pixel(1, 0)[0], 182);
        assert_eq!(grey.get_pixel(2, 0)[0], 18);

        // Pure green is light enough to stay paper at the default threshold
        let raster = binarize(&grey, 128).unwrap();
        assert!(!raster.is_ink(1, 0));
        assert!(raster.is_ink(0, 0));
    }

    #[test]
    fn test_normalize_contrast_darkens_darks() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        let settings = RasterSettings {
            threshold: 128,
            contrast: 0.4,
            brightness: 0.0,
        };
        let grey = normalize(&DynamicImage::ImageRgba8(img), &settings);
        assert!(grey.get_pixel(0, 0)[0] < 100);
    }
}
