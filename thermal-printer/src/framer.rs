//! Protocol selection
//!
//! One [`Framer`] per printer, picked from configuration. Raster framers
//! take a [`MonochromeRaster`], the text framer takes styled lines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, PrintResult};
use crate::escpos::{EscposRasterFramer, EscposTextFramer};
use crate::raster::MonochromeRaster;
use crate::text::TextLine;
use crate::tspl::TsplRasterFramer;

/// Wire protocol spoken by the target printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrintMode {
    /// TSPL label printer, image job
    Tspl,
    /// ESC/POS receipt printer, image job
    EscposRaster,
    /// ESC/POS receipt printer, text job
    EscposText,
}

impl fmt::Display for PrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintMode::Tspl => write!(f, "tspl"),
            PrintMode::EscposRaster => write!(f, "escpos-raster"),
            PrintMode::EscposText => write!(f, "escpos-text"),
        }
    }
}

impl FromStr for PrintMode {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tspl" => Ok(PrintMode::Tspl),
            "escpos-raster" | "escpos" => Ok(PrintMode::EscposRaster),
            "escpos-text" | "text" => Ok(PrintMode::EscposText),
            other => Err(PrintError::InvalidConfig(format!("Unknown print mode: {}", other))),
        }
    }
}

/// What a framer consumes
#[derive(Debug, Clone)]
pub enum Content {
    Raster(MonochromeRaster),
    Text(Vec<TextLine>),
}

/// Protocol encoder
#[derive(Debug, Clone)]
pub enum Framer {
    TsplRaster(TsplRasterFramer),
    EscposRaster(EscposRasterFramer),
    EscposText(EscposTextFramer),
}

impl Framer {
    pub fn mode(&self) -> PrintMode {
        match self {
            Framer::TsplRaster(_) => PrintMode::Tspl,
            Framer::EscposRaster(_) => PrintMode::EscposRaster,
            Framer::EscposText(_) => PrintMode::EscposText,
        }
    }

    /// Whether jobs go through the image stages first
    pub fn wants_raster(&self) -> bool {
        !matches!(self, Framer::EscposText(_))
    }

    /// Encode content into a complete payload
    pub fn frame(&self, content: &Content) -> PrintResult<Vec<u8>> {
        match (self, content) {
            (Framer::TsplRaster(f), Content::Raster(r)) => Ok(f.frame(r)),
            (Framer::EscposRaster(f), Content::Raster(r)) => f.frame(r),
            (Framer::EscposText(f), Content::Text(lines)) => Ok(f.frame(lines)),
            (framer, _) => Err(PrintError::InvalidInput(format!(
                "{} framer cannot encode this content",
                framer.mode()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escpos::EscposTextSettings;
    use image::{GrayImage, Luma};

    #[test]
    fn test_mode_parsing() {
        assert_eq!("tspl".parse::<PrintMode>().unwrap(), PrintMode::Tspl);
        assert_eq!("ESCPOS-RASTER".parse::<PrintMode>().unwrap(), PrintMode::EscposRaster);
        assert_eq!("escpos-text".parse::<PrintMode>().unwrap(), PrintMode::EscposText);
        assert!("zpl".parse::<PrintMode>().is_err());
    }

    #[test]
    fn test_mismatched_content_rejected() {
        let framer = Framer::EscposText(EscposTextFramer::new(EscposTextSettings::default()).unwrap());
        let raster = crate::raster::binarize(&GrayImage::from_pixel(8, 8, Luma([0])), 128).unwrap();

        assert!(!framer.wants_raster());
        assert!(framer.frame(&Content::Raster(raster)).is_err());
    }

    #[test]
    fn test_raster_dispatch() {
        let framer = Framer::TsplRaster(TsplRasterFramer::default());
        let raster = crate::raster::binarize(&GrayImage::from_pixel(8, 8, Luma([0])), 128).unwrap();

        let data = framer.frame(&Content::Raster(raster)).unwrap();
        assert!(data.starts_with(b"SIZE "));
    }
}
