//! ESC/POS command builder and framers
//!
//! Provides a fluent API for building ESC/POS print data, plus the two
//! ESC/POS framers: raster (`GS v 0`) and styled text.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{PrintError, PrintResult};
use crate::raster::MonochromeRaster;
use crate::text::{Align, TextCodec, TextLine, TextSize};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// `ESC @` - initialize printer
pub const INIT: [u8; 2] = [ESC, 0x40];
/// `ESC a 0`
pub const ALIGN_LEFT: [u8; 3] = [ESC, 0x61, 0x00];
/// `ESC a 1`
pub const ALIGN_CENTER: [u8; 3] = [ESC, 0x61, 0x01];
/// `ESC a 2`
pub const ALIGN_RIGHT: [u8; 3] = [ESC, 0x61, 0x02];
/// `ESC E 1`
pub const BOLD_ON: [u8; 3] = [ESC, 0x45, 0x01];
/// `ESC E 0`
pub const BOLD_OFF: [u8; 3] = [ESC, 0x45, 0x00];
/// `GS ! 0x00`
pub const SIZE_NORMAL: [u8; 3] = [GS, 0x21, 0x00];
/// `GS ! 0x11` - 2x width and height
pub const SIZE_DOUBLE: [u8; 3] = [GS, 0x21, 0x11];
/// `GS ! 0x22` - 3x width and height
pub const SIZE_LARGE: [u8; 3] = [GS, 0x21, 0x22];
/// `GS V 0` - full cut
pub const CUT: [u8; 3] = [GS, 0x56, 0x00];

/// `GS v 0` header for a raster image, mode 0 (normal density)
///
/// Width is in bytes, height in dots, both little-endian u16.
pub fn raster_header(bytes_per_row: usize, height: u32) -> PrintResult<[u8; 8]> {
    let x = u16::try_from(bytes_per_row).map_err(|_| {
        PrintError::InvalidInput(format!("raster too wide for GS v 0: {} bytes", bytes_per_row))
    })?;
    let y = u16::try_from(height)
        .map_err(|_| PrintError::InvalidInput(format!("raster too tall for GS v 0: {} dots", height)))?;
    let [xl, xh] = x.to_le_bytes();
    let [yl, yh] = y.to_le_bytes();
    Ok([GS, 0x76, 0x30, 0x00, xl, xh, yl, yh])
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers. Text goes through the
/// builder's [`TextCodec`].
pub struct EscPosBuilder {
    buf: Vec<u8>,
    codec: TextCodec,
}

impl EscPosBuilder {
    /// Create an empty builder (no `ESC @` emitted)
    pub fn new(codec: TextCodec) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            codec,
        }
    }

    /// Reset printer to default state
    pub fn init(&mut self) -> &mut Self {
        self.raw(&INIT)
    }

    /// Select a character code table (`ESC t n`)
    pub fn code_table(&mut self, n: u8) -> &mut Self {
        self.raw(&[ESC, 0x74, n])
    }

    // === Text Output ===

    /// Write text through the codec
    pub fn text(&mut self, s: &str) -> &mut Self {
        let bytes = self.codec.encode(s);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Write text followed by newline. Carriage returns are dropped.
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(&s.replace('\r', ""));
        self.newline()
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Write `n` bare line feeds
    pub fn line_feeds(&mut self, n: u8) -> &mut Self {
        for _ in 0..n {
            self.buf.push(b'\n');
        }
        self
    }

    // === Alignment ===

    pub fn align(&mut self, align: Align) -> &mut Self {
        match align {
            Align::Left => self.raw(&ALIGN_LEFT),
            Align::Center => self.raw(&ALIGN_CENTER),
            Align::Right => self.raw(&ALIGN_RIGHT),
        }
    }

    /// Align to center
    pub fn center(&mut self) -> &mut Self {
        self.align(Align::Center)
    }

    /// Align to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.align(Align::Left)
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.raw(&BOLD_ON)
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.raw(&BOLD_OFF)
    }

    pub fn size(&mut self, size: TextSize) -> &mut Self {
        match size {
            TextSize::Normal => self.raw(&SIZE_NORMAL),
            TextSize::Double => self.raw(&SIZE_DOUBLE),
            TextSize::Large => self.raw(&SIZE_LARGE),
        }
    }

    /// Print one styled line and restore defaults afterwards
    pub fn styled_line(&mut self, line: &TextLine) -> &mut Self {
        if line.align != Align::Left {
            self.align(line.align);
        }
        if line.size != TextSize::Normal {
            self.size(line.size);
        }
        if line.bold {
            self.bold();
        }

        self.line(&line.text);

        if line.bold {
            self.bold_off();
        }
        if line.size != TextSize::Normal {
            self.size(TextSize::Normal);
        }
        if line.align != Align::Left {
            self.left();
        }
        self
    }

    // === Images ===

    /// Raster bit image (`GS v 0`) followed by the packed rows
    pub fn raster(&mut self, raster: &MonochromeRaster) -> PrintResult<&mut Self> {
        let header = raster_header(raster.bytes_per_row(), raster.height())?;
        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(raster.data());
        Ok(self)
    }

    // === Paper Control ===

    /// Cut paper (full cut)
    pub fn cut(&mut self) -> &mut Self {
        self.raw(&CUT)
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Finish and return the byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(TextCodec::Ascii)
    }
}

// ============================================================================
// Raster framing
// ============================================================================

/// Trailer settings for ESC/POS raster jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscposRasterSettings {
    /// Line feeds between the image and the cut
    pub feed_lines: u8,
}

impl Default for EscposRasterSettings {
    fn default() -> Self {
        Self { feed_lines: 4 }
    }
}

/// `GS v 0` raster framer
#[derive(Debug, Clone, Default)]
pub struct EscposRasterFramer {
    settings: EscposRasterSettings,
}

impl EscposRasterFramer {
    pub fn new(settings: EscposRasterSettings) -> Self {
        Self { settings }
    }

    /// Header, packed rows, centered alignment, feeds, full cut
    #[instrument(skip(self, raster), fields(bytes_per_row = raster.bytes_per_row(), height = raster.height()))]
    pub fn frame(&self, raster: &MonochromeRaster) -> PrintResult<Vec<u8>> {
        let mut b = EscPosBuilder::default();
        b.raster(raster)?
            .center()
            .line_feeds(self.settings.feed_lines)
            .cut();
        Ok(b.build())
    }
}

// ============================================================================
// Text framing
// ============================================================================

/// Code page selection for text receipts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePage {
    /// WHATWG encoding label, e.g. `windows-1258`
    pub label: String,
    /// `n` for `ESC t n` on the target printer
    pub table: u8,
}

/// Layout settings for text receipts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscposTextSettings {
    /// Paper width in characters (48 for 80mm, 32 for 58mm)
    pub width: usize,
    /// Line feeds before the cut
    pub feed_lines: u8,
    /// ASCII with diacritics stripped when unset
    pub code_page: Option<CodePage>,
}

impl Default for EscposTextSettings {
    fn default() -> Self {
        Self {
            width: 48,
            feed_lines: 5,
            code_page: None,
        }
    }
}

/// Styled-text framer, no image stage
#[derive(Debug, Clone)]
pub struct EscposTextFramer {
    settings: EscposTextSettings,
    codec: TextCodec,
}

impl EscposTextFramer {
    /// Fails with `InvalidConfig` for an unknown code page label
    pub fn new(settings: EscposTextSettings) -> PrintResult<Self> {
        let codec = match &settings.code_page {
            Some(page) => TextCodec::for_label(&page.label)?,
            None => TextCodec::Ascii,
        };
        Ok(Self { settings, codec })
    }

    /// Paper width in characters
    pub fn width(&self) -> usize {
        self.settings.width
    }

    /// `INIT`, styled lines, feeds, full cut
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub fn frame(&self, lines: &[TextLine]) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.codec);
        b.init();
        if let Some(page) = &self.settings.code_page {
            b.code_table(page.table);
        }

        for line in lines.iter().filter(|l| !l.text.trim().is_empty()) {
            b.styled_line(line);
        }

        b.line_feeds(self.settings.feed_lines).cut();
        b.build()
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
    fn test_raster_header_bytes() {
        let header = raster_header(72, 300).unwrap();
        assert_eq!(header, [0x1D, 0x76, 0x30, 0x00, 0x48, 0x00, 0x2C, 0x01]);
    }

    #[test]
    fn test_raster_header_rejects_tall_images() {
        assert!(matches!(
            raster_header(72, 70_000),
            Err(PrintError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_raster_frame_layout() {
        let r = raster(576, 300);
        let data = EscposRasterFramer::default().frame(&r).unwrap();

        assert_eq!(&data[..8], &[0x1D, 0x76, 0x30, 0x00, 0x48, 0x00, 0x2C, 0x01]);
        assert_eq!(&data[8..8 + r.data().len()], r.data());

        let tail = &data[8 + r.data().len()..];
        assert_eq!(&tail[..3], &ALIGN_CENTER);
        assert_eq!(&tail[3..7], b"\n\n\n\n");
        assert_eq!(&tail[7..], &CUT);
    }

    #[test]
    fn test_text_frame_sequence() {
        let framer = EscposTextFramer::new(EscposTextSettings::default()).unwrap();
        let data = framer.frame(&[TextLine::title("HOA DON"), TextLine::plain("Tra da")]);

        let mut expected = Vec::new();
        expected.extend_from_slice(&INIT);
        expected.extend_from_slice(&ALIGN_CENTER);
        expected.extend_from_slice(&SIZE_DOUBLE);
        expected.extend_from_slice(&BOLD_ON);
        expected.extend_from_slice(b"HOA DON\n");
        expected.extend_from_slice(&BOLD_OFF);
        expected.extend_from_slice(&SIZE_NORMAL);
        expected.extend_from_slice(&ALIGN_LEFT);
        expected.extend_from_slice(b"Tra da\n");
        expected.extend_from_slice(b"\n\n\n\n\n");
        expected.extend_from_slice(&CUT);

        assert_eq!(data, expected);
    }

    #[test]
    fn test_text_frame_skips_blank_and_strips_cr() {
        let framer = EscposTextFramer::new(EscposTextSettings::default()).unwrap();
        let data = framer.frame(&[TextLine::plain("  "), TextLine::plain("a\r")]);
        assert_eq!(&data[2..4], b"a\n");
    }

    #[test]
    fn test_text_frame_code_page() {
        let settings = EscposTextSettings {
            code_page: Some(CodePage {
                label: "windows-1258".to_string(),
                table: 52,
            }),
            ..Default::default()
        };
        let data = EscposTextFramer::new(settings).unwrap().frame(&[]);
        assert_eq!(&data[..5], &[0x1B, 0x40, 0x1B, 0x74, 52]);
    }

    #[test]
    fn test_text_framer_rejects_unknown_code_page() {
        let settings = EscposTextSettings {
            code_page: Some(CodePage {
                label: "klingon".to_string(),
                table: 0,
            }),
            ..Default::default()
        };
        assert!(matches!(
            EscposTextFramer::new(settings),
            Err(PrintError::InvalidConfig(_))
        ));
    }
}
