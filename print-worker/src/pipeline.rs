//! Render output -> printer payload
//!
//! Image path: normalize, compose onto the printer canvas, binarize, frame.
//! Text path: receipt layout, frame. Everything here is synchronous and
//! deterministic for a given configuration.

use std::path::PathBuf;

use image::GrayImage;
use thermal_printer::{
    CanvasLayout, Content, Framer, PrintError, RasterSettings, binarize, compose, format_receipt,
    normalize,
};
use tracing::{debug, warn};

use crate::error::{JobError, JobResult};
use crate::render::RenderOutput;

/// Deterministic encoding stages for one configuration
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub raster: RasterSettings,
    pub layout: CanvasLayout,
    /// Canvas fill, 255 is paper white
    pub background: u8,
    pub framer: Framer,
    /// Composed canvases are written here as `job_<id>.png` when set
    pub debug_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(framer: Framer) -> Self {
        Self {
            raster: RasterSettings::default(),
            layout: CanvasLayout::default(),
            background: 255,
            framer,
            debug_dir: None,
        }
    }

    /// Turn a render result into bytes for the printer
    pub fn encode(&self, job_id: &str, output: RenderOutput) -> JobResult<Vec<u8>> {
        let content = match output {
            RenderOutput::Image(image) => {
                if !self.framer.wants_raster() {
                    return Err(JobError::Encoding(PrintError::InvalidInput(
                        "text printer got an image".to_string(),
                    )));
                }

                let grey = normalize(&image, &self.raster);
                let canvas =
                    compose(&grey, &self.layout, self.background).map_err(JobError::Encoding)?;
                self.dump(job_id, &canvas);
                let raster =
                    binarize(&canvas, self.raster.threshold).map_err(JobError::Encoding)?;
                Content::Raster(raster)
            }
            RenderOutput::Text(text) => {
                let width = match &self.framer {
                    Framer::EscposText(framer) => framer.width(),
                    other => {
                        return Err(JobError::Encoding(PrintError::InvalidInput(format!(
                            "{} printer got text",
                            other.mode()
                        ))));
                    }
                };
                Content::Text(format_receipt(&text, width))
            }
        };

        let payload = self.framer.frame(&content).map_err(JobError::Encoding)?;
        debug!(job_id, bytes = payload.len(), mode = %self.framer.mode(), "Encoded job");
        Ok(payload)
    }

    fn dump(&self, job_id: &str, canvas: &GrayImage) {
        let Some(dir) = &self.debug_dir else {
            return;
        };

        let safe_id: String = job_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = dir.join(format!("job_{}.png", safe_id));

        let written = std::fs::create_dir_all(dir)
            .map_err(image::ImageError::IoError)
            .and_then(|_| canvas.save(&path));
        if let Err(e) = written {
            warn!(job_id, path = %path.display(), error = %e, "Failed to write debug canvas");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma};
    use thermal_printer::{
        EscposRasterFramer, EscposRasterSettings, EscposTextFramer, EscposTextSettings,
        TsplRasterFramer, TsplSettings,
    };

    fn black(width: u32, height: u32) -> RenderOutput {
        let image = GrayImage::from_pixel(width, height, Luma([0]));
        RenderOutput::Image(DynamicImage::ImageLuma8(image))
    }

    fn tspl() -> Pipeline {
        Pipeline::new(Framer::TsplRaster(TsplRasterFramer::new(TsplSettings::default())))
    }

    #[test]
    fn test_tspl_payload_shape() {
        let payload = tspl().encode("1", black(280, 100)).unwrap();

        // 560x200 after scaling, 72 bytes per row on a 576 canvas
        let head = String::from_utf8_lossy(&payload[..80]);
        assert!(head.starts_with("SIZE 80 mm,35 mm\r\nGAP 2 mm,0 mm\r\nCLS\r\nBITMAP 0,10,72,200,0,"));
        assert!(payload.ends_with(b"\r\nPRINT 1\r\n"));
    }

    #[test]
    fn test_content_lands_at_offset() {
        let pipeline = Pipeline::new(Framer::EscposRaster(EscposRasterFramer::new(
            EscposRasterSettings::default(),
        )));
        let payload = pipeline.encode("1", black(560, 1)).unwrap();

        // GS v 0 header, then one row: 20 white columns, ink clipped at 576
        assert_eq!(&payload[..8], &[0x1D, 0x76, 0x30, 0x00, 72, 0x00, 1, 0x00]);
        let row = &payload[8..80];
        assert_eq!(row[0], 0x00);
        assert_eq!(row[1], 0x00);
        assert_eq!(row[2], 0x0F);
        assert_eq!(row[3], 0xFF);
        assert_eq!(row[71], 0xFF);
    }

    #[test]
    fn test_deterministic() {
        let a = tspl().encode("1", black(300, 40)).unwrap();
        let b = tspl().encode("1", black(300, 40)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_text_path() {
        let framer = EscposTextFramer::new(EscposTextSettings::default()).unwrap();
        let pipeline = Pipeline::new(Framer::EscposText(framer));

        let payload = pipeline
            .encode("1", RenderOutput::Text("Xin chào\n".to_string()))
            .unwrap();
        assert_eq!(&payload[..2], &[0x1B, 0x40]);
        assert!(payload.windows(8).any(|w| w == b"Xin chao"));
        assert!(payload.ends_with(&[0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_mismatch_is_encoding_error() {
        let err = tspl()
            .encode("1", RenderOutput::Text("hello".to_string()))
            .unwrap_err();
        assert!(matches!(err, JobError::Encoding(_)));

        let framer = EscposTextFramer::new(EscposTextSettings::default()).unwrap();
        let err = Pipeline::new(Framer::EscposText(framer))
            .encode("1", black(10, 10))
            .unwrap_err();
        assert!(matches!(err, JobError::Encoding(_)));
    }

    #[test]
    fn test_debug_dump() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = tspl();
        pipeline.debug_dir = Some(dir.path().join("canvas"));

        pipeline.encode("a/7", black(10, 10)).unwrap();
        assert!(dir.path().join("canvas").join("job_a_7.png").exists());
    }
}
