//! # thermal-printer
//!
//! Image-to-thermal-printer pipeline - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Greyscale normalization and 1-bit raster packing
//! - Canvas placement with per-device machine offset
//! - TSPL label framing and ESC/POS raster/text framing
//! - Network printing (raw TCP, port 9100)
//!
//! Where jobs come from and how they are rendered belongs to the worker.
//!
//! ## Example
//!
//! ```ignore
//! use thermal_printer::{
//!     CanvasLayout, NetworkPrinter, Printer, PrinterTarget, RasterSettings, TsplRasterFramer,
//!     binarize, compose, normalize,
//! };
//!
//! let settings = RasterSettings::default();
//! let grey = normalize(&decoded, &settings);
//! let canvas = compose(&grey, &CanvasLayout::default(), 255)?;
//! let raster = binarize(&canvas, settings.threshold)?;
//! let payload = TsplRasterFramer::default().frame(&raster);
//!
//! let printer = NetworkPrinter::new(PrinterTarget::new("192.168.1.110", 9100));
//! printer.print(&payload).await?;
//! ```

mod canvas;
mod error;
mod escpos;
mod framer;
mod printer;
mod raster;
mod text;
mod tspl;

// Re-exports
pub use canvas::{CanvasLayout, compose};
pub use error::{PrintError, PrintResult};
pub use escpos::{
    CodePage, EscPosBuilder, EscposRasterFramer, EscposRasterSettings, EscposTextFramer,
    EscposTextSettings, raster_header,
};
pub use framer::{Content, Framer, PrintMode};
pub use printer::{NetworkPrinter, Printer, PrinterTarget, RAW_PORT, TransportState};
pub use raster::{MonochromeRaster, RasterSettings, binarize, normalize};
pub use text::{
    Align, TextCodec, TextLine, TextSize, collapse_whitespace, format_receipt, left_right,
    pad_columns, strip_diacritics, truncate_columns,
};
pub use tspl::{TsplRasterFramer, TsplSettings};

/// Escape sequences, for callers assembling their own byte streams
pub mod commands {
    pub use crate::escpos::{
        ALIGN_CENTER, ALIGN_LEFT, ALIGN_RIGHT, BOLD_OFF, BOLD_ON, CUT, INIT, SIZE_DOUBLE,
        SIZE_LARGE, SIZE_NORMAL,
    };
}
