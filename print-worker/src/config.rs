//! Worker configuration
//!
//! Everything the worker needs is read once into [`Config`] and handed to
//! each component when it is built. Unset values take their defaults;
//! malformed values also take their defaults and leave a warning in
//! [`Config::warnings`] (logged once the logger is up).
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PRINT_MODE | tspl | `tspl`, `escpos-raster` or `escpos-text` |
//! | PRINTER_ADDR | 192.168.1.110:9100 | Printer used when no lookup answers |
//! | QUEUE_API_URL | http://localhost/api/in/in.php | Queue endpoint |
//! | PRINTER_SETTINGS_URL | - | `get_printer` endpoint, static printer if unset |
//! | POLL_INTERVAL_MS | 2000 | Poll period |
//! | RENDER_TIMEOUT_MS | 15000 | Render step deadline |
//! | JOB_GAP_MS | 200 | Pause after each job, 0 disables it |
//! | TRANSPORT_TIMEOUT_MS | 10000 | Connect + write deadline |
//! | API_TIMEOUT_MS | 10000 | Queue/settings request deadline |
//! | RENDERER | remote (text in text mode) | `remote`, `embedded` or `text` |
//! | RENDER_API_URL | https://hcti.io/v1/image | Render service |
//! | RENDER_API_USER / RENDER_API_KEY | - | Render service basic auth |
//! | RENDER_GOOGLE_FONTS | - | Font families the render service loads |
//! | RASTER_THRESHOLD | 128 | Ink below this luminance |
//! | RASTER_CONTRAST / RASTER_BRIGHTNESS | 0.4 / 0.1 | Normalization |
//! | CANVAS_WIDTH / CONTENT_WIDTH | 576 / 560 | Dots |
//! | MACHINE_OFFSET | 12 | Head calibration, dots |
//! | CANVAS_BACKGROUND | white | `white`, `black` or 0-255 |
//! | TSPL_LABEL_WIDTH_MM / TSPL_GAP_MM / TSPL_GAP_OFFSET_MM | 80 / 2 / 0 | Label stock |
//! | TSPL_VERTICAL_BUFFER_MM / TSPL_Y_OFFSET | 10 / 10 | Label length padding, bitmap y |
//! | TSPL_FIXED_HEIGHT_MM | - | Fixed label length |
//! | TSPL_COPIES | 1 | `PRINT` copies |
//! | ESCPOS_FEED_LINES | 4 | Feeds before cut (raster) |
//! | TEXT_WIDTH / TEXT_FEED_LINES | 48 / 5 | Text receipts |
//! | TEXT_CODE_PAGE / TEXT_CODE_TABLE | - | e.g. `windows-1258` / `30` |
//! | RENDER_FAILURE_STATUS | pending | Status after a render failure |
//! | MAX_ATTEMPTS | - | Failures before a job becomes `error` |
//! | SUCCESS_ACTION | delete | `delete` or `mark-done` |
//! | DEBUG_DUMP_DIR | - | Write composed canvases here |
//! | LOG_LEVEL / LOG_DIR | info / - | Logging |

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thermal_printer::{
    CanvasLayout, CodePage, EscposRasterFramer, EscposRasterSettings, EscposTextFramer,
    EscposTextSettings, Framer, PrintMode, PrintResult, PrinterTarget, RasterSettings,
    TsplRasterFramer, TsplSettings,
};

use crate::error::ConfigError;
use crate::job::{JobStatus, StatusPolicy, SuccessAction};
use crate::pipeline::Pipeline;
use crate::queue::{HttpPrinterDirectory, HttpQueue, PrinterDirectory, StaticPrinter};
use crate::render::{EmbeddedImageRenderer, RemoteRenderer, Renderer, TextRenderer};
use crate::transport::TcpTransport;
use crate::worker::{PrintWorker, WorkerSettings};

/// Which render step the worker uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Remote,
    Embedded,
    Text,
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(RendererKind::Remote),
            "embedded" | "base64" => Ok(RendererKind::Embedded),
            "text" => Ok(RendererKind::Text),
            other => Err(format!("unknown renderer: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub kind: RendererKind,
    pub endpoint: String,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub google_fonts: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: PrintMode,
    pub raster: RasterSettings,
    pub layout: CanvasLayout,
    pub background: u8,
    pub tspl: TsplSettings,
    pub escpos_raster: EscposRasterSettings,
    pub text: EscposTextSettings,

    pub poll_interval: Duration,
    pub render_timeout: Duration,
    pub job_gap: Duration,
    pub transport_timeout: Duration,
    pub api_timeout: Duration,

    /// Fallback printer
    pub printer: PrinterTarget,
    pub queue_url: String,
    pub printer_settings_url: Option<String>,
    pub renderer: RendererConfig,

    pub policy: StatusPolicy,
    pub success_action: SuccessAction,
    pub debug_dir: Option<PathBuf>,

    pub log_level: String,
    pub log_dir: Option<String>,

    /// Values that were present but unusable
    pub warnings: Vec<String>,
}

/// Typed reads over a key lookup, recording unusable values
struct Settings<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    warnings: Vec<String>,
}

impl Settings<'_> {
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn optional<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.text(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                self.warnings.push(format!("{}={:?} ignored: {}", key, raw, e));
                None
            }
        }
    }

    fn get<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key).unwrap_or(default)
    }

    fn millis(&mut self, key: &str, default: u64) -> Duration {
        match self.get(key, default) {
            0 => {
                self.warnings.push(format!("{}=0 ignored", key));
                Duration::from_millis(default)
            }
            ms => Duration::from_millis(ms),
        }
    }

    fn background(&mut self) -> u8 {
        match self.text("CANVAS_BACKGROUND").map(|v| v.to_ascii_lowercase()) {
            None => 255,
            Some(v) if v == "white" => 255,
            Some(v) if v == "black" => 0,
            Some(_) => self.get("CANVAS_BACKGROUND", 255),
        }
    }

    fn printer(&mut self) -> PrinterTarget {
        let fallback = PrinterTarget::new("192.168.1.110", 9100);
        let Some(raw) = self.text("PRINTER_ADDR") else {
            return fallback;
        };
        match PrinterTarget::parse(&raw) {
            Ok(target) => target,
            Err(e) => {
                self.warnings.push(format!("PRINTER_ADDR={:?} ignored: {}", raw, e));
                fallback
            }
        }
    }

    fn failure_status(&mut self, key: &str) -> JobStatus {
        match self.get(key, JobStatus::Pending) {
            status @ (JobStatus::Pending | JobStatus::Error) => status,
            other => {
                self.warnings
                    .push(format!("{}={} ignored: only pending or error", key, other));
                JobStatus::Pending
            }
        }
    }

    fn code_page(&mut self) -> Option<CodePage> {
        let label = self.text("TEXT_CODE_PAGE")?;
        match self.optional::<u8>("TEXT_CODE_TABLE") {
            Some(table) => Some(CodePage { label, table }),
            None => {
                self.warnings
                    .push("TEXT_CODE_PAGE ignored: TEXT_CODE_TABLE missing or invalid".to_string());
                None
            }
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Settings {
            lookup: &lookup,
            warnings: Vec::new(),
        };

        let mode = s.get("PRINT_MODE", PrintMode::Tspl);

        let raster_defaults = RasterSettings::default();
        let raster = RasterSettings {
            threshold: s.get("RASTER_THRESHOLD", raster_defaults.threshold),
            contrast: s.get("RASTER_CONTRAST", raster_defaults.contrast),
            brightness: s.get("RASTER_BRIGHTNESS", raster_defaults.brightness),
        };

        let layout_defaults = CanvasLayout::default();
        let layout = CanvasLayout {
            canvas_width: s.get("CANVAS_WIDTH", layout_defaults.canvas_width),
            content_width: s.get("CONTENT_WIDTH", layout_defaults.content_width),
            machine_offset: s.get("MACHINE_OFFSET", layout_defaults.machine_offset),
        };

        let tspl_defaults = TsplSettings::default();
        let tspl = TsplSettings {
            label_width_mm: s.get("TSPL_LABEL_WIDTH_MM", tspl_defaults.label_width_mm),
            gap_mm: s.get("TSPL_GAP_MM", tspl_defaults.gap_mm),
            gap_offset_mm: s.get("TSPL_GAP_OFFSET_MM", tspl_defaults.gap_offset_mm),
            vertical_buffer_mm: s.get("TSPL_VERTICAL_BUFFER_MM", tspl_defaults.vertical_buffer_mm),
            y_offset: s.get("TSPL_Y_OFFSET", tspl_defaults.y_offset),
            fixed_height_mm: s.optional("TSPL_FIXED_HEIGHT_MM"),
            copies: s.get("TSPL_COPIES", tspl_defaults.copies),
        };

        let escpos_raster = EscposRasterSettings {
            feed_lines: s.get("ESCPOS_FEED_LINES", EscposRasterSettings::default().feed_lines),
        };

        let text_defaults = EscposTextSettings::default();
        let text = EscposTextSettings {
            width: s.get("TEXT_WIDTH", text_defaults.width),
            feed_lines: s.get("TEXT_FEED_LINES", text_defaults.feed_lines),
            code_page: s.code_page(),
        };

        let default_renderer = match mode {
            PrintMode::EscposText => RendererKind::Text,
            _ => RendererKind::Remote,
        };
        let renderer = RendererConfig {
            kind: s.get("RENDERER", default_renderer),
            endpoint: s
                .text("RENDER_API_URL")
                .unwrap_or_else(|| "https://hcti.io/v1/image".to_string()),
            user: s.text("RENDER_API_USER"),
            api_key: s.text("RENDER_API_KEY"),
            google_fonts: s.text("RENDER_GOOGLE_FONTS"),
        };

        let policy = StatusPolicy {
            on_render_failure: s.failure_status("RENDER_FAILURE_STATUS"),
            max_attempts: s.optional::<u32>("MAX_ATTEMPTS").filter(|n| *n > 0),
            ..Default::default()
        };

        Self {
            mode,
            raster,
            layout,
            background: s.background(),
            tspl,
            escpos_raster,
            text,
            poll_interval: s.millis("POLL_INTERVAL_MS", 2000),
            render_timeout: s.millis("RENDER_TIMEOUT_MS", 15000),
            job_gap: Duration::from_millis(s.get("JOB_GAP_MS", 200)),
            transport_timeout: s.millis("TRANSPORT_TIMEOUT_MS", 10000),
            api_timeout: s.millis("API_TIMEOUT_MS", 10000),
            printer: s.printer(),
            queue_url: s
                .text("QUEUE_API_URL")
                .unwrap_or_else(|| "http://localhost/api/in/in.php".to_string()),
            printer_settings_url: s.text("PRINTER_SETTINGS_URL"),
            renderer,
            policy,
            success_action: s.get("SUCCESS_ACTION", SuccessAction::Delete),
            debug_dir: s.text("DEBUG_DUMP_DIR").map(PathBuf::from),
            log_level: s.text("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_dir: s.text("LOG_DIR"),
            warnings: s.warnings,
        }
    }

    /// Framer for the configured print mode
    pub fn framer(&self) -> PrintResult<Framer> {
        Ok(match self.mode {
            PrintMode::Tspl => Framer::TsplRaster(TsplRasterFramer::new(self.tspl)),
            PrintMode::EscposRaster => {
                Framer::EscposRaster(EscposRasterFramer::new(self.escpos_raster))
            }
            PrintMode::EscposText => Framer::EscposText(EscposTextFramer::new(self.text.clone())?),
        })
    }

    pub fn pipeline(&self) -> PrintResult<Pipeline> {
        Ok(Pipeline {
            raster: self.raster,
            layout: self.layout,
            background: self.background,
            framer: self.framer()?,
            debug_dir: self.debug_dir.clone(),
        })
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: self.poll_interval,
            render_timeout: self.render_timeout,
            job_gap: self.job_gap,
            policy: self.policy,
            success_action: self.success_action,
        }
    }

    pub fn build_renderer(&self) -> Result<Arc<dyn Renderer>, ConfigError> {
        let renderer: Arc<dyn Renderer> = match self.renderer.kind {
            RendererKind::Remote => {
                let client = Client::builder().timeout(self.render_timeout).build()?;
                let mut remote = RemoteRenderer::new(client, &self.renderer.endpoint);
                if let Some(user) = &self.renderer.user {
                    remote = remote
                        .with_credentials(user, self.renderer.api_key.clone().unwrap_or_default());
                }
                if let Some(fonts) = &self.renderer.google_fonts {
                    remote = remote.with_google_fonts(fonts);
                }
                Arc::new(remote)
            }
            RendererKind::Embedded => Arc::new(EmbeddedImageRenderer),
            RendererKind::Text => Arc::new(TextRenderer),
        };
        Ok(renderer)
    }

    pub fn build_directory(&self) -> Result<Arc<dyn PrinterDirectory>, ConfigError> {
        let directory: Arc<dyn PrinterDirectory> = match &self.printer_settings_url {
            Some(url) => Arc::new(HttpPrinterDirectory::new(
                url,
                self.printer.clone(),
                self.api_timeout,
            )?),
            None => Arc::new(StaticPrinter(self.printer.clone())),
        };
        Ok(directory)
    }

    /// Wire up the HTTP queue, printer lookup, renderer and TCP transport
    pub fn build_worker(&self) -> Result<PrintWorker, ConfigError> {
        let queue = HttpQueue::new(&self.queue_url, self.api_timeout)?;

        Ok(PrintWorker::new(
            Arc::new(queue),
            self.build_directory()?,
            self.build_renderer()?,
            Arc::new(TcpTransport::new(self.transport_timeout)),
            self.pipeline()?,
            self.worker_settings(),
        ))
    }
}
