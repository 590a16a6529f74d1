//! Render step
//!
//! Turning a job into pixels is someone else's job (a headless browser, a
//! render service). The worker only needs a decoded image back, or plain
//! text for text-mode printers.

use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine;
use image::{DynamicImage, ImageReader};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::error::RenderError;
use crate::job::{PrintJob, RenderSource};

/// What the renderer hands to the encoder
#[derive(Debug, Clone)]
pub enum RenderOutput {
    Image(DynamicImage),
    Text(String),
}

/// External render step
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &PrintJob) -> Result<RenderOutput, RenderError>;
}

/// HTML of a job, either the source itself or a `html` field of its data
fn html_of(job: &PrintJob) -> Result<&str, RenderError> {
    match &job.source {
        RenderSource::Html(html) => Ok(html),
        RenderSource::Data(data) => data
            .get("html")
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::Source("data has no html field".to_string())),
        RenderSource::Missing => Err(RenderError::Source("job has no html or data".to_string())),
    }
}

// ============================================================================
// Remote render service
// ============================================================================

#[derive(Debug, Deserialize)]
struct RenderedUrl {
    url: String,
}

/// HTML-to-image service: POST the HTML, get back a URL to the image
#[derive(Debug, Clone)]
pub struct RemoteRenderer {
    client: Client,
    endpoint: String,
    credentials: Option<(String, String)>,
    google_fonts: Option<String>,
}

impl RemoteRenderer {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            credentials: None,
            google_fonts: None,
        }
    }

    /// Basic auth for the render service
    pub fn with_credentials(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), key.into()));
        self
    }

    /// Font families the service loads before rendering, `|`-separated
    pub fn with_google_fonts(mut self, fonts: impl Into<String>) -> Self {
        self.google_fonts = Some(fonts.into());
        self
    }

    fn request_body(&self, html: &str) -> Value {
        let mut body = json!({ "html": html });
        if let Some(fonts) = &self.google_fonts {
            body["google_fonts"] = json!(fonts);
        }
        body
    }
}

#[async_trait]
impl Renderer for RemoteRenderer {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn render(&self, job: &PrintJob) -> Result<RenderOutput, RenderError> {
        let html = html_of(job)?;

        let mut request = self.client.post(&self.endpoint).json(&self.request_body(html));
        if let Some((user, key)) = &self.credentials {
            request = request.basic_auth(user, Some(key));
        }
        let rendered: RenderedUrl = request.send().await?.error_for_status()?.json().await?;
        debug!(url = %rendered.url, "Render service returned image url");

        let bytes = self
            .client
            .get(&rendered.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if bytes.is_empty() {
            return Err(RenderError::Empty);
        }

        let image = image::load_from_memory(&bytes)?;
        info!(width = image.width(), height = image.height(), "Rendered");
        Ok(RenderOutput::Image(image))
    }
}

// ============================================================================
// Pre-rendered images
// ============================================================================

/// Jobs that already carry their image as base64 (plain or `data:` URI)
///
/// Accepted places: the `data` string itself, an `image` field of the data,
/// or an HTML field holding a `data:image/...` URI.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedImageRenderer;

impl EmbeddedImageRenderer {
    fn encoded(job: &PrintJob) -> Result<&str, RenderError> {
        match &job.source {
            RenderSource::Data(Value::String(s)) => Ok(s),
            RenderSource::Data(data) => data
                .get("image")
                .and_then(Value::as_str)
                .ok_or_else(|| RenderError::Source("data has no image field".to_string())),
            RenderSource::Html(s) if s.trim_start().starts_with("data:image/") => Ok(s),
            _ => Err(RenderError::Source("job carries no embedded image".to_string())),
        }
    }
}

/// Decode a base64 image, with or without a `data:image/...;base64,` prefix
pub fn decode_image_string(encoded: &str) -> Result<DynamicImage, RenderError> {
    let encoded = encoded.trim();
    let payload = match encoded.find("base64,") {
        Some(start) if encoded.starts_with("data:") => &encoded[start + 7..],
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(RenderError::Empty);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| RenderError::Source(format!("invalid base64: {}", e)))?;

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RenderError::Source(format!("unreadable image: {}", e)))?
        .decode()?;
    Ok(image)
}

#[async_trait]
impl Renderer for EmbeddedImageRenderer {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn render(&self, job: &PrintJob) -> Result<RenderOutput, RenderError> {
        let image = decode_image_string(Self::encoded(job)?)?;
        Ok(RenderOutput::Image(image))
    }
}

// ============================================================================
// Text mode
// ============================================================================

/// HTML reduced to plain lines, for text-mode printers
#[derive(Debug, Clone, Default)]
pub struct TextRenderer;

#[async_trait]
impl Renderer for TextRenderer {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn render(&self, job: &PrintJob) -> Result<RenderOutput, RenderError> {
        let text = match &job.source {
            RenderSource::Data(data) => match data.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => html_to_text(html_of(job)?),
            },
            _ => html_to_text(html_of(job)?),
        };

        if text.trim().is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(RenderOutput::Text(text))
    }
}

/// Strip tags, breaking lines at block elements and table cells
///
/// Contents of `head`, `style` and `script` are dropped; consecutive breaks
/// collapse into one.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    let mut skip_until: Option<&'static str> = None;

    while let Some(start) = rest.find('<') {
        if skip_until.is_none() {
            push_text(&mut out, &rest[..start]);
        }

        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            rest = "";
            break;
        };
        let name = tag_name(&after[..end]);
        rest = &after[end + 1..];

        if let Some(closing) = skip_until {
            if name == closing {
                skip_until = None;
            }
            continue;
        }

        match name.as_str() {
            "head" => skip_until = Some("/head"),
            "style" => skip_until = Some("/style"),
            "script" => skip_until = Some("/script"),
            "br" | "hr" | "p" | "/p" | "div" | "/div" | "tr" | "/tr" | "li" | "/li" | "table"
            | "/table" | "/td" | "/th" | "h1" | "/h1" | "h2" | "/h2" | "h3" | "/h3" | "h4"
            | "/h4" | "h5" | "/h5" | "h6" | "/h6" => break_line(&mut out),
            _ => {}
        }
    }

    if skip_until.is_none() {
        push_text(&mut out, rest);
    }
    break_line(&mut out);
    out
}

fn tag_name(tag: &str) -> String {
    let tag = tag.trim_start();
    let (slash, body) = match tag.strip_prefix('/') {
        Some(body) => ("/", body.trim_start()),
        None => ("", tag),
    };
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{}{}", slash, name.to_ascii_lowercase())
}

fn push_text(out: &mut String, text: &str) {
    let decoded = text
        .replace(['\r', '\n', '\t'], " ")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    out.push_str(&decoded);
}

fn break_line(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
