//! Itinerary → PDF through an external `wkhtmltopdf` process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use minijinja::context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::RendererConfig;
use crate::templates::{ITINERARY_PDF, Templates};

const CONVERTER_BINARY: &str = "wkhtmltopdf";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no itinerary provided")]
    MissingItinerary,
    #[error("wkhtmltopdf not found: {0}")]
    ConverterNotFound(String),
    #[error("failed to render itinerary HTML: {0}")]
    Template(#[from] minijinja::Error),
    #[error("failed to start wkhtmltopdf: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("wkhtmltopdf timed out after {0}s")]
    Timeout(u64),
    #[error("wkhtmltopdf failed (status: {code}): {stderr}")]
    Failed { code: String, stderr: String },
    #[error("wkhtmltopdf produced no output")]
    EmptyOutput,
}

pub struct PdfRenderer {
    binary: PathBuf,
    timeout: Duration,
    templates: Arc<Templates>,
}

impl PdfRenderer {
    pub fn new(binary: PathBuf, timeout: Duration, templates: Arc<Templates>) -> Self {
        Self {
            binary,
            timeout,
            templates,
        }
    }

    /// An explicitly configured converter must exist; otherwise look it up on `PATH`.
    pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf, RenderError> {
        match explicit {
            Some(path) if path.is_file() => Ok(path.to_path_buf()),
            Some(path) => Err(RenderError::ConverterNotFound(format!(
                "{} does not exist",
                path.display()
            ))),
            None => which::which(CONVERTER_BINARY).map_err(|e| {
                RenderError::ConverterNotFound(format!(
                    "{e}; install wkhtmltopdf or set renderer.wkhtmltopdf_path"
                ))
            }),
        }
    }

    pub fn from_config(config: &RendererConfig, templates: Arc<Templates>) -> Result<Self, RenderError> {
        let binary = Self::resolve(config.wkhtmltopdf_path.as_deref())?;
        tracing::info!("PDF converter: {}", binary.display());
        Ok(Self::new(
            binary,
            Duration::from_secs(config.timeout_secs),
            templates,
        ))
    }

    pub fn render_html(&self, itinerary: &str) -> Result<String, RenderError> {
        Ok(self
            .templates
            .render(ITINERARY_PDF, context! { itinerary => itinerary })?)
    }

    /// Render the itinerary text into PDF bytes.
    pub async fn render_pdf(&self, itinerary: Option<&str>) -> Result<Vec<u8>, RenderError> {
        let itinerary = itinerary
            .filter(|text| !text.is_empty())
            .ok_or(RenderError::MissingItinerary)?;
        let html = self.render_html(itinerary)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--quiet")
            .arg("-")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(RenderError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(html.as_bytes()).await {
                    tracing::debug!("wkhtmltopdf closed stdin early: {e}");
                }
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout.as_secs()))?
            .map_err(RenderError::Spawn)?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                code: output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(RenderError::EmptyOutput);
        }
        Ok(output.stdout)
    }
}
