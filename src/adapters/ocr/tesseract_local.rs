use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::adapters::OcrAdapter;
use crate::models::{AdapterError, AdapterErrorKind, MediaType, RawOCRResult};

/// Local Tesseract fallback adapter — no network call, no per-page cost.
/// Exists so a deployment with no OCR provider keys still has a working
/// adapter (spec §4.1 capability table needs at least one always-on row).
pub struct TesseractLocalAdapter {
    binary_path: String,
}

impl TesseractLocalAdapter {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self { binary_path: binary_path.into() }
    }
}

impl Default for TesseractLocalAdapter {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrAdapter for TesseractLocalAdapter {
    fn id(&self) -> &str {
        "tesseract_local"
    }

    fn supports_media(&self, media_type: MediaType) -> bool {
        matches!(media_type, MediaType::Image)
    }

    async fn extract(&self, content_bytes: &[u8], media_type: MediaType, _language_hint: Option<&str>) -> RawOCRResult {
        let started = Instant::now();
        if !self.supports_media(media_type) {
            return RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::UnsupportedMedia, "tesseract_local only accepts raster images"),
                started.elapsed(),
            );
        }

        let mut child = match Command::new(&self.binary_path)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return RawOCRResult::failure(
                    self.id(),
                    AdapterError::new(AdapterErrorKind::ProviderError, format!("spawn failed: {err}")),
                    started.elapsed(),
                )
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(content_bytes).await.is_err() {
                return RawOCRResult::failure(
                    self.id(),
                    AdapterError::new(AdapterErrorKind::ProviderError, "failed writing image to tesseract stdin"),
                    started.elapsed(),
                );
            }
        }

        match child.wait_with_output().await {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if text.is_empty() {
                    RawOCRResult::failure(
                        self.id(),
                        AdapterError::new(AdapterErrorKind::ProviderError, "tesseract produced no text"),
                        started.elapsed(),
                    )
                } else {
                    RawOCRResult::success(self.id(), text, 0.70, started.elapsed())
                }
            }
            Ok(output) => RawOCRResult::failure(
                self.id(),
                AdapterError::new(
                    AdapterErrorKind::ProviderError,
                    String::from_utf8_lossy(&output.stderr).to_string(),
                ),
                started.elapsed(),
            ),
            Err(err) => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::ProviderError, err.to_string()),
                started.elapsed(),
            ),
        }
    }
}
