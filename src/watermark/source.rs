//! Image source loading for the built-in renderer.
//!
//! # Supported Sources
//!
//! - `data:<mime>;base64,<payload>` - inline image data
//! - `http://...` / `https://...` - fetched with reqwest, subject to the
//!   cross-origin capability the renderer was built with
//! - anything else - a file path (optionally `file://`), resolved against the
//!   configured base directory
//!
//! Pixel access to a remote image needs cross-origin permission. With
//! [`CrossOrigin::Anonymous`] every remote source is readable; with
//! [`CrossOrigin::SameOrigin`] only sources sharing the document origin are.

use super::RenderError;
use crate::config::{CrossOrigin, RendererConfig};
use base64::Engine;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parsed location of an image source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline data: payload bytes already decoded.
    Data { mime: String, bytes: Vec<u8> },
    /// Remote http(s) URL.
    Remote(Url),
    /// Local file.
    File(PathBuf),
}

impl ImageSource {
    /// Parse a source string.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Decode` for malformed `data:` URLs and
    /// `RenderError::Fetch` for unparseable http(s) URLs.
    pub fn parse(source: &str, base_dir: Option<&Path>) -> Result<Self, RenderError> {
        let source = source.trim();

        if let Some(rest) = source.strip_prefix("data:") {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| RenderError::Decode("data URL has no payload".to_string()))?;

            let (mime, is_base64) = match meta.strip_suffix(";base64") {
                Some(mime) => (mime, true),
                None => (meta, false),
            };

            let bytes = if is_base64 {
                base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .map_err(|e| RenderError::Decode(format!("Invalid base64 payload: {}", e)))?
            } else {
                payload.as_bytes().to_vec()
            };

            return Ok(ImageSource::Data {
                mime: mime.to_string(),
                bytes,
            });
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            let url = Url::parse(source)
                .map_err(|e| RenderError::Fetch(format!("Invalid URL {}: {}", source, e)))?;
            return Ok(ImageSource::Remote(url));
        }

        let path = Path::new(source.strip_prefix("file://").unwrap_or(source));
        let path = match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        Ok(ImageSource::File(path))
    }
}

/// Fetches source bytes according to the renderer's cross-origin capability.
#[derive(Clone)]
pub struct SourceLoader {
    http_client: reqwest::Client,
    cross_origin: CrossOrigin,
    document_origin: Option<String>,
    base_dir: Option<PathBuf>,
}

impl SourceLoader {
    /// # Errors
    ///
    /// Returns `RenderError::Fetch` if the HTTP client cannot be created or
    /// the configured document origin is not a valid URL.
    pub fn new(config: &RendererConfig) -> Result<Self, RenderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RenderError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        let document_origin = match config.document_origin {
            Some(ref origin) => Some(
                Url::parse(origin)
                    .map_err(|e| {
                        RenderError::Fetch(format!("Invalid document origin {}: {}", origin, e))
                    })?
                    .origin()
                    .ascii_serialization(),
            ),
            None => None,
        };

        Ok(Self {
            http_client,
            cross_origin: config.cross_origin,
            document_origin,
            base_dir: config.base_dir.clone(),
        })
    }

    pub fn cross_origin(&self) -> CrossOrigin {
        self.cross_origin
    }

    /// Whether pixel data from `url` may be read.
    pub fn is_readable(&self, url: &Url) -> bool {
        match self.cross_origin {
            CrossOrigin::Anonymous => true,
            CrossOrigin::SameOrigin => {
                self.document_origin.as_deref() == Some(url.origin().ascii_serialization().as_str())
            }
        }
    }

    /// Load the raw (still encoded) bytes of `source`.
    pub async fn load(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        match ImageSource::parse(source, self.base_dir.as_deref())? {
            ImageSource::Data { bytes, .. } => Ok(bytes),
            ImageSource::Remote(url) => {
                if !self.is_readable(&url) {
                    return Err(RenderError::CrossOrigin(url.to_string()));
                }
                self.fetch_remote(url).await
            }
            ImageSource::File(path) => tokio::fs::read(&path).await.map_err(|e| {
                RenderError::Fetch(format!("Failed to read {}: {}", path.display(), e))
            }),
        }
    }

    async fn fetch_remote(&self, url: Url) -> Result<Vec<u8>, RenderError> {
        tracing::debug!(url = %url, "Fetching remote image source");

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RenderError::Fetch(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RenderError::Fetch(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Fetch(format!("Failed to read response body: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
