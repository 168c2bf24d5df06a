//! Render pipeline for a single image.
//!
//! An image with a `srcset` has every candidate rendered concurrently with the
//! same drawing parameters; the result is available only once all of them
//! succeed, and the first failure fails the image. Without a `srcset` the
//! primary source is rendered once.

use super::srcset::{self, SrcsetEntry};
use super::{DrawParams, RenderError, Renderer};
use crate::document::{CACHED_SRCSET_ATTRIBUTE, CACHED_SRC_ATTRIBUTE};
use futures::future::try_join_all;
use std::fmt;

/// Which live attribute a render result replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Src,
    Srcset,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Src => "src",
            AttributeKind::Srcset => "srcset",
        }
    }

    /// Markup attribute holding the pristine value.
    pub fn cache_attribute(&self) -> &'static str {
        match self {
            AttributeKind::Src => CACHED_SRC_ATTRIBUTE,
            AttributeKind::Srcset => CACHED_SRCSET_ATTRIBUTE,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to one image render: the effective (cached-or-live) value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSource {
    /// A plain `src` URL
    Single(String),
    /// A full `srcset` value
    Set(String),
}

impl RenderSource {
    pub fn attribute(&self) -> AttributeKind {
        match self {
            RenderSource::Single(_) => AttributeKind::Src,
            RenderSource::Set(_) => AttributeKind::Srcset,
        }
    }
}

/// New value for one attribute of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub attribute: AttributeKind,
    pub value: String,
}

/// Render `source` with `params`, producing exactly one result.
pub async fn render(
    renderer: &dyn Renderer,
    source: &RenderSource,
    params: &DrawParams,
) -> Result<RenderResult, RenderError> {
    match source {
        RenderSource::Single(url) => {
            if url.trim().is_empty() {
                return Err(RenderError::MissingSource);
            }
            let value = renderer.render(url, params).await?;
            Ok(RenderResult {
                attribute: AttributeKind::Src,
                value,
            })
        }
        RenderSource::Set(value) => {
            let entries = srcset::parse(value);
            if entries.is_empty() {
                return Err(RenderError::MissingSource);
            }

            // try_join_all keeps input order and stops at the first error
            let rendered = try_join_all(entries.iter().map(|entry| async move {
                let url = renderer.render(&entry.url, params).await?;
                Ok::<_, RenderError>(SrcsetEntry {
                    url,
                    descriptor: entry.descriptor.clone(),
                })
            }))
            .await?;

            tracing::debug!(candidates = rendered.len(), "Rendered srcset candidates");

            Ok(RenderResult {
                attribute: AttributeKind::Srcset,
                value: srcset::build(&rendered),
            })
        }
    }
}
