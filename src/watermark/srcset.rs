//! Source-set parsing and building.
//!
//! A `srcset` value lists candidates separated by a comma followed by
//! whitespace. Splitting on that pair (rather than on bare commas) keeps
//! `data:` URLs intact, which matters because a watermarked srcset is made of
//! them.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static CANDIDATE_SEPARATOR: OnceLock<Regex> = OnceLock::new();

fn separator() -> &'static Regex {
    CANDIDATE_SEPARATOR
        .get_or_init(|| Regex::new(r",\s+").expect("Invalid srcset separator pattern - this is a bug"))
}

/// One candidate of a `srcset`: a URL and its optional size/density descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetEntry {
    pub url: String,
    pub descriptor: Option<String>,
}

impl SrcsetEntry {
    pub fn new(url: impl Into<String>, descriptor: Option<&str>) -> Self {
        Self {
            url: url.into(),
            descriptor: descriptor.map(str::to_string),
        }
    }
}

impl fmt::Display for SrcsetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.descriptor {
            Some(ref descriptor) => write!(f, "{} {}", self.url, descriptor),
            None => f.write_str(&self.url),
        }
    }
}

/// Split a `srcset` value into candidates, preserving order.
///
/// Empty candidates (e.g. from a trailing separator) are dropped.
pub fn parse(value: &str) -> Vec<SrcsetEntry> {
    separator()
        .split(value.trim().trim_end_matches(','))
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let descriptor = parts.collect::<Vec<_>>().join(" ");
            Some(SrcsetEntry {
                url: url.to_string(),
                descriptor: (!descriptor.is_empty()).then_some(descriptor),
            })
        })
        .collect()
}

/// Join candidates back into a `srcset` value (comma-space separated).
pub fn build(entries: &[SrcsetEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
