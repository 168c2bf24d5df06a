//! Per-image side-table state.
//!
//! The orchestrator keeps one [`ImageRecord`] per image it has admitted. The
//! record is authoritative; the parse-state and cache attributes on the node
//! only mirror it.

use crate::document::{
    Document, NodeId, CACHED_SRCSET_ATTRIBUTE, CACHED_SRC_ATTRIBUTE, PARSE_STATE_ATTRIBUTE,
};
use crate::watermark::AttributeKind;
use std::fmt;

/// Lifecycle of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Never admitted
    #[default]
    Unset,
    /// Marked stale by an options change, waiting for a forced reprocess
    Pending,
    /// Render in flight
    Parsing,
    Parsed,
    /// Render exceeded its budget; the render itself keeps going
    Timeout,
    Error,
}

impl ParseState {
    /// Markup value; `None` for `Unset`, which is represented by absence.
    pub fn as_attribute(&self) -> Option<&'static str> {
        match self {
            ParseState::Unset => None,
            ParseState::Pending => Some("pending"),
            ParseState::Parsing => Some("parsing"),
            ParseState::Parsed => Some("parsed"),
            ParseState::Timeout => Some("timeout"),
            ParseState::Error => Some("error"),
        }
    }

    pub fn from_attribute(value: &str) -> Self {
        match value {
            "pending" => ParseState::Pending,
            "parsing" => ParseState::Parsing,
            "parsed" => ParseState::Parsed,
            "timeout" => ParseState::Timeout,
            "error" => ParseState::Error,
            _ => ParseState::Unset,
        }
    }
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_attribute().unwrap_or("unset"))
    }
}

/// Why `process` declined an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Below the configured minimum width or height
    TooSmall,
    /// A render is already in flight
    InFlight,
    AlreadyParsed,
    /// Stale, and the call was not forced
    AwaitingReconfiguration,
    /// No longer attached to the document
    Detached,
}

/// Outcome of a `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    Skipped(SkipReason),
}

impl Dispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Dispatch::Started)
    }
}

/// Pristine `src`/`srcset` values, each written at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCache {
    src: Option<String>,
    srcset: Option<String>,
}

impl AttributeCache {
    pub fn get(&self, kind: AttributeKind) -> Option<&str> {
        match kind {
            AttributeKind::Src => self.src.as_deref(),
            AttributeKind::Srcset => self.srcset.as_deref(),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.src.is_some() || self.srcset.is_some()
    }

    /// Store `value` unless the slot is already filled. Returns whether it was stored.
    pub fn remember(&mut self, kind: AttributeKind, value: String) -> bool {
        let slot = match kind {
            AttributeKind::Src => &mut self.src,
            AttributeKind::Srcset => &mut self.srcset,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }
}

/// Side-table entry for one image.
#[derive(Debug, Clone, Default)]
pub struct ImageRecord {
    pub state: ParseState,
    pub cache: AttributeCache,
    /// Latest admitted run
    pub(crate) run: u64,
    /// Runs numbered below this never write: they predate a forced restart
    /// or the rebuild of this record.
    pub(crate) fence: u64,
}

impl ImageRecord {
    /// Rebuild a record from markup left on a node, e.g. one that was detached
    /// and later re-inserted.
    ///
    /// A `parsing` marker has no live run behind it any more, so it is dropped.
    /// Runs numbered below `fence` belong to an earlier record for the node.
    pub fn hydrate(document: &dyn Document, image: NodeId, fence: u64) -> Self {
        let mut cache = AttributeCache::default();
        if let Some(src) = document.attribute(image, CACHED_SRC_ATTRIBUTE) {
            cache.remember(AttributeKind::Src, src);
        }
        if let Some(srcset) = document.attribute(image, CACHED_SRCSET_ATTRIBUTE) {
            cache.remember(AttributeKind::Srcset, srcset);
        }

        let state = match document
            .attribute(image, PARSE_STATE_ATTRIBUTE)
            .map(|v| ParseState::from_attribute(&v))
            .unwrap_or_default()
        {
            ParseState::Parsing => ParseState::Unset,
            other => other,
        };

        Self {
            state,
            cache,
            run: 0,
            fence,
        }
    }

    /// Eligibility gate on the parse state.
    pub fn admit(&self, force: bool) -> Result<(), SkipReason> {
        match self.state {
            ParseState::Parsing => Err(SkipReason::InFlight),
            ParseState::Parsed => Err(SkipReason::AlreadyParsed),
            ParseState::Pending if !force => Err(SkipReason::AwaitingReconfiguration),
            _ => Ok(()),
        }
    }

    /// Record `run` as admitted. A run admitted out of `pending` is a forced
    /// restart and fences off every earlier run.
    pub(crate) fn begin_run(&mut self, run: u64) {
        if self.state == ParseState::Pending {
            self.fence = run;
        }
        self.state = ParseState::Parsing;
        self.run = run;
    }

    /// Whether `run` is barred from writing.
    pub(crate) fn is_fenced(&self, run: u64) -> bool {
        run < self.fence
    }

    pub(crate) fn is_latest(&self, run: u64) -> bool {
        self.run == run
    }
}
