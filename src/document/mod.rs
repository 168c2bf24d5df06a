//! Document boundary.
//!
//! The orchestrator never owns image nodes. It addresses them by [`NodeId`],
//! reads their dimensions and attributes, and writes final attribute values
//! back through this trait. Structural changes inside an observed subtree are
//! surfaced as a bare "something changed" signal.

pub mod memory;

pub use memory::{ElementFixture, MemoryDocument, NodeSnapshot, PageFixture};

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Parse-state marker mirrored onto each managed image.
pub const PARSE_STATE_ATTRIBUTE: &str = "data-watermark-parse-state";

/// Pristine `src` value, written at most once.
pub const CACHED_SRC_ATTRIBUTE: &str = "data-cf-watermark-src";

/// Pristine `srcset` value, written at most once.
pub const CACHED_SRCSET_ATTRIBUTE: &str = "data-cf-watermark-srcset";

/// Document-level preview/live marker.
pub const MODE_ATTRIBUTE: &str = "data-cf-watermark-mode";

/// Stable identity of a node in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Rendered size of an image node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A document whose image nodes can be watermarked.
pub trait Document: Send + Sync {
    /// First element matching `selector`, in document order.
    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    /// Every image element inside `root`'s subtree, in document order.
    fn images_under(&self, root: NodeId) -> Vec<NodeId>;

    /// Whether `node` is still attached to the document.
    fn contains(&self, node: NodeId) -> bool;

    fn dimensions(&self, node: NodeId) -> Option<Dimensions>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn set_document_attribute(&self, name: &str, value: &str);

    /// Subscribe to insertions/removals anywhere under `root`.
    ///
    /// The value is a change counter; bursts of mutations may coalesce into a
    /// single `changed()` wakeup.
    fn observe(&self, root: NodeId) -> watch::Receiver<u64>;
}
