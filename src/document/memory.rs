//! In-memory document tree.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Removing a node detaches it
//! (and its subtree) from the tree but keeps it addressable, the same way a
//! detached DOM node can still be held by script. Observers registered with
//! [`Document::observe`] are woken whenever a child list changes inside their
//! subtree.

use super::{Dimensions, Document, NodeId};
use crate::error::Error;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    dimensions: Dimensions,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            dimensions: Dimensions::default(),
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    body: NodeId,
    next_id: u64,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            root: NodeId(0),
            body: NodeId(0),
            next_id: 0,
        };
        let root = tree.insert(Node::new("html"));
        let body = tree.insert(Node::new("body"));
        tree.root = root;
        tree.body = body;
        tree.attach(root, body);
        tree
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&child)?.parent.take()?;
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != child);
        }
        Some(parent)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// `ancestor` is `node` itself or one of its parents.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, node)
    }

    /// Pre-order walk of the descendants of `root` (excluding `root`).
    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&root) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn snapshot(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.nodes.get(&id)?;
        Some(NodeSnapshot {
            tag: node.tag.clone(),
            attributes: node.attributes.clone(),
            width: node.dimensions.width,
            height: node.dimensions.height,
            children: node
                .children
                .iter()
                .filter_map(|c| self.snapshot(*c))
                .collect(),
        })
    }
}

/// Compound selector: optional tag, optional `#id`, any number of `.class`.
#[derive(Debug, Default, PartialEq)]
struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() || input.contains(char::is_whitespace) {
            return None;
        }

        let mut selector = Selector::default();
        let mut rest = input;

        let tag_end = rest.find(['#', '.']).unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        if !tag.is_empty() && tag != "*" {
            selector.tag = Some(tag.to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        while !rest.is_empty() {
            let marker = rest.chars().next()?;
            let body = &rest[1..];
            let end = body.find(['#', '.']).unwrap_or(body.len());
            let name = &body[..end];
            if name.is_empty() {
                return None;
            }
            match marker {
                '#' => selector.id = Some(name.to_string()),
                '.' => selector.classes.push(name.to_string()),
                _ => return None,
            }
            rest = &body[end..];
        }

        Some(selector)
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(ref tag) = self.tag {
            if &node.tag != tag {
                return false;
            }
        }
        if let Some(ref id) = self.id {
            if node.attributes.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = node.attributes.get("class").map(String::as_str).unwrap_or("");
            let present: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }
        true
    }
}

struct Observer {
    root: NodeId,
    tx: watch::Sender<u64>,
}

/// Serialisable element description used to seed a [`MemoryDocument`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementFixture {
    pub tag: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Rendered width; falls back to the `width` attribute
    #[serde(default)]
    pub width: Option<u32>,

    /// Rendered height; falls back to the `height` attribute
    #[serde(default)]
    pub height: Option<u32>,

    #[serde(default)]
    pub children: Vec<ElementFixture>,
}

/// A page: attributes for `<body>` plus its children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFixture {
    #[serde(default)]
    pub body_attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Vec<ElementFixture>,
}

impl PageFixture {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Fixture(e.to_string()))
    }
}

/// Serialisable view of a node and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub width: u32,
    pub height: u32,
    pub children: Vec<NodeSnapshot>,
}

/// Arena-backed [`Document`] implementation.
pub struct MemoryDocument {
    tree: RwLock<Tree>,
    observers: Mutex<Vec<Observer>>,
}

impl MemoryDocument {
    /// An empty `<html><body></body></html>` document.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn from_fixture(fixture: &PageFixture) -> Self {
        let document = Self::new();
        let body = document.body();
        for (name, value) in &fixture.body_attributes {
            document.set_attribute(body, name, value);
        }
        for element in &fixture.body {
            let id = document.build(element);
            document.append_child(body, id);
        }
        document
    }

    fn build(&self, fixture: &ElementFixture) -> NodeId {
        let id = self.create_element(&fixture.tag);
        for (name, value) in &fixture.attributes {
            self.set_attribute(id, name, value);
        }
        let attr_dim = |name: &str| {
            fixture
                .attributes
                .get(name)
                .and_then(|v| v.trim().parse::<u32>().ok())
        };
        let width = fixture.width.or_else(|| attr_dim("width")).unwrap_or(0);
        let height = fixture.height.or_else(|| attr_dim("height")).unwrap_or(0);
        self.set_dimensions(id, Dimensions::new(width, height));

        for child in &fixture.children {
            let child_id = self.build(child);
            self.append_child(id, child_id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        self.tree.read().root
    }

    pub fn body(&self) -> NodeId {
        self.tree.read().body
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.write().insert(Node::new(tag))
    }

    /// Create a detached `<img>` with a `src` and rendered size.
    pub fn create_image(&self, src: &str, dimensions: Dimensions) -> NodeId {
        let mut node = Node::new("img");
        node.attributes.insert("src".to_string(), src.to_string());
        node.dimensions = dimensions;
        self.tree.write().insert(node)
    }

    /// Move `child` under `parent` (as its last child).
    ///
    /// Returns false if either node is unknown or the move would create a cycle.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let old_parent = {
            let mut tree = self.tree.write();
            if !tree.nodes.contains_key(&parent) || !tree.nodes.contains_key(&child) {
                return false;
            }
            if tree.is_inclusive_ancestor(child, parent) {
                return false;
            }
            let old_parent = tree.detach(child);
            tree.attach(parent, child);
            old_parent
        };

        if let Some(old) = old_parent {
            self.notify(old);
        }
        self.notify(parent);
        true
    }

    /// Detach `node` from its parent. Returns false if it had none.
    pub fn remove(&self, node: NodeId) -> bool {
        let parent = self.tree.write().detach(node);
        match parent {
            Some(parent) => {
                self.notify(parent);
                true
            }
            None => false,
        }
    }

    pub fn set_dimensions(&self, node: NodeId, dimensions: Dimensions) {
        if let Some(n) = self.tree.write().nodes.get_mut(&node) {
            n.dimensions = dimensions;
        }
    }

    pub fn attributes(&self, node: NodeId) -> BTreeMap<String, String> {
        self.tree
            .read()
            .nodes
            .get(&node)
            .map(|n| n.attributes.clone())
            .unwrap_or_default()
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(n) = self.tree.write().nodes.get_mut(&node) {
            n.attributes.remove(name);
        }
    }

    /// Snapshot of the whole document, starting at `<html>`.
    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        let tree = self.tree.read();
        tree.snapshot(tree.root)
    }

    /// Wake every observer whose subtree contains `parent`.
    fn notify(&self, parent: NodeId) {
        let tree = self.tree.read();
        let mut observers = self.observers.lock();
        observers.retain(|o| o.tx.receiver_count() > 0);
        for observer in observers.iter() {
            if tree.is_inclusive_ancestor(observer.root, parent) {
                observer.tx.send_modify(|count| *count += 1);
            }
        }
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for MemoryDocument {
    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        let selector = Selector::parse(selector)?;
        let tree = self.tree.read();
        let root = tree.root;
        std::iter::once(root)
            .chain(tree.descendants(root))
            .find(|id| tree.nodes.get(id).is_some_and(|n| selector.matches(n)))
    }

    fn images_under(&self, root: NodeId) -> Vec<NodeId> {
        let tree = self.tree.read();
        tree.descendants(root)
            .into_iter()
            .filter(|id| tree.nodes.get(id).is_some_and(|n| n.tag == "img"))
            .collect()
    }

    fn contains(&self, node: NodeId) -> bool {
        self.tree.read().is_attached(node)
    }

    fn dimensions(&self, node: NodeId) -> Option<Dimensions> {
        self.tree.read().nodes.get(&node).map(|n| n.dimensions)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree
            .read()
            .nodes
            .get(&node)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.tree.write().nodes.get_mut(&node) {
            n.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn set_document_attribute(&self, name: &str, value: &str) {
        let body = self.body();
        self.set_attribute(body, name, value);
    }

    fn observe(&self, root: NodeId) -> watch::Receiver<u64> {
        let (tx, rx) = watch::channel(0);
        self.observers.lock().push(Observer { root, tx });
        rx
    }
}
