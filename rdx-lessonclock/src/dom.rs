//! A minimal host document: an element tree that batches mutation records.
//!
//! The timer never owns the page it decorates. This module stands in for it:
//! elements carry a tag, attributes and text, every change queues a
//! `MutationRecord`, and `flush` publishes the queued records as one
//! `MutationBatch` to every subscriber of the mutation feed.

use crate::common::{lock_or_recover, NodeId};
use slotmap::SlotMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// A document shared between the host, the behaviors and the finalizer.
pub type SharedDocument = Arc<Mutex<Document>>;

const FEED_CAPACITY: usize = 64;

/// A single element of the document.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// What changed on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// An attribute was set or removed. `old_value` is the value before the
    /// change and `value` the value after it; `None` means absent.
    Attributes {
        name: String,
        old_value: Option<String>,
        value: Option<String>,
    },
    /// A child element was added.
    ChildList,
    /// The node's text changed.
    CharacterData,
}

/// One change to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

/// The records accumulated between two flushes.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
}

/// An element tree with an observable mutation feed.
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    pending: Vec<MutationRecord>,
    feed: broadcast::Sender<MutationBatch>,
}

impl Document {
    /// Creates a document holding a single `body` element.
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            tag: "body".to_string(),
            ..Default::default()
        });
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            nodes,
            root,
            pending: Vec::new(),
            feed,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Appends a new element under `parent`. Returns `None` if the parent is gone.
    pub fn create_element(&mut self, parent: NodeId, tag: &str) -> Option<NodeId> {
        if !self.nodes.contains_key(parent) {
            return None;
        }
        Some(self.append_child(parent, tag))
    }

    /// Caller guarantees `parent` exists.
    fn append_child(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.nodes.insert(Node {
            tag: tag.to_string(),
            parent: Some(parent),
            ..Default::default()
        });
        self.nodes[parent].children.push(id);
        self.pending.push(MutationRecord {
            target: parent,
            kind: MutationKind::ChildList,
        });
        id
    }

    /// Sets an attribute. Returns `false` if the node does not exist.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        let Some(element) = self.nodes.get_mut(node) else {
            return false;
        };
        let old_value = element.attributes.insert(name.to_string(), value.to_string());
        self.pending.push(MutationRecord {
            target: node,
            kind: MutationKind::Attributes {
                name: name.to_string(),
                old_value,
                value: Some(value.to_string()),
            },
        });
        true
    }

    /// Removes an attribute. Removing an absent attribute records nothing.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        let Some(element) = self.nodes.get_mut(node) else {
            return false;
        };
        match element.attributes.remove(name) {
            Some(old_value) => {
                self.pending.push(MutationRecord {
                    target: node,
                    kind: MutationKind::Attributes {
                        name: name.to_string(),
                        old_value: Some(old_value),
                        value: None,
                    },
                });
                true
            }
            None => false,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node)
            .and_then(|element| element.attributes.get(name))
            .map(String::as_str)
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Replaces the text of a node. Returns `false` if the node does not exist.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> bool {
        let Some(element) = self.nodes.get_mut(node) else {
            return false;
        };
        if element.text != text {
            element.text = text.to_string();
            self.pending.push(MutationRecord {
                target: node,
                kind: MutationKind::CharacterData,
            });
        }
        true
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|element| element.text.as_str())
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|element| element.children.as_slice())
            .unwrap_or(&[])
    }

    /// Finds the element whose `id` attribute equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, element)| element.attributes.get("id").map(String::as_str) == Some(id))
            .map(|(key, _)| key)
    }

    /// Depth-first search for the first descendant of `node` with the given tag.
    pub fn find_descendant(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let element = self.nodes.get(current)?;
            if element.tag == tag {
                return Some(current);
            }
            stack.extend(element.children.iter().rev().copied());
        }
        None
    }

    /// Subscribes to the mutation feed.
    pub fn subscribe(&self) -> broadcast::Receiver<MutationBatch> {
        self.feed.subscribe()
    }

    /// Publishes all queued records as one batch. Returns the number of records sent.
    pub fn flush(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let records = std::mem::take(&mut self.pending);
        let count = records.len();
        // No subscribers is fine; nobody is observing this page.
        self.feed.send(MutationBatch { records }).ok();
        count
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to one element of a shared document, used as a display target.
#[derive(Clone)]
pub struct ElementHandle {
    document: SharedDocument,
    node: NodeId,
}

impl ElementHandle {
    pub fn new(document: SharedDocument, node: NodeId) -> Self {
        Self { document, node }
    }

    /// Writes the element's text and flushes the change.
    ///
    /// A missing element is a no-op: the page may legitimately lack it.
    pub fn set_text(&self, text: &str) {
        let mut document = lock_or_recover(&self.document);
        if document.set_text(self.node, text) {
            document.flush();
        } else {
            debug!("Display element {:?} is missing; skipping write.", self.node);
        }
    }

    pub fn text(&self) -> Option<String> {
        lock_or_recover(&self.document)
            .text(self.node)
            .map(str::to_string)
    }
}

/// The parts of a lesson page the timer attaches to.
#[derive(Clone)]
pub struct LessonPage {
    pub document: SharedDocument,
    /// The element whose text shows the timer status.
    pub display: NodeId,
    /// Sections that become visible when the lesson is complete.
    pub watched: Vec<NodeId>,
}

impl LessonPage {
    pub const DISPLAY_ID: &'static str = "wktk-lesson-timer-li";
    pub const COMPLETE_ID: &'static str = "lesson-complete";

    /// Builds the smallest page that carries a timer:
    ///
    /// ```text
    /// body
    /// ├── div#stats > ul > li#wktk-lesson-timer-li
    /// └── div#lesson-complete[hidden] > h1 "Lesson complete"
    /// ```
    pub fn scaffold() -> Self {
        let mut document = Document::new();
        let root = document.root();

        let stats = document.append_child(root, "div");
        document.set_attribute(stats, "id", "stats");
        let list = document.append_child(stats, "ul");
        let display = document.append_child(list, "li");
        let complete = document.append_child(root, "div");
        document.set_attribute(display, "id", Self::DISPLAY_ID);
        document.set_attribute(complete, "id", Self::COMPLETE_ID);
        document.set_attribute(complete, "hidden", "");
        let heading = document.append_child(complete, "h1");
        document.set_text(heading, "Lesson complete");
        // Construction noise is not part of the observable session.
        document.pending.clear();

        Self {
            document: Arc::new(Mutex::new(document)),
            display,
            watched: vec![complete],
        }
    }

    pub fn display_handle(&self) -> ElementHandle {
        ElementHandle::new(self.document.clone(), self.display)
    }
}
