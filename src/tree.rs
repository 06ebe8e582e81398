// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Arena-backed label trie.
//!
//! DNS names form a tree keyed by labels read right to left; both the zone
//! registry and each loaded zone are instances of [`NameTree`]. Nodes live
//! in a `Vec` arena and refer to each other by [`NodeId`], so parent links
//! are plain indices and never own their targets.
//!
//! The payload type is generic: zone trees attach RRsets and an
//! authoritative flag per node, while the zone registry attaches per-apex
//! metadata.

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised by destructive trie operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// `delete_node` refused to unlink a node that still has children.
    #[error("node '{label}' still has child nodes")]
    ChildExists {
        /// The fully qualified label of the node that was not deleted
        label: String,
    },
}

/// Index of a node inside a [`NameTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One label in the hierarchy plus its payload.
#[derive(Debug)]
pub struct Node<T> {
    label: String,
    parent: Option<NodeId>,
    children: HashMap<String, NodeId>,
    /// Caller-owned payload (RRsets, zone metadata, ...).
    pub value: T,
}

impl<T> Node<T> {
    /// Fully qualified label of this node, e.g. `www.example.jp.`.
    /// The root node's label is the empty string.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parent node id; `None` only for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids keyed by their leading label segment.
    #[must_use]
    pub fn children(&self) -> &HashMap<String, NodeId> {
        &self.children
    }
}

/// Label trie over payloads of type `T`.
#[derive(Debug)]
pub struct NameTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T: Default> NameTree<T> {
    /// Creates a tree holding only the root node with a default payload.
    #[must_use]
    pub fn new() -> Self {
        NameTree {
            nodes: vec![Node {
                label: String::new(),
                parent: None,
                children: HashMap::new(),
                value: T::default(),
            }],
        }
    }

    /// Walks `labels` from the rightmost component, creating missing nodes
    /// with `T::default()` payloads, and returns the addressed node.
    pub fn add_node(&mut self, labels: &[String]) -> NodeId {
        self.add_node_with(labels, |_| T::default())
    }
}

impl<T: Default> Default for NameTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NameTree<T> {
    /// The root node id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Borrow a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }

    /// Like [`NameTree::add_node`], but derives each newly created child's
    /// payload from its parent's. Zone trees use this to inherit the
    /// authoritative flag across delegation points.
    pub fn add_node_with<F>(&mut self, labels: &[String], mk_child: F) -> NodeId
    where
        F: Fn(&T) -> T,
    {
        let mut current = self.root();
        for label in labels.iter().rev() {
            if let Some(&child) = self.nodes[current.0].children.get(label) {
                current = child;
                continue;
            }
            let child_label = format!("{}.{}", label, self.nodes[current.0].label);
            let value = mk_child(&self.nodes[current.0].value);
            let id = NodeId(self.nodes.len());
            self.nodes.push(Node {
                label: child_label,
                parent: Some(current),
                children: HashMap::new(),
                value,
            });
            self.nodes[current.0].children.insert(label.clone(), id);
            current = id;
        }
        current
    }

    /// Walks `labels` from the rightmost component. With `strict` the full
    /// chain must exist; otherwise the deepest existing ancestor is
    /// returned (longest-prefix semantics). An empty slice addresses the
    /// root.
    #[must_use]
    pub fn search_node(&self, labels: &[String], strict: bool) -> Option<NodeId> {
        let mut current = self.root();
        for label in labels.iter().rev() {
            match self.nodes[current.0].children.get(label) {
                Some(&child) => current = child,
                None if strict => return None,
                None => return Some(current),
            }
        }
        Some(current)
    }

    /// Unlinks the node addressed by `labels` from its parent. A node that
    /// still has children is only removed when `force` is set; its whole
    /// subtree becomes unreachable. Deleting a name that does not exist is
    /// a no-op.
    pub fn delete_node(&mut self, labels: &[String], force: bool) -> Result<(), TreeError> {
        let Some(last) = labels.first() else {
            return Ok(());
        };
        let Some(id) = self.search_node(labels, true) else {
            return Ok(());
        };
        if !force && !self.nodes[id.0].children.is_empty() {
            return Err(TreeError::ChildExists {
                label: self.nodes[id.0].label.clone(),
            });
        }
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.remove(last);
        }
        Ok(())
    }

    /// Depth-first walk over all reachable nodes, parents before children.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(NodeId, &Node<T>),
    {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            visit(id, node);
            stack.extend(node.children.values().copied());
        }
    }
}
