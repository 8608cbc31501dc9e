// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Generic syntax-node graph.
//!
//! The engine does not parse source text. An external front end hands it an
//! ESTree-shaped JSON document in which every node is an object carrying a
//! string `type`, and every other field is either a single child node, an
//! ordered list of child nodes, or a scalar (`name`, `operator`, `value`,
//! ...). [`SyntaxTree`] flattens that document into an arena addressed by
//! [`NodeId`], numbered in pre-order, so later passes can annotate nodes
//! through side tables without touching the tree.

pub mod build;

use serde_json::Value as Json;

use crate::{Error, Result};

/// Index of a node inside its [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One field of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    /// A single child node
    Node(NodeId),
    /// An ordered list of children (`None` marks a hole)
    List(Vec<Option<NodeId>>),
    /// Any non-node value: strings, numbers, flags, source locations
    Scalar(Json),
}

/// A syntax node: a type tag plus its fields in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The `type` tag
    pub kind: String,
    /// Remaining fields
    pub fields: Vec<(String, Child)>,
}

impl Node {
    fn field(&self, name: &str) -> Option<&Child> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, child)| child)
    }
}

/// An immutable syntax tree.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl SyntaxTree {
    /// Parses the JSON text produced by a front end.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Json = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Builds a tree from an already decoded JSON document.
    pub fn from_value(value: &Json) -> Result<Self> {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.load(value)?;
        Ok(tree)
    }

    fn load(&mut self, value: &Json) -> Result<NodeId> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::syntax(format!("expected a syntax node, found {}", value)))?;
        let kind = object
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::syntax("syntax node without a string `type`"))?;

        // Reserve the slot first so ids come out in pre-order
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: kind.to_string(),
            fields: Vec::new(),
        });

        let mut fields = Vec::with_capacity(object.len().saturating_sub(1));
        for (name, field) in object {
            if name == "type" {
                continue;
            }
            let child = match field {
                Json::Object(_) if is_node(field) => Child::Node(self.load(field)?),
                Json::Array(items) if items.iter().any(is_node) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items {
                        if item.is_null() {
                            list.push(None);
                        } else {
                            list.push(Some(self.load(item)?));
                        }
                    }
                    Child::List(list)
                }
                // Empty arrays stay lists so `body: []` reads as no children
                Json::Array(items) if items.is_empty() => Child::List(Vec::new()),
                other => Child::Scalar(other.clone()),
            };
            fields.push((name.clone(), child));
        }
        self.nodes[id.index()].fields = fields;
        Ok(id)
    }

    /// The root node (normally a `Program`).
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns a node's type tag.
    #[inline]
    pub fn kind(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].kind
    }

    /// Returns the single child stored in `field`, if any.
    pub fn child(&self, id: NodeId, field: &str) -> Option<NodeId> {
        match self.node(id).field(field) {
            Some(Child::Node(child)) => Some(*child),
            _ => None,
        }
    }

    /// Returns the single child stored in `field`, or a syntax error.
    pub fn expect_child(&self, id: NodeId, field: &str) -> Result<NodeId> {
        self.child(id, field).ok_or_else(|| {
            Error::syntax(format!("{} is missing its `{}`", self.kind(id), field))
        })
    }

    /// Returns the children listed in `field`, skipping holes.
    pub fn list(&self, id: NodeId, field: &str) -> Vec<NodeId> {
        match self.node(id).field(field) {
            Some(Child::List(items)) => items.iter().flatten().copied().collect(),
            Some(Child::Node(child)) => vec![*child],
            _ => Vec::new(),
        }
    }

    /// Returns a scalar field.
    pub fn scalar(&self, id: NodeId, field: &str) -> Option<&Json> {
        match self.node(id).field(field) {
            Some(Child::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns a string scalar field.
    pub fn str(&self, id: NodeId, field: &str) -> Option<&str> {
        self.scalar(id, field).and_then(Json::as_str)
    }

    /// Returns a boolean scalar field, treating absence as `false`.
    pub fn flag(&self, id: NodeId, field: &str) -> bool {
        self.scalar(id, field)
            .and_then(Json::as_bool)
            .unwrap_or(false)
    }

    /// The `name` of an `Identifier` node.
    pub fn identifier_name(&self, id: NodeId) -> Result<&str> {
        if self.kind(id) != "Identifier" {
            return Err(Error::syntax(format!(
                "expected Identifier, found {}",
                self.kind(id)
            )));
        }
        self.str(id, "name")
            .ok_or_else(|| Error::syntax("Identifier without a name"))
    }

    /// Iterates over every direct child node, field by field, in document
    /// order. Each item carries the field name it was found under.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.node(id).fields.iter().flat_map(|(name, child)| {
            let ids: Vec<NodeId> = match child {
                Child::Node(child) => vec![*child],
                Child::List(items) => items.iter().flatten().copied().collect(),
                Child::Scalar(_) => Vec::new(),
            };
            ids.into_iter().map(move |child| (name.as_str(), child))
        })
    }

    /// Whether `id` is a function literal (declaration or expression).
    pub fn is_function(&self, id: NodeId) -> bool {
        matches!(self.kind(id), "FunctionDeclaration" | "FunctionExpression")
    }
}

fn is_node(value: &Json) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.get("type").is_some_and(Json::is_string))
}
