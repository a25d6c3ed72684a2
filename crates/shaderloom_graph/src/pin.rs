// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node inputs/outputs.

use crate::node::{ContentType, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinId(pub Uuid);

impl PinId {
    /// Create a new random pin ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PinId {
    fn default() -> Self {
        Self::new()
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinKind {
    /// Input pin (a shader channel or the render output)
    Input,
    /// Output pin
    Output,
}

/// A pin on a node
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    /// Unique pin ID
    pub id: PinId,
    /// Owning node. Never an owning reference; resolve it through the graph.
    pub node: NodeId,
    /// Pin name
    pub name: String,
    /// Pin direction
    pub kind: PinKind,
    /// Content flowing through this pin, kept in sync by type propagation
    pub content_type: ContentType,
}

impl Pin {
    /// Create a new input pin
    pub fn input(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            id: PinId::new(),
            node,
            name: name.into(),
            kind: PinKind::Input,
            content_type: ContentType::Image,
        }
    }

    /// Create a new output pin
    pub fn output(node: NodeId, name: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: PinId::new(),
            node,
            name: name.into(),
            kind: PinKind::Output,
            content_type,
        }
    }

    /// Whether this is an input pin
    pub fn is_input(&self) -> bool {
        self.kind == PinKind::Input
    }
}
