// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::node::NodeId;
use crate::pin::PinId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Create a new random link ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// Texture filtering applied when a channel samples the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Filter {
    /// Trilinear filtering over generated mipmaps
    Mipmap,
    /// Bilinear filtering
    #[default]
    Linear,
    /// Point sampling
    Nearest,
}

/// Texture addressing applied outside the `[0, 1]` range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Wrap {
    /// Clamp to the edge texel
    Clamp,
    /// Tile the texture
    #[default]
    Repeat,
}

/// A link from an output pin to an input pin
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// Source node ID
    pub from_node: NodeId,
    /// Source (output) pin ID
    pub from_pin: PinId,
    /// Target node ID
    pub to_node: NodeId,
    /// Target (input) pin ID
    pub to_pin: PinId,
    /// Sampling filter used by the consuming channel
    pub filter: Filter,
    /// Wrap mode used by the consuming channel
    pub wrap: Wrap,
}

impl Link {
    /// Create a new link with default sampling
    pub fn new(from_node: NodeId, from_pin: PinId, to_node: NodeId, to_pin: PinId) -> Self {
        Self {
            id: LinkId::new(),
            from_node,
            from_pin,
            to_node,
            to_pin,
            filter: Filter::default(),
            wrap: Wrap::default(),
        }
    }

    /// Set the sampling parameters
    pub fn with_sampling(mut self, filter: Filter, wrap: Wrap) -> Self {
        self.filter = filter;
        self.wrap = wrap;
        self
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// Check if this link involves a specific pin
    pub fn involves_pin(&self, pin_id: PinId) -> bool {
        self.from_pin == pin_id || self.to_pin == pin_id
    }
}
