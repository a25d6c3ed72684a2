// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transmission format: the JSON project file.
//!
//! Nodes are keyed by their unique name and links refer to nodes by name,
//! so a file carries no ids and loading always mints fresh ones. Texture
//! pixels travel as base64-encoded PNG.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::graph::{ConnectionError, Graph};
use crate::link::{Filter, Wrap};
use crate::node::{
    ContentType, CubeMapNode, LastFrameNode, Node, NodeClass, NodeId, ShaderNode, TextureNode,
};
use crate::texture::{CubeMapData, ImageData, TextureError};

/// Errors reading or writing the transmission format
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// File system failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON or unknown node class
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Texture payload is not valid base64
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Texture payload is not a valid image
    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    /// A link or feedback reference names a node that does not exist
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A feedback reference names something other than a shader
    #[error("{last_frame} references {target}, which is not a shader")]
    NotAShader {
        /// Feedback node
        last_frame: String,
        /// Referenced node
        target: String,
    },

    /// A link targets an input slot the node does not have
    #[error("{node} has no input slot {slot}")]
    InvalidSlot {
        /// Destination node
        node: String,
        /// Requested slot
        slot: u32,
    },

    /// A link starts at a node without an output
    #[error("{0} has no output")]
    NoOutput(String),

    /// Two links target the same input slot
    #[error("{node} slot {slot} is linked more than once")]
    DuplicateSlot {
        /// Destination node
        node: String,
        /// Repeated slot
        slot: u32,
    },

    /// More than one render output
    #[error("Only one RenderOutput node is allowed")]
    DuplicateRenderOutput,

    /// A link the graph rejects
    #[error("Invalid link {start} -> {end}: {source}")]
    Link {
        /// Source node
        start: String,
        /// Destination node
        end: String,
        /// Why the graph refused it
        source: ConnectionError,
    },
}

/// A whole project file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionFormat {
    /// Free-form key/value metadata
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
    /// Nodes keyed by name
    pub nodes: IndexMap<String, NodeRecord>,
    /// Links between named nodes
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

/// One serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum NodeRecord {
    /// The render output
    RenderOutput,
    /// A shader pass
    #[serde(rename = "GLSLShader")]
    GlslShader {
        /// GLSL source
        source: String,
        /// Image or cubemap
        #[serde(rename = "type")]
        content_type: ContentType,
    },
    /// A static texture
    Texture {
        /// Base64 PNG, absent for an empty texture node
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        /// Whether rows were flipped on load
        #[serde(rename = "flipY", default)]
        flip_y: bool,
    },
    /// A static cubemap
    CubeMap {
        /// Face edge length
        size: u32,
        /// Base64 PNG per face, empty for an unassigned cubemap
        #[serde(default)]
        faces: Vec<String>,
    },
    /// Keyboard input
    Keyboard,
    /// Feedback of a shader
    LastFrame {
        /// Name of the referenced shader
        target: Option<String>,
        /// Content type of the referenced shader
        #[serde(rename = "type")]
        content_type: ContentType,
    },
}

/// One serialized link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Source node name
    pub start: String,
    /// Destination node name
    pub end: String,
    /// Sampling filter
    #[serde(default)]
    pub filter: Filter,
    /// Wrap mode
    #[serde(default)]
    pub wrap: Wrap,
    /// Destination input slot
    pub slot: u32,
}

impl TransmissionFormat {
    /// Capture a graph
    pub fn from_graph(graph: &Graph) -> Result<Self, FormatError> {
        let name_of = |id: NodeId| graph.node(id).map(|n| n.name.clone());

        let mut nodes = IndexMap::new();
        for node in graph.nodes() {
            let record = match &node.class {
                NodeClass::RenderOutput => NodeRecord::RenderOutput,
                NodeClass::Shader(shader) => NodeRecord::GlslShader {
                    source: shader.source.clone(),
                    content_type: node.content_type,
                },
                NodeClass::Texture(texture) => NodeRecord::Texture {
                    data: texture
                        .image
                        .as_ref()
                        .map(|image| encode_image(image, texture.flip_y))
                        .transpose()?,
                    flip_y: texture.flip_y,
                },
                NodeClass::CubeMap(cube_map) => match &cube_map.faces {
                    Some(faces) => NodeRecord::CubeMap {
                        size: faces.size(),
                        faces: faces
                            .faces()
                            .iter()
                            .map(|face| encode_image(face, false))
                            .collect::<Result<_, _>>()?,
                    },
                    None => NodeRecord::CubeMap {
                        size: 0,
                        faces: Vec::new(),
                    },
                },
                NodeClass::Keyboard => NodeRecord::Keyboard,
                NodeClass::LastFrame(last_frame) => NodeRecord::LastFrame {
                    target: last_frame.target.and_then(name_of),
                    content_type: node.content_type,
                },
            };
            nodes.insert(node.name.clone(), record);
        }

        let mut links = Vec::new();
        for link in graph.links() {
            let start = name_of(link.from_node)
                .ok_or_else(|| FormatError::UnknownNode(format!("{:?}", link.from_node)))?;
            let consumer = graph
                .node(link.to_node)
                .ok_or_else(|| FormatError::UnknownNode(format!("{:?}", link.to_node)))?;
            let slot = consumer
                .input_slot(link.to_pin)
                .ok_or_else(|| FormatError::UnknownNode(consumer.name.clone()))?;
            links.push(LinkRecord {
                start,
                end: consumer.name.clone(),
                filter: link.filter,
                wrap: link.wrap,
                slot,
            });
        }

        Ok(Self {
            metadata: IndexMap::new(),
            nodes,
            links,
        })
    }

    /// Rebuild a graph. Feedback references resolve by name once every
    /// node exists.
    pub fn to_graph(&self) -> Result<Graph, FormatError> {
        let mut graph = Graph::new();
        let mut ids: IndexMap<&str, NodeId> = IndexMap::new();
        let mut pending_targets = Vec::new();

        for (name, record) in &self.nodes {
            let (class, content_type) = match record {
                NodeRecord::RenderOutput => {
                    if graph.render_output().is_some() {
                        return Err(FormatError::DuplicateRenderOutput);
                    }
                    (NodeClass::RenderOutput, ContentType::Image)
                }
                NodeRecord::GlslShader {
                    source,
                    content_type,
                } => (
                    NodeClass::Shader(ShaderNode {
                        source: source.clone(),
                    }),
                    *content_type,
                ),
                NodeRecord::Texture { data, flip_y } => {
                    let image = data
                        .as_deref()
                        .map(|data| decode_image(data, *flip_y))
                        .transpose()?;
                    let texture = TextureNode {
                        image,
                        flip_y: *flip_y,
                        resident: None,
                    };
                    (NodeClass::Texture(texture), ContentType::Image)
                }
                NodeRecord::CubeMap { faces, .. } => {
                    let faces = if faces.is_empty() {
                        None
                    } else {
                        let faces = faces
                            .iter()
                            .map(|face| decode_image(face, false))
                            .collect::<Result<Vec<_>, _>>()?;
                        Some(CubeMapData::new(faces)?)
                    };
                    let cube_map = CubeMapNode {
                        faces,
                        resident: None,
                    };
                    (NodeClass::CubeMap(cube_map), ContentType::CubeMap)
                }
                NodeRecord::Keyboard => (NodeClass::Keyboard, ContentType::Image),
                NodeRecord::LastFrame {
                    target,
                    content_type,
                } => {
                    if let Some(target) = target {
                        pending_targets.push((name.as_str(), target.as_str()));
                    }
                    (
                        NodeClass::LastFrame(LastFrameNode::default()),
                        *content_type,
                    )
                }
            };
            let mut node = Node::new(name.clone(), class);
            node.content_type = content_type;
            for pin in &mut node.outputs {
                pin.content_type = content_type;
            }
            ids.insert(name.as_str(), graph.insert_node(node));
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| FormatError::UnknownNode(name.to_string()))
        };

        for (last_frame, target) in pending_targets {
            let target_id = lookup(target)?;
            graph
                .set_last_frame_target(lookup(last_frame)?, Some(target_id))
                .map_err(|_| FormatError::NotAShader {
                    last_frame: last_frame.to_string(),
                    target: target.to_string(),
                })?;
        }

        let mut linked_slots = IndexSet::new();
        for link in &self.links {
            let start = lookup(link.start.as_str())?;
            let end = lookup(link.end.as_str())?;
            if !linked_slots.insert((end, link.slot)) {
                return Err(FormatError::DuplicateSlot {
                    node: link.end.clone(),
                    slot: link.slot,
                });
            }
            let from = graph
                .node(start)
                .and_then(|n| n.output(0))
                .map(|p| p.id)
                .ok_or_else(|| FormatError::NoOutput(link.start.clone()))?;
            let to = graph
                .node(end)
                .and_then(|n| n.input(link.slot as usize))
                .map(|p| p.id)
                .ok_or_else(|| FormatError::InvalidSlot {
                    node: link.end.clone(),
                    slot: link.slot,
                })?;
            graph
                .connect_with_sampling(from, to, link.filter, link.wrap)
                .map_err(|source| FormatError::Link {
                    start: link.start.clone(),
                    end: link.end.clone(),
                    source,
                })?;
        }

        Ok(graph)
    }

    /// Parse JSON text
    pub fn from_json(json: &str) -> Result<Self, FormatError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, FormatError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Save to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}

fn encode_image(image: &ImageData, flip_y: bool) -> Result<String, FormatError> {
    let png = if flip_y {
        let mut flipped = image.clone();
        flipped.flip_vertical();
        flipped.encode_png()?
    } else {
        image.encode_png()?
    };
    Ok(general_purpose::STANDARD.encode(png))
}

fn decode_image(data: &str, flip_y: bool) -> Result<ImageData, FormatError> {
    let bytes = general_purpose::STANDARD.decode(data)?;
    let mut image = ImageData::decode(&bytes)?;
    if flip_y {
        image.flip_vertical();
    }
    Ok(image)
}

/// Save a graph as a project file
pub fn save_graph(graph: &Graph, path: impl AsRef<Path>) -> Result<(), FormatError> {
    TransmissionFormat::from_graph(graph)?.save(path)
}

/// Load a graph from a project file
pub fn load_graph(path: impl AsRef<Path>) -> Result<Graph, FormatError> {
    TransmissionFormat::load(path)?.to_graph()
}
