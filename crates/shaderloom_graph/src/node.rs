// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the pipeline graph.

use crate::backend::TextureObject;
use crate::pin::{Pin, PinId};
use crate::texture::{CubeMapData, ImageData};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of input channels on every shader node (`iChannel0-3`)
pub const CHANNEL_COUNT: usize = 4;

/// Shader installed by freshly spawned shader nodes
pub const DEFAULT_SHADER_SOURCE: &str = r"void mainImage( out vec4 fragColor, in vec2 fragCoord )
{
    fragColor = vec4(0.0,0.0,1.0,1.0);
}";

/// Shader used by the starter graph
pub const INITIAL_SHADER_SOURCE: &str = r"void mainImage( out vec4 fragColor, in vec2 fragCoord )
{
    // Normalized pixel coordinates (from 0 to 1)
    vec2 uv = fragCoord/iResolution.xy;

    // Time varying pixel color
    vec3 col = 0.5 + 0.5*cos(iTime+uv.xyx+vec3(0,2,4));

    // Output to screen
    fragColor = vec4(col,1.0);
}
";

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContentType {
    /// A 2D image
    #[default]
    Image,
    /// Six faces of a cubemap
    CubeMap,
    /// Reserved; no node produces sound and the compiler rejects it
    Sound,
}

/// Shader pass payload
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderNode {
    /// ShaderToy-style GLSL defining `mainImage`
    pub source: String,
}

impl Default for ShaderNode {
    fn default() -> Self {
        Self {
            source: DEFAULT_SHADER_SOURCE.to_string(),
        }
    }
}

/// Static 2D texture payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureNode {
    /// Pixel data; `None` until the user picks an image
    pub image: Option<ImageData>,
    /// Whether the image was flipped vertically on load
    pub flip_y: bool,
    /// Backend texture created from `image`
    pub resident: Option<TextureObject>,
}

/// Static cubemap payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CubeMapNode {
    /// Face data; `None` until assigned
    pub faces: Option<CubeMapData>,
    /// Backend cube texture created from `faces`
    pub resident: Option<TextureObject>,
}

/// Feedback payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastFrameNode {
    /// Shader whose previous frame this node exposes. Weak: the graph nulls it
    /// when the shader is removed.
    pub target: Option<NodeId>,
}

/// Closed set of node classes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeClass {
    /// Final presentation surface
    RenderOutput,
    /// GLSL render pass
    Shader(ShaderNode),
    /// Static 2D texture
    Texture(TextureNode),
    /// Static cubemap
    CubeMap(CubeMapNode),
    /// ShaderToy keyboard state texture
    Keyboard,
    /// Previous frame of another shader
    LastFrame(LastFrameNode),
}

impl NodeClass {
    /// Base name used when generating unique node names
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::RenderOutput => "RenderOutput",
            Self::Shader(_) => "Shader",
            Self::Texture(_) => "Texture",
            Self::CubeMap(_) => "CubeMap",
            Self::Keyboard => "Keyboard",
            Self::LastFrame(_) => "LastFrame",
        }
    }

    /// Content type a node of this class starts with
    pub fn default_content_type(&self) -> ContentType {
        match self {
            Self::CubeMap(_) => ContentType::CubeMap,
            Self::RenderOutput
            | Self::Shader(_)
            | Self::Texture(_)
            | Self::Keyboard
            | Self::LastFrame(_) => ContentType::Image,
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Display name, unique within the graph
    pub name: String,
    /// Class and class-specific payload
    pub class: NodeClass,
    /// What the node produces
    pub content_type: ContentType,
    /// Input pins, indexed by channel slot
    pub inputs: Vec<Pin>,
    /// Output pins
    pub outputs: Vec<Pin>,
}

impl Node {
    /// Create a node with the pin layout of its class
    pub fn new(name: impl Into<String>, class: NodeClass) -> Self {
        let id = NodeId::new();
        let content_type = class.default_content_type();
        let inputs = match class {
            NodeClass::Shader(_) => (0..CHANNEL_COUNT)
                .map(|slot| Pin::input(id, format!("Channel{slot}")))
                .collect(),
            NodeClass::RenderOutput => vec![Pin::input(id, "Input")],
            NodeClass::Texture(_)
            | NodeClass::CubeMap(_)
            | NodeClass::Keyboard
            | NodeClass::LastFrame(_) => Vec::new(),
        };
        let outputs = match class {
            NodeClass::RenderOutput => Vec::new(),
            _ => vec![Pin::output(id, "Output", content_type)],
        };
        Self {
            id,
            name: name.into(),
            class,
            content_type,
            inputs,
            outputs,
        }
    }

    /// Get an input pin by slot
    pub fn input(&self, slot: usize) -> Option<&Pin> {
        self.inputs.get(slot)
    }

    /// Get an output pin by index
    pub fn output(&self, index: usize) -> Option<&Pin> {
        self.outputs.get(index)
    }

    /// Get a pin by ID
    pub fn pin(&self, pin_id: PinId) -> Option<&Pin> {
        self.pins().find(|p| p.id == pin_id)
    }

    /// Channel slot of an input pin
    pub fn input_slot(&self, pin_id: PinId) -> Option<u32> {
        self.inputs
            .iter()
            .position(|p| p.id == pin_id)
            .and_then(|slot| u32::try_from(slot).ok())
    }

    /// Get all pins, inputs first
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Whether this is a shader pass
    pub fn is_shader(&self) -> bool {
        matches!(self.class, NodeClass::Shader(_))
    }

    /// Whether this is the render output
    pub fn is_render_output(&self) -> bool {
        matches!(self.class, NodeClass::RenderOutput)
    }

    /// Shader payload, if this is a shader
    pub fn shader(&self) -> Option<&ShaderNode> {
        match &self.class {
            NodeClass::Shader(shader) => Some(shader),
            _ => None,
        }
    }

    /// Feedback target, if this is a `LastFrame` node with one set
    pub fn last_frame_target(&self) -> Option<NodeId> {
        match &self.class {
            NodeClass::LastFrame(last_frame) => last_frame.target,
            _ => None,
        }
    }
}
