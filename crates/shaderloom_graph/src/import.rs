// SPDX-License-Identifier: MIT OR Apache-2.0
//! Import of shaders exported by the ShaderToy API.
//!
//! Accepts the JSON returned for a single shader (either the bare
//! `[{ "info": .., "renderpass": [..] }]` array or the `{ "Shader": .. }`
//! object) and builds a fresh graph. Texture files are fetched through a
//! caller-supplied closure so the importer never touches the network.

use std::fmt;
use std::io;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::graph::{ConnectionError, Graph, GraphError};
use crate::link::{Filter, Wrap};
use crate::node::{ContentType, NodeId, CHANNEL_COUNT};
use crate::pin::PinId;
use crate::texture::{ImageData, TextureError};

/// Errors importing a ShaderToy export
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document holds no shader
    #[error("No shader found in the document")]
    Empty,

    /// A pass type the pipeline cannot express
    #[error("Unsupported pass type {0}")]
    UnsupportedPass(String),

    /// A buffer input names no known pass output
    #[error("{pass} reads unknown buffer {id}")]
    UnknownBuffer {
        /// Consuming pass
        pass: String,
        /// Referenced output id
        id: String,
    },

    /// Input channel outside 0-3
    #[error("{pass} uses channel {channel}")]
    InvalidChannel {
        /// Consuming pass
        pass: String,
        /// Requested channel
        channel: u32,
    },

    /// A texture could not be fetched
    #[error("Failed to fetch {path}: {source}")]
    Fetch {
        /// Path as given by the export
        path: String,
        /// Underlying failure
        source: io::Error,
    },

    /// A fetched texture is not a valid image
    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    /// The graph rejected a link
    #[error("Link error: {0}")]
    Link(#[from] ConnectionError),

    /// The graph rejected an edit
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Result of an import
#[derive(Debug, Clone)]
pub struct ShaderToyImport {
    /// The imported pipeline
    pub graph: Graph,
    /// Shader info (`id`, `name`, `username`, `description`)
    pub metadata: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    List(Vec<ShaderEntry>),
    Wrapped {
        #[serde(rename = "Shader")]
        shader: ShaderEntry,
    },
    Single(ShaderEntry),
}

#[derive(Debug, Deserialize)]
struct ShaderEntry {
    #[serde(default)]
    info: IndexMap<String, serde_json::Value>,
    renderpass: Vec<RenderPass>,
}

#[derive(Debug, Deserialize)]
struct RenderPass {
    #[serde(default)]
    inputs: Vec<PassInput>,
    #[serde(default)]
    outputs: Vec<PassOutput>,
    #[serde(default)]
    code: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct PassInput {
    id: ApiId,
    #[serde(default)]
    filepath: String,
    #[serde(rename = "type")]
    kind: String,
    channel: u32,
    #[serde(default)]
    sampler: Option<Sampler>,
}

#[derive(Debug, Deserialize)]
struct PassOutput {
    id: ApiId,
}

#[derive(Debug, Default, Deserialize)]
struct Sampler {
    #[serde(default)]
    filter: String,
    #[serde(default)]
    wrap: String,
    #[serde(default)]
    vflip: String,
}

/// Ids are strings in current exports and integers in older ones
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum ApiId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Sort key of a pass: the last letter of its name (`Buffer A` → `A`).
/// Buffers only read lower-keyed buffers directly; anything else is the
/// previous frame.
fn pass_order(name: &str) -> Option<char> {
    name.chars().last().map(|c| c.to_ascii_uppercase())
}

fn parse_filter(value: &str) -> Option<Filter> {
    match value {
        "linear" => Some(Filter::Linear),
        "nearest" => Some(Filter::Nearest),
        "mipmap" => Some(Filter::Mipmap),
        _ => None,
    }
}

fn parse_wrap(value: &str) -> Option<Wrap> {
    match value {
        "clamp" => Some(Wrap::Clamp),
        "repeat" => Some(Wrap::Repeat),
        _ => None,
    }
}

/// Import a ShaderToy export.
///
/// `fetch` resolves a texture `filepath` (such as `/media/a/xxx.png`) to
/// the file's bytes.
pub fn import_shadertoy(
    json: &str,
    mut fetch: impl FnMut(&str) -> io::Result<Vec<u8>>,
) -> Result<ShaderToyImport, ImportError> {
    let entry = match serde_json::from_str::<Document>(json)? {
        Document::List(entries) => entries.into_iter().next().ok_or(ImportError::Empty)?,
        Document::Wrapped { shader } | Document::Single(shader) => shader,
    };

    let metadata = entry
        .info
        .iter()
        .filter(|(key, _)| matches!(key.as_str(), "id" | "name" | "username" | "description"))
        .map(|(key, value)| {
            let value = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string);
            (key.clone(), value)
        })
        .collect();

    let mut importer = Importer::default();
    let output = importer.graph.spawn_render_output()?;

    let mut common = String::new();
    let mut passes = Vec::new();
    for (index, pass) in entry.renderpass.iter().enumerate() {
        let content_type = match pass.kind.as_str() {
            "common" => {
                common = format!("{}\n", pass.code);
                continue;
            }
            "image" | "buffer" => ContentType::Image,
            "cubemap" => ContentType::CubeMap,
            other => {
                tracing::error!("Unsupported pass type {other}");
                return Err(ImportError::UnsupportedPass(other.to_string()));
            }
        };

        let requested = if pass.name.is_empty() {
            pass.kind.as_str()
        } else {
            pass.name.as_str()
        };
        let name = importer.graph.generate_unique_name(requested);
        let node = importer.graph.spawn_shader(pass.code.clone());
        importer.graph.rename_node(node, &name)?;
        importer.graph.set_shader_content_type(node, content_type)?;

        let key = pass
            .outputs
            .first()
            .map_or_else(|| format!("tmp{index}"), |o| o.id.to_string());
        importer.shaders.insert(key, node);
        passes.push((pass, node, name));
    }

    if !common.is_empty() {
        for (pass, node, _) in &passes {
            importer
                .graph
                .set_shader_source(*node, format!("{common}{}", pass.code))?;
        }
    }

    for (pass, node, name) in &passes {
        for input in &pass.inputs {
            if input.channel as usize >= CHANNEL_COUNT {
                return Err(ImportError::InvalidChannel {
                    pass: name.clone(),
                    channel: input.channel,
                });
            }
            let source = match input.kind.as_str() {
                "keyboard" => importer.keyboard(),
                "texture" => importer.texture(input, &mut fetch)?,
                // Buffers and cube passes are linked once every pass exists.
                "buffer" | "cubemap" => continue,
                other => {
                    tracing::warn!(pass = %name, "Unsupported input type {other}");
                    continue;
                }
            };
            importer.link(source, *node, input)?;
        }
        if pass.kind == "image" {
            let from = importer.output_pin(*node)?;
            let to = importer.input_pin(output, 0)?;
            importer.graph.connect(from, to)?;
        }
    }

    for (pass, node, name) in &passes {
        let consumer_order = pass_order(name);
        for input in pass
            .inputs
            .iter()
            .filter(|i| matches!(i.kind.as_str(), "buffer" | "cubemap"))
        {
            let key = input.id.to_string();
            let Some(producer) = importer.shaders.get(&key).copied() else {
                if input.kind == "cubemap" {
                    // Static cubemap assets are not downloaded.
                    tracing::warn!(pass = %name, "Unsupported cubemap asset {key}");
                    continue;
                }
                return Err(ImportError::UnknownBuffer {
                    pass: name.clone(),
                    id: key,
                });
            };
            let producer_name = importer
                .graph
                .node(producer)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            let source = if pass_order(&producer_name) < consumer_order {
                producer
            } else {
                importer.last_frame(producer)?
            };
            importer.link(source, *node, input)?;
        }
    }

    tracing::info!(
        passes = passes.len(),
        nodes = importer.graph.node_count(),
        "Imported ShaderToy shader"
    );
    Ok(ShaderToyImport {
        graph: importer.graph,
        metadata,
    })
}

#[derive(Default)]
struct Importer {
    graph: Graph,
    shaders: IndexMap<String, NodeId>,
    keyboard: Option<NodeId>,
    textures: IndexMap<String, NodeId>,
    last_frames: IndexMap<NodeId, NodeId>,
}

impl Importer {
    fn keyboard(&mut self) -> NodeId {
        match self.keyboard {
            Some(id) => id,
            None => {
                let id = self.graph.spawn_keyboard();
                self.keyboard = Some(id);
                id
            }
        }
    }

    fn texture(
        &mut self,
        input: &PassInput,
        fetch: &mut impl FnMut(&str) -> io::Result<Vec<u8>>,
    ) -> Result<NodeId, ImportError> {
        let key = input.id.to_string();
        if let Some(id) = self.textures.get(&key) {
            return Ok(*id);
        }
        tracing::info!("Downloading texture {}", input.filepath);
        let bytes = fetch(&input.filepath).map_err(|source| ImportError::Fetch {
            path: input.filepath.clone(),
            source,
        })?;
        let mut image = ImageData::decode(&bytes)?;
        let flip_y = input.sampler.as_ref().is_some_and(|s| s.vflip == "true");
        if flip_y {
            image.flip_vertical();
        }
        let id = self.graph.spawn_texture(Some(image), flip_y);
        self.textures.insert(key, id);
        Ok(id)
    }

    fn last_frame(&mut self, shader: NodeId) -> Result<NodeId, ImportError> {
        if let Some(id) = self.last_frames.get(&shader) {
            return Ok(*id);
        }
        let id = self.graph.spawn_last_frame(Some(shader))?;
        self.last_frames.insert(shader, id);
        Ok(id)
    }

    fn link(&mut self, source: NodeId, consumer: NodeId, input: &PassInput) -> Result<(), ImportError> {
        let from = self.output_pin(source)?;
        let to = self.input_pin(consumer, input.channel as usize)?;
        let sampler = input.sampler.as_ref();
        let filter = sampler.map_or(Some(Filter::default()), |s| parse_filter(&s.filter));
        let wrap = sampler.map_or(Some(Wrap::default()), |s| parse_wrap(&s.wrap));
        if filter.is_none() || wrap.is_none() {
            tracing::warn!(?sampler, "Unsupported sampler settings, using defaults");
        }
        self.graph.connect_with_sampling(
            from,
            to,
            filter.unwrap_or_default(),
            wrap.unwrap_or_default(),
        )?;
        Ok(())
    }

    fn output_pin(&self, node: NodeId) -> Result<PinId, ImportError> {
        self.graph
            .node(node)
            .and_then(|n| n.output(0))
            .map(|p| p.id)
            .ok_or(ImportError::Graph(GraphError::NodeNotFound(node)))
    }

    fn input_pin(&self, node: NodeId, slot: usize) -> Result<PinId, ImportError> {
        self.graph
            .node(node)
            .and_then(|n| n.input(slot))
            .map(|p| p.id)
            .ok_or(ImportError::Graph(GraphError::NodeNotFound(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeClass;

    fn no_fetch(path: &str) -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    const MULTIPASS: &str = r#"[{
        "info": { "id": "abc123", "name": "Trails", "username": "someone", "views": 10 },
        "renderpass": [
            { "type": "common", "name": "Common", "code": "float k = 1.0;", "inputs": [], "outputs": [] },
            {
                "type": "buffer", "name": "Buffer A", "code": "// a",
                "inputs": [
                    { "id": "4dXGR8", "type": "buffer", "channel": 0,
                      "sampler": { "filter": "linear", "wrap": "clamp", "vflip": "true" } },
                    { "id": 33, "type": "keyboard", "channel": 1,
                      "sampler": { "filter": "nearest", "wrap": "clamp", "vflip": "true" } }
                ],
                "outputs": [ { "id": "4dXGR8", "channel": 0 } ]
            },
            {
                "type": "buffer", "name": "Buffer B", "code": "// b",
                "inputs": [
                    { "id": "4dXGR8", "type": "buffer", "channel": 0,
                      "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" } },
                    { "id": "XsXGR8", "type": "buffer", "channel": 1,
                      "sampler": { "filter": "linear", "wrap": "clamp", "vflip": "true" } }
                ],
                "outputs": [ { "id": "XsXGR8", "channel": 0 } ]
            },
            {
                "type": "image", "name": "Image", "code": "// image",
                "inputs": [
                    { "id": "XsXGR8", "type": "buffer", "channel": 0,
                      "sampler": { "filter": "linear", "wrap": "clamp", "vflip": "true" } },
                    { "id": 33, "type": "keyboard", "channel": 1,
                      "sampler": { "filter": "nearest", "wrap": "clamp", "vflip": "true" } },
                    { "id": 17, "type": "music", "channel": 2 }
                ],
                "outputs": [ { "id": "4sXGR8", "channel": 0 } ]
            }
        ]
    }]"#;

    fn link_source(graph: &Graph, consumer: &str, slot: usize) -> String {
        let node = graph.node_by_name(consumer).unwrap();
        let pin = node.inputs[slot].id;
        let link = graph.links().find(|l| l.to_pin == pin).unwrap();
        graph.node(link.from_node).unwrap().name.clone()
    }

    #[test]
    fn test_multipass_shader_becomes_a_pipeline() {
        let import = import_shadertoy(MULTIPASS, no_fetch).unwrap();
        let graph = &import.graph;

        assert_eq!(import.metadata["name"], "Trails");
        assert_eq!(import.metadata["username"], "someone");
        assert!(!import.metadata.contains_key("views"));

        let image = graph.node_by_name("Image").unwrap();
        assert_eq!(graph.direct_render_node(), Some(image.id));
        assert!(image.shader().unwrap().source.starts_with("float k = 1.0;\n"));

        // A reads itself through the previous frame, B reads A directly and
        // itself through the previous frame, Image reads B directly.
        assert_eq!(link_source(graph, "Buffer A", 0), "LastFrame");
        assert_eq!(link_source(graph, "Buffer B", 0), "Buffer A");
        assert_eq!(link_source(graph, "Buffer B", 1), "LastFrame1");
        assert_eq!(link_source(graph, "Image", 0), "Buffer B");
        assert_eq!(link_source(graph, "Image", 1), "Keyboard");
        assert_eq!(link_source(graph, "Buffer A", 1), "Keyboard");

        let keyboards = graph
            .nodes()
            .filter(|n| matches!(n.class, NodeClass::Keyboard))
            .count();
        assert_eq!(keyboards, 1);
        // The music input is skipped.
        assert_eq!(graph.link_count(), 7);
    }

    #[test]
    fn test_sampler_strings_map_to_link_sampling() {
        let import = import_shadertoy(MULTIPASS, no_fetch).unwrap();
        let graph = &import.graph;
        let b = graph.node_by_name("Buffer B").unwrap();
        let link = graph.links().find(|l| l.to_pin == b.inputs[0].id).unwrap();
        assert_eq!(link.filter, Filter::Mipmap);
        assert_eq!(link.wrap, Wrap::Repeat);
    }

    #[test]
    fn test_textures_are_fetched_once_and_flipped() {
        let png = ImageData::new(1, 2, vec![0xff00_00ff, 0xffff_0000])
            .unwrap()
            .encode_png()
            .unwrap();
        let json = r#"{ "Shader": { "renderpass": [ {
            "type": "image", "name": "", "code": "",
            "inputs": [
                { "id": "t1", "filepath": "/media/a/noise.png", "type": "texture", "channel": 0,
                  "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" } },
                { "id": "t1", "filepath": "/media/a/noise.png", "type": "texture", "channel": 3,
                  "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" } }
            ],
            "outputs": []
        } ] } }"#;

        let mut fetched = Vec::new();
        let import = import_shadertoy(json, |path| {
            fetched.push(path.to_string());
            Ok(png.clone())
        })
        .unwrap();
        assert_eq!(fetched, vec!["/media/a/noise.png"]);

        let graph = &import.graph;
        assert!(graph.node_by_name("image").is_some());
        let texture = graph.node_by_name("Texture").unwrap();
        let NodeClass::Texture(payload) = &texture.class else {
            panic!("expected a texture node");
        };
        assert!(payload.flip_y);
        assert_eq!(payload.image.as_ref().unwrap().pixels, vec![0xffff_0000, 0xff00_00ff]);
        assert_eq!(graph.links_to_node(graph.node_by_name("image").unwrap().id).count(), 2);
    }

    #[test]
    fn test_cube_pass_feeds_the_image() {
        let json = r#"[{ "renderpass": [
            {
                "type": "cubemap", "name": "Cube A", "code": "// cube",
                "inputs": [
                    { "id": "4sX3Rr", "type": "cubemap", "channel": 0,
                      "sampler": { "filter": "linear", "wrap": "clamp", "vflip": "false" } }
                ],
                "outputs": [ { "id": "4sX3Rr", "channel": 0 } ]
            },
            {
                "type": "image", "name": "Image", "code": "// image",
                "inputs": [
                    { "id": "4sX3Rr", "type": "cubemap", "channel": 0,
                      "sampler": { "filter": "nearest", "wrap": "clamp", "vflip": "false" } },
                    { "id": "XdX3zn", "type": "cubemap", "channel": 1,
                      "filepath": "/media/a/cube.jpg" }
                ],
                "outputs": [ { "id": "4sXGR8", "channel": 0 } ]
            }
        ] }]"#;
        let import = import_shadertoy(json, no_fetch).unwrap();
        let graph = &import.graph;

        let cube = graph.node_by_name("Cube A").unwrap();
        assert_eq!(cube.content_type, ContentType::CubeMap);
        assert_eq!(link_source(graph, "Image", 0), "Cube A");
        assert_eq!(link_source(graph, "Cube A", 0), "LastFrame");
        let image = graph.node_by_name("Image").unwrap();
        let link = graph.links().find(|l| l.to_pin == image.inputs[0].id).unwrap();
        assert_eq!(link.filter, Filter::Nearest);
        // The static cubemap asset is skipped.
        assert_eq!(graph.links_to_node(image.id).count(), 1);
    }

    #[test]
    fn test_sound_passes_are_rejected() {
        let json = r#"[{ "renderpass": [ { "type": "sound", "name": "Sound", "code": "", "inputs": [], "outputs": [] } ] }]"#;
        assert!(matches!(
            import_shadertoy(json, no_fetch),
            Err(ImportError::UnsupportedPass(kind)) if kind == "sound"
        ));
    }

    #[test]
    fn test_unknown_buffers_fail() {
        let json = r#"[{ "renderpass": [ {
            "type": "image", "name": "Image", "code": "",
            "inputs": [ { "id": "nope", "type": "buffer", "channel": 0 } ],
            "outputs": []
        } ] }]"#;
        assert!(matches!(
            import_shadertoy(json, no_fetch),
            Err(ImportError::UnknownBuffer { .. })
        ));
    }
}
