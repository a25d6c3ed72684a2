// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.

use crate::backend::{BackendError, TextureLoader};
use crate::link::{Filter, Link, LinkId, Wrap};
use crate::node::{
    ContentType, CubeMapNode, LastFrameNode, Node, NodeClass, NodeId, ShaderNode, TextureNode,
    INITIAL_SHADER_SOURCE,
};
use crate::pin::{Pin, PinId};
use crate::texture::{CubeMapData, ImageData};
use indexmap::IndexMap;

/// A pipeline graph
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Nodes in insertion order
    nodes: IndexMap<NodeId, Node>,
    /// Links between pins
    links: IndexMap<LinkId, Link>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the starter graph: a gradient shader feeding the render output
    pub fn with_initial_pipeline() -> Self {
        let mut graph = Self::new();
        graph.seed_initial_pipeline();
        graph
    }

    /// Drop everything and re-seed the starter graph
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.seed_initial_pipeline();
    }

    fn seed_initial_pipeline(&mut self) {
        let output = self.insert_node(Node::new("RenderOutput", NodeClass::RenderOutput));
        let shader = self.insert_node(Node::new(
            "Shader",
            NodeClass::Shader(ShaderNode {
                source: INITIAL_SHADER_SOURCE.to_string(),
            }),
        ));
        let from = self.nodes[&shader].outputs[0].id;
        let to = self.nodes[&output].inputs[0].id;
        let link = Link::new(shader, from, output, to);
        self.links.insert(link.id, link);
    }

    pub(crate) fn insert_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a node of any class under a fresh unique name
    pub fn spawn(&mut self, class: NodeClass) -> Result<NodeId, GraphError> {
        match &class {
            NodeClass::RenderOutput if self.render_output().is_some() => {
                return Err(GraphError::RenderOutputExists);
            }
            NodeClass::LastFrame(LastFrameNode {
                target: Some(target),
            }) => {
                self.expect_shader(*target)?;
            }
            _ => {}
        }
        let name = self.generate_unique_name(class.base_name());
        let id = self.insert_node(Node::new(name, class));
        tracing::debug!(node = ?id, "Spawned node");
        Ok(id)
    }

    /// Add a shader pass
    pub fn spawn_shader(&mut self, source: impl Into<String>) -> NodeId {
        let name = self.generate_unique_name("Shader");
        self.insert_node(Node::new(
            name,
            NodeClass::Shader(ShaderNode {
                source: source.into(),
            }),
        ))
    }

    /// Add a static texture
    pub fn spawn_texture(&mut self, image: Option<ImageData>, flip_y: bool) -> NodeId {
        let name = self.generate_unique_name("Texture");
        self.insert_node(Node::new(
            name,
            NodeClass::Texture(TextureNode {
                image,
                flip_y,
                resident: None,
            }),
        ))
    }

    /// Add a static cubemap
    pub fn spawn_cube_map(&mut self, faces: Option<CubeMapData>) -> NodeId {
        let name = self.generate_unique_name("CubeMap");
        self.insert_node(Node::new(
            name,
            NodeClass::CubeMap(CubeMapNode {
                faces,
                resident: None,
            }),
        ))
    }

    /// Add a keyboard input
    pub fn spawn_keyboard(&mut self) -> NodeId {
        let name = self.generate_unique_name("Keyboard");
        self.insert_node(Node::new(name, NodeClass::Keyboard))
    }

    /// Add a feedback node, optionally pointing at a shader
    pub fn spawn_last_frame(&mut self, target: Option<NodeId>) -> Result<NodeId, GraphError> {
        self.spawn(NodeClass::LastFrame(LastFrameNode { target }))
    }

    /// Add the render output. Only one may exist.
    pub fn spawn_render_output(&mut self) -> Result<NodeId, GraphError> {
        self.spawn(NodeClass::RenderOutput)
    }

    /// Remove a node, every link touching it and every feedback reference to it
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if node.is_render_output() {
            return Err(GraphError::CannotRemoveRenderOutput);
        }

        self.links.retain(|_, l| !l.involves_node(node_id));
        for node in self.nodes.values_mut() {
            if let NodeClass::LastFrame(last_frame) = &mut node.class {
                if last_frame.target == Some(node_id) {
                    last_frame.target = None;
                }
            }
        }
        self.nodes
            .shift_remove(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find a node by display name
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// Whether no node is called `name`
    pub fn is_unique_name(&self, name: &str) -> bool {
        self.node_by_name(name).is_none()
    }

    /// `base` if free, otherwise `base1`, `base2`, ...
    pub fn generate_unique_name(&self, base: &str) -> String {
        if self.is_unique_name(base) {
            return base.to_string();
        }
        (1u32..)
            .map(|i| format!("{base}{i}"))
            .find(|name| self.is_unique_name(name))
            .unwrap_or_else(|| base.to_string())
    }

    /// Rename a node, keeping names unique
    pub fn rename_node(&mut self, node_id: NodeId, name: &str) -> Result<(), GraphError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::EmptyName);
        }
        if let Some(existing) = self.node_by_name(name) {
            if existing.id == node_id {
                return Ok(());
            }
            return Err(GraphError::DuplicateName(name.to_string()));
        }
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.name = name.to_string();
        Ok(())
    }

    /// Find a pin anywhere in the graph
    pub fn find_pin(&self, pin_id: PinId) -> Option<&Pin> {
        self.nodes.values().find_map(|n| n.pin(pin_id))
    }

    /// Whether any link touches the pin
    pub fn is_pin_linked(&self, pin_id: PinId) -> bool {
        self.links.values().any(|l| l.involves_pin(pin_id))
    }

    /// Link two pins given in either order.
    ///
    /// The pins are normalised to output → input. New links sample with
    /// linear filtering and repeat wrapping.
    pub fn connect(&mut self, a: PinId, b: PinId) -> Result<LinkId, ConnectionError> {
        self.connect_with_sampling(a, b, Filter::default(), Wrap::default())
    }

    /// Like [`connect`](Self::connect), sampling the source with `filter`
    /// and `wrap`
    pub fn connect_with_sampling(
        &mut self,
        a: PinId,
        b: PinId,
        filter: Filter,
        wrap: Wrap,
    ) -> Result<LinkId, ConnectionError> {
        let (from, to) = self.check_connection(a, b)?;
        let link = Link::new(from.node, from.id, to.node, to.id).with_sampling(filter, wrap);
        let id = link.id;
        self.links.insert(id, link);
        Ok(id)
    }

    /// Whether [`connect`](Self::connect) would accept the pair
    pub fn can_connect(&self, a: PinId, b: PinId) -> bool {
        self.check_connection(a, b).is_ok()
    }

    fn check_connection(&self, a: PinId, b: PinId) -> Result<(&Pin, &Pin), ConnectionError> {
        if a == b {
            return Err(ConnectionError::SamePin);
        }
        let a = self.find_pin(a).ok_or(ConnectionError::PinNotFound(a))?;
        let b = self.find_pin(b).ok_or(ConnectionError::PinNotFound(b))?;
        if a.kind == b.kind {
            return Err(ConnectionError::SameKind);
        }
        let (from, to) = if a.is_input() { (b, a) } else { (a, b) };
        if from.node == to.node {
            return Err(ConnectionError::SelfLoop);
        }
        if self.links.values().any(|l| l.to_pin == to.id) {
            return Err(ConnectionError::InputAlreadyLinked(to.id));
        }
        Ok((from, to))
    }

    /// Remove a link
    pub fn disconnect(&mut self, link_id: LinkId) -> Option<Link> {
        self.links.shift_remove(&link_id)
    }

    /// Change how a link's consumer samples the source
    pub fn set_link_sampling(
        &mut self,
        link_id: LinkId,
        filter: Filter,
        wrap: Wrap,
    ) -> Result<(), GraphError> {
        let link = self
            .links
            .get_mut(&link_id)
            .ok_or(GraphError::LinkNotFound(link_id))?;
        link.filter = filter;
        link.wrap = wrap;
        Ok(())
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// Get all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Links ending at a node
    pub fn links_to_node(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.to_node == node_id)
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Insert a link without validation
    #[cfg(test)]
    pub(crate) fn insert_link_unchecked(&mut self, link: Link) -> LinkId {
        let id = link.id;
        self.links.insert(id, link);
        id
    }

    /// The render output node, if one exists
    pub fn render_output(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.is_render_output())
            .map(|n| n.id)
    }

    /// Links from a shader straight into the render output
    pub fn sink_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| {
            let into_output = self.node(l.to_node).is_some_and(Node::is_render_output);
            let from_shader = self.node(l.from_node).is_some_and(Node::is_shader);
            into_output && from_shader
        })
    }

    /// The shader drawing to the surface, when exactly one does
    pub fn direct_render_node(&self) -> Option<NodeId> {
        let mut sinks = self.sink_links();
        match (sinks.next(), sinks.next()) {
            (Some(link), None) => Some(link.from_node),
            _ => None,
        }
    }

    /// Shaders a feedback node may point at: all but the direct render node
    pub fn last_frame_candidates(&self) -> Vec<NodeId> {
        let direct = self.direct_render_node();
        self.nodes
            .values()
            .filter(|n| n.is_shader() && Some(n.id) != direct)
            .map(|n| n.id)
            .collect()
    }

    /// Point a feedback node at a shader, or clear it
    pub fn set_last_frame_target(
        &mut self,
        last_frame: NodeId,
        target: Option<NodeId>,
    ) -> Result<(), GraphError> {
        if let Some(target) = target {
            self.expect_shader(target)?;
        }
        let node = self
            .nodes
            .get_mut(&last_frame)
            .ok_or(GraphError::NodeNotFound(last_frame))?;
        match &mut node.class {
            NodeClass::LastFrame(payload) => {
                payload.target = target;
                Ok(())
            }
            _ => Err(GraphError::WrongClass {
                node: last_frame,
                expected: "LastFrame",
            }),
        }
    }

    /// Replace a shader's GLSL source
    pub fn set_shader_source(
        &mut self,
        node_id: NodeId,
        source: impl Into<String>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        match &mut node.class {
            NodeClass::Shader(shader) => {
                shader.source = source.into();
                Ok(())
            }
            _ => Err(GraphError::WrongClass {
                node: node_id,
                expected: "Shader",
            }),
        }
    }

    /// Switch a shader between rendering an image and a cubemap
    pub fn set_shader_content_type(
        &mut self,
        node_id: NodeId,
        content_type: ContentType,
    ) -> Result<(), GraphError> {
        self.expect_shader(node_id)?;
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.content_type = content_type;
        }
        Ok(())
    }

    /// Assign image data to a texture node, dropping any resident copy
    pub fn set_texture_image(
        &mut self,
        node_id: NodeId,
        image: ImageData,
        flip_y: bool,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        match &mut node.class {
            NodeClass::Texture(texture) => {
                *texture = TextureNode {
                    image: Some(image),
                    flip_y,
                    resident: None,
                };
                Ok(())
            }
            _ => Err(GraphError::WrongClass {
                node: node_id,
                expected: "Texture",
            }),
        }
    }

    /// Assign faces to a cubemap node, dropping any resident copy
    pub fn set_cube_map_faces(
        &mut self,
        node_id: NodeId,
        faces: CubeMapData,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        match &mut node.class {
            NodeClass::CubeMap(cube_map) => {
                *cube_map = CubeMapNode {
                    faces: Some(faces),
                    resident: None,
                };
                Ok(())
            }
            _ => Err(GraphError::WrongClass {
                node: node_id,
                expected: "CubeMap",
            }),
        }
    }

    /// Upload every texture and cubemap that has data but no resident copy.
    ///
    /// Returns the number of uploads.
    pub fn load_textures(&mut self, loader: &mut dyn TextureLoader) -> Result<usize, BackendError> {
        let mut uploaded = 0;
        for node in self.nodes.values_mut() {
            match &mut node.class {
                NodeClass::Texture(TextureNode {
                    image: Some(image),
                    resident: resident @ None,
                    ..
                }) => {
                    *resident = Some(loader.load_texture(image)?);
                    uploaded += 1;
                }
                NodeClass::CubeMap(CubeMapNode {
                    faces: Some(faces),
                    resident: resident @ None,
                }) => {
                    *resident = Some(loader.load_cube_map(faces)?);
                    uploaded += 1;
                }
                _ => {}
            }
        }
        Ok(uploaded)
    }

    fn expect_shader(&self, node_id: NodeId) -> Result<(), GraphError> {
        match self.nodes.get(&node_id) {
            Some(node) if node.is_shader() => Ok(()),
            Some(_) => Err(GraphError::WrongClass {
                node: node_id,
                expected: "Shader",
            }),
            None => Err(GraphError::NodeNotFound(node_id)),
        }
    }
}

/// Error when creating a link
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Pin not found
    #[error("Pin not found: {0:?}")]
    PinNotFound(PinId),

    /// Both ends are the same pin
    #[error("Cannot link a pin to itself")]
    SamePin,

    /// Both ends are inputs or both are outputs
    #[error("A link needs one input and one output")]
    SameKind,

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Input already has a source
    #[error("Input already linked: {0:?}")]
    InputAlreadyLinked(PinId),
}

/// Error from a structural edit
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Link not found
    #[error("Link not found: {0:?}")]
    LinkNotFound(LinkId),

    /// Another node already has the name
    #[error("Name already in use: {0}")]
    DuplicateName(String),

    /// Names must not be blank
    #[error("Node name cannot be empty")]
    EmptyName,

    /// A second render output was requested
    #[error("The graph already has a render output")]
    RenderOutputExists,

    /// The render output is only removed by a reset
    #[error("The render output cannot be removed")]
    CannotRemoveRenderOutput,

    /// The node has the wrong class for the operation
    #[error("Node {node:?} is not a {expected} node")]
    WrongClass {
        /// Offending node
        node: NodeId,
        /// Class the operation needs
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingTextureLoader;

    fn output_pin(graph: &Graph, node: NodeId) -> PinId {
        graph.node(node).unwrap().outputs[0].id
    }

    fn input_pin(graph: &Graph, node: NodeId, slot: usize) -> PinId {
        graph.node(node).unwrap().inputs[slot].id
    }

    #[test]
    fn test_initial_pipeline_has_direct_render_node() {
        let graph = Graph::with_initial_pipeline();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.link_count(), 1);
        let direct = graph.direct_render_node().unwrap();
        assert_eq!(graph.node(direct).unwrap().name, "Shader");
        assert!(graph.last_frame_candidates().is_empty());
    }

    #[test]
    fn test_unique_names_count_up() {
        let mut graph = Graph::with_initial_pipeline();
        let a = graph.spawn_shader("");
        let b = graph.spawn_shader("");
        assert_eq!(graph.node(a).unwrap().name, "Shader1");
        assert_eq!(graph.node(b).unwrap().name, "Shader2");
        assert_eq!(graph.generate_unique_name("Keyboard"), "Keyboard");

        assert_eq!(
            graph.rename_node(a, "Shader2"),
            Err(GraphError::DuplicateName("Shader2".to_string()))
        );
        assert_eq!(graph.rename_node(a, "  "), Err(GraphError::EmptyName));
        graph.rename_node(a, "Blur").unwrap();
        assert!(graph.node_by_name("Blur").is_some());
    }

    #[test]
    fn test_connect_normalises_direction() {
        let mut graph = Graph::new();
        let a = graph.spawn_shader("");
        let b = graph.spawn_shader("");
        let link = graph
            .connect(input_pin(&graph, b, 1), output_pin(&graph, a))
            .unwrap();
        let link = graph.link(link).unwrap();
        assert_eq!(link.from_node, a);
        assert_eq!(link.to_node, b);
        assert_eq!(link.filter, Filter::Linear);
        assert_eq!(link.wrap, Wrap::Repeat);
    }

    #[test]
    fn test_connect_rejects_invalid_pairs() {
        let mut graph = Graph::new();
        let a = graph.spawn_shader("");
        let b = graph.spawn_shader("");
        let c = graph.spawn_keyboard();

        let a_out = output_pin(&graph, a);
        let b_in = input_pin(&graph, b, 0);
        assert_eq!(graph.connect(a_out, a_out), Err(ConnectionError::SamePin));
        assert_eq!(
            graph.connect(a_out, output_pin(&graph, c)),
            Err(ConnectionError::SameKind)
        );
        assert_eq!(
            graph.connect(a_out, input_pin(&graph, a, 0)),
            Err(ConnectionError::SelfLoop)
        );
        let missing = PinId::new();
        assert_eq!(
            graph.connect(missing, b_in),
            Err(ConnectionError::PinNotFound(missing))
        );

        graph.connect(a_out, b_in).unwrap();
        assert!(!graph.can_connect(output_pin(&graph, c), b_in));
        assert_eq!(
            graph.connect(output_pin(&graph, c), b_in),
            Err(ConnectionError::InputAlreadyLinked(b_in))
        );
        // Outputs fan out freely.
        assert!(graph.can_connect(a_out, input_pin(&graph, b, 1)));
    }

    #[test]
    fn test_removing_a_shader_clears_links_and_feedback() {
        let mut graph = Graph::with_initial_pipeline();
        let shader = graph.spawn_shader("");
        let consumer = graph.spawn_shader("");
        graph
            .connect(output_pin(&graph, shader), input_pin(&graph, consumer, 0))
            .unwrap();
        let feedback = graph.spawn_last_frame(Some(shader)).unwrap();

        graph.remove_node(shader).unwrap();
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.node(feedback).unwrap().last_frame_target(), None);
    }

    #[test]
    fn test_render_output_is_unique_and_permanent() {
        let mut graph = Graph::with_initial_pipeline();
        assert_eq!(
            graph.spawn_render_output(),
            Err(GraphError::RenderOutputExists)
        );
        let output = graph.render_output().unwrap();
        assert_eq!(
            graph.remove_node(output).unwrap_err(),
            GraphError::CannotRemoveRenderOutput
        );

        graph.spawn_shader("");
        graph.reset();
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_last_frame_target_must_be_a_shader() {
        let mut graph = Graph::with_initial_pipeline();
        let keyboard = graph.spawn_keyboard();
        assert!(matches!(
            graph.spawn_last_frame(Some(keyboard)),
            Err(GraphError::WrongClass { .. })
        ));
        let feedback = graph.spawn_last_frame(None).unwrap();
        let shader = graph.spawn_shader("");
        graph.set_last_frame_target(feedback, Some(shader)).unwrap();
        assert_eq!(graph.node(feedback).unwrap().last_frame_target(), Some(shader));
        assert_eq!(graph.last_frame_candidates(), vec![shader]);
    }

    #[test]
    fn test_load_textures_uploads_once() {
        let mut graph = Graph::new();
        let texture = graph.spawn_texture(Some(ImageData::solid(8, 4, 0)), false);
        graph.spawn_texture(None, false);
        graph.spawn_cube_map(Some(CubeMapData::solid(2, 0)));

        let mut loader = RecordingTextureLoader::new();
        assert_eq!(graph.load_textures(&mut loader).unwrap(), 2);
        assert_eq!(graph.load_textures(&mut loader).unwrap(), 0);

        let NodeClass::Texture(payload) = &graph.node(texture).unwrap().class else {
            panic!("expected a texture node");
        };
        assert_eq!(payload.resident.unwrap().size, [8, 4]);
    }
}
