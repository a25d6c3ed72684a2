// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline compilation.
//!
//! A build runs type propagation, scheduling and target allocation, then
//! walks the schedule emitting one pass per shader. Every build starts from
//! a fresh backend; pipelines are never patched.

use std::fmt;
use std::time::{Duration, Instant};

use crate::allocator::BufferPlan;
use crate::backend::{
    Channel, DoubleBuffered, DynamicTextureUpdate, PassDescriptor, PipelineBackend, TextureId,
};
use crate::graph::Graph;
use crate::keyboard::{KEYBOARD_TEXTURE_HEIGHT, KEYBOARD_TEXTURE_WIDTH};
use crate::link::LinkId;
use crate::node::{ContentType, CubeMapNode, NodeClass, NodeId, TextureNode};
use crate::pin::PinId;
use crate::propagation::propagate_types;
use crate::schedule::Schedule;
use indexmap::IndexMap;

/// Produces the per-frame update for the keyboard texture a build creates
pub type KeyboardUpdateFactory = Box<dyn Fn() -> DynamicTextureUpdate>;

/// Why a feedback reference cannot be honoured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackIssue {
    /// No target selected
    Unset,
    /// Target missing or not a shader
    Dangling,
    /// Target draws to the surface and has no texture to read back
    ReadsSurface,
    /// Target does not take part in the pipeline
    Unscheduled,
}

impl fmt::Display for FeedbackIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unset => "no target selected",
            Self::Dangling => "target is not a shader",
            Self::ReadsSurface => "target renders to the screen",
            Self::Unscheduled => "target is not part of the pipeline",
        })
    }
}

/// Error during a build
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Zero or several shaders link to the render output
    #[error("Expected exactly one shader linked to the render output, found {count}")]
    AmbiguousSink {
        /// Number of direct links found
        count: usize,
    },

    /// Links form a loop that no feedback node breaks
    #[error("Loop detected")]
    Cycle,

    /// A scheduled `LastFrame` node cannot be resolved
    #[error("Invalid reference in {node}: {reason}")]
    InvalidFeedbackReference {
        /// Name of the feedback node
        node: String,
        /// What is wrong with its target
        reason: FeedbackIssue,
    },

    /// The backend rejected a shader
    #[error("Failed to compile shader {node}: {message}")]
    ShaderCompile {
        /// Name of the shader node
        node: String,
        /// Backend diagnostic
        message: String,
    },

    /// Content the pipeline cannot produce
    #[error("{node}: {what} is not supported")]
    Unsupported {
        /// Offending node
        node: String,
        /// The unsupported feature
        what: &'static str,
    },

    /// An input pin has more than one incoming link
    #[error("Input pin {pin:?} has more than one incoming link")]
    FanIn {
        /// The over-linked pin
        pin: PinId,
    },

    /// Content types never settled
    #[error("Type propagation did not settle after {passes} passes")]
    TypePropagationDiverged {
        /// Passes attempted
        passes: usize,
    },

    /// A texture or cubemap has no resident backend texture
    #[error("{node} has no texture loaded")]
    TextureNotLoaded {
        /// Name of the texture node
        node: String,
    },

    /// A channel reads a node that has no texture, such as the shader
    /// drawing to the screen
    #[error("{node} reads from {producer}, which has no texture")]
    UnresolvedChannel {
        /// Consuming shader
        node: String,
        /// Node it tries to read
        producer: String,
    },

    /// Node not found
    #[error("Node not found: {0:?}")]
    MissingNode(NodeId),

    /// A scheduled channel refers to a link the graph no longer has
    #[error("Link not found: {0:?}")]
    MissingLink(LinkId),
}

/// Texture a node exposes to downstream channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTexture {
    /// Texture to sample, per frame phase
    pub texture: DoubleBuffered<TextureId>,
    /// Image or cubemap
    pub content_type: ContentType,
    /// Declared size, when independent of the surface
    pub size: Option<[u32; 2]>,
}

/// A successfully compiled pipeline and what went into it
#[derive(Debug)]
pub struct BuildOutput<B> {
    /// The backend holding the compiled passes
    pub pipeline: B,
    /// Execution order used
    pub schedule: Schedule,
    /// Render targets planned per shader
    pub plan: BufferPlan,
    /// Texture exposed by each source node
    pub textures: IndexMap<NodeId, OutputTexture>,
    /// Passes emitted
    pub pass_count: usize,
    /// Wall-clock build time
    pub elapsed: Duration,
}

/// Compiles graphs into backend pipelines
#[derive(Default)]
pub struct PipelineCompiler {
    keyboard: Option<KeyboardUpdateFactory>,
}

impl PipelineCompiler {
    /// Create a compiler whose keyboard textures stay blank
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive keyboard textures with updates from `factory`
    pub fn with_keyboard(mut self, factory: impl Fn() -> DynamicTextureUpdate + 'static) -> Self {
        self.keyboard = Some(Box::new(factory));
        self
    }

    /// Compile `graph` into `backend`.
    ///
    /// Content types are propagated on a copy of the graph that replaces
    /// `graph` only when the build succeeds, so a failed build leaves the
    /// graph untouched.
    pub fn build<B: PipelineBackend>(
        &self,
        graph: &mut Graph,
        mut backend: B,
    ) -> Result<BuildOutput<B>, BuildError> {
        let start = Instant::now();

        let mut working = graph.clone();
        propagate_types(&mut working)?;
        let schedule = Schedule::build(&working)?;
        let plan = BufferPlan::plan(&working, &schedule)?;
        let targets = plan.allocate(&mut backend);

        let direct = schedule.direct_render_node();
        let mut textures: IndexMap<NodeId, OutputTexture> = IndexMap::new();
        // Every keyboard node samples the same texture, updated once a frame.
        let mut keyboard_texture: Option<TextureId> = None;
        let mut pass_count = 0;

        for id in schedule.order() {
            let node = working.node(*id).ok_or(BuildError::MissingNode(*id))?;
            match &node.class {
                NodeClass::RenderOutput => {}
                NodeClass::Shader(shader) => {
                    let channels = resolve_channels(&working, &schedule, &textures, *id)?;

                    let node_targets = targets.get(id).cloned().unwrap_or_default();
                    let pass = PassDescriptor {
                        name: node.name.clone(),
                        source: shader.source.clone(),
                        content_type: node.content_type,
                        targets: node_targets.clone(),
                        channels,
                        clamp_output: *id == direct,
                    };
                    backend.add_pass(pass).map_err(|e| {
                        tracing::error!("Failed to compile shader {}", node.name);
                        BuildError::ShaderCompile {
                            node: node.name.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    pass_count += 1;

                    if let Some(first) = node_targets.first() {
                        textures.insert(
                            *id,
                            OutputTexture {
                                texture: first.map(|fb| backend.frame_buffer_texture(fb)),
                                content_type: node.content_type,
                                size: None,
                            },
                        );
                    }
                }
                NodeClass::LastFrame(last_frame) => {
                    // Validated by the plan; a missing entry means the target
                    // draws to the surface.
                    let first = last_frame
                        .target
                        .and_then(|target| targets.get(&target))
                        .and_then(|faces| faces.first())
                        .ok_or_else(|| BuildError::InvalidFeedbackReference {
                            node: node.name.clone(),
                            reason: FeedbackIssue::ReadsSurface,
                        })?;
                    textures.insert(
                        *id,
                        OutputTexture {
                            texture: first.map(|fb| backend.frame_buffer_texture(fb)).flipped(),
                            content_type: node.content_type,
                            size: None,
                        },
                    );
                }
                NodeClass::Texture(TextureNode { resident, .. })
                | NodeClass::CubeMap(CubeMapNode { resident, .. }) => {
                    let resident = resident.ok_or_else(|| BuildError::TextureNotLoaded {
                        node: node.name.clone(),
                    })?;
                    textures.insert(
                        *id,
                        OutputTexture {
                            texture: DoubleBuffered::single(resident.id),
                            content_type: node.content_type,
                            size: Some(resident.size),
                        },
                    );
                }
                NodeClass::Keyboard => {
                    let texture = *keyboard_texture.get_or_insert_with(|| {
                        let update = self.keyboard.as_ref().map_or_else(
                            || Box::new(|_: &mut [u32]| {}) as DynamicTextureUpdate,
                            |f| f(),
                        );
                        backend.create_dynamic_texture(
                            KEYBOARD_TEXTURE_WIDTH,
                            KEYBOARD_TEXTURE_HEIGHT,
                            update,
                        )
                    });
                    textures.insert(
                        *id,
                        OutputTexture {
                            texture: DoubleBuffered::single(texture),
                            content_type: ContentType::Image,
                            size: Some([KEYBOARD_TEXTURE_WIDTH, KEYBOARD_TEXTURE_HEIGHT]),
                        },
                    );
                }
            }
        }

        let elapsed = start.elapsed();
        tracing::info!("Compiled in {:.1} secs", elapsed.as_secs_f64());
        *graph = working;

        Ok(BuildOutput {
            pipeline: backend,
            schedule,
            plan,
            textures,
            pass_count,
            elapsed,
        })
    }
}

/// Channels bound to `id`, one per scheduled producer
fn resolve_channels(
    graph: &Graph,
    schedule: &Schedule,
    textures: &IndexMap<NodeId, OutputTexture>,
    id: NodeId,
) -> Result<Vec<Channel>, BuildError> {
    let name = |node| graph.node(node).map_or_else(String::new, |n| n.name.clone());
    schedule
        .producers(id)
        .iter()
        .map(|producer| {
            let source = textures
                .get(&producer.node)
                .ok_or_else(|| BuildError::UnresolvedChannel {
                    node: name(id),
                    producer: name(producer.node),
                })?;
            let link = graph
                .link(producer.link)
                .ok_or(BuildError::MissingLink(producer.link))?;
            Ok(Channel {
                slot: producer.slot,
                texture: source.texture,
                content_type: source.content_type,
                filter: link.filter,
                wrap: link.wrap,
                size: source.size,
            })
        })
        .collect()
}

impl fmt::Debug for PipelineCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCompiler")
            .field("keyboard", &self.keyboard.is_some())
            .finish()
    }
}
