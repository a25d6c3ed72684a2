// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render target planning and allocation.

use crate::backend::{DoubleBuffered, FrameBufferId, PipelineBackend};
use crate::compiler::{BuildError, FeedbackIssue};
use crate::graph::Graph;
use crate::node::{ContentType, NodeClass, NodeId};
use crate::schedule::Schedule;
use crate::texture::CUBE_FACE_COUNT;
use indexmap::{IndexMap, IndexSet};

/// How many copies of a shader's output exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Buffering {
    /// Draws straight to the surface
    None,
    /// One target
    Single,
    /// Two targets alternated each frame, for feedback reads
    Double,
}

impl Buffering {
    /// Logical resources backing this buffering mode
    pub fn copies(self) -> usize {
        match self {
            Self::None => 0,
            Self::Single => 1,
            Self::Double => 2,
        }
    }
}

/// Planned render targets of one shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetShape {
    /// Number of copies
    pub buffering: Buffering,
    /// Image or cubemap
    pub content_type: ContentType,
}

impl TargetShape {
    /// Faces per logical resource
    pub fn face_count(&self) -> usize {
        match self.content_type {
            ContentType::CubeMap => CUBE_FACE_COUNT,
            ContentType::Image | ContentType::Sound => 1,
        }
    }

    /// Backend targets this shape allocates
    pub fn frame_buffer_count(&self) -> usize {
        self.face_count() * self.buffering.copies()
    }
}

/// Render targets of every scheduled shader
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferPlan {
    shapes: IndexMap<NodeId, TargetShape>,
}

impl BufferPlan {
    /// Decide buffering for every shader in `schedule`.
    ///
    /// A shader is double-buffered when any `LastFrame` node in the graph
    /// reads it, unbuffered when it draws to the surface and single-buffered
    /// otherwise. Only scheduled feedback references are validated here.
    pub fn plan(graph: &Graph, schedule: &Schedule) -> Result<Self, BuildError> {
        let direct = schedule.direct_render_node();

        for id in schedule.order() {
            let node = graph.node(*id).ok_or(BuildError::MissingNode(*id))?;
            if !matches!(node.class, NodeClass::LastFrame(_)) {
                continue;
            }
            let invalid = |reason| BuildError::InvalidFeedbackReference {
                node: node.name.clone(),
                reason,
            };
            let target = node.last_frame_target().ok_or_else(|| invalid(FeedbackIssue::Unset))?;
            if !graph.node(target).is_some_and(|t| t.is_shader()) {
                return Err(invalid(FeedbackIssue::Dangling));
            }
            if target == direct {
                return Err(invalid(FeedbackIssue::ReadsSurface));
            }
            if !schedule.contains(target) {
                return Err(invalid(FeedbackIssue::Unscheduled));
            }
        }

        // Unconnected LastFrames still keep their target alive as a weak root.
        let double_buffered: IndexSet<NodeId> = graph
            .nodes()
            .filter_map(|node| node.last_frame_target())
            .filter(|target| *target != direct && schedule.contains(*target))
            .collect();

        let mut shapes = IndexMap::new();
        for id in schedule.order() {
            let node = graph.node(*id).ok_or(BuildError::MissingNode(*id))?;
            if !node.is_shader() {
                continue;
            }
            if node.content_type == ContentType::Sound {
                return Err(BuildError::Unsupported {
                    node: node.name.clone(),
                    what: "sound output",
                });
            }
            let buffering = if *id == direct {
                Buffering::None
            } else if double_buffered.contains(id) {
                Buffering::Double
            } else {
                Buffering::Single
            };
            tracing::debug!(node = %node.name, ?buffering, "Planned render target");
            shapes.insert(
                *id,
                TargetShape {
                    buffering,
                    content_type: node.content_type,
                },
            );
        }

        Ok(Self { shapes })
    }

    /// Shape planned for a shader
    pub fn shape(&self, node: NodeId) -> Option<TargetShape> {
        self.shapes.get(&node).copied()
    }

    /// Buffering planned for a shader; `None` for anything unplanned
    pub fn buffering(&self, node: NodeId) -> Buffering {
        self.shape(node).map_or(Buffering::None, |s| s.buffering)
    }

    /// Backend targets the whole plan allocates
    pub fn frame_buffer_count(&self) -> usize {
        self.shapes.values().map(TargetShape::frame_buffer_count).sum()
    }

    /// Create the planned targets on `backend`, one entry per face
    pub fn allocate<B: PipelineBackend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> IndexMap<NodeId, Vec<DoubleBuffered<FrameBufferId>>> {
        self.shapes
            .iter()
            .map(|(id, shape)| (*id, allocate_shape(*shape, backend)))
            .collect()
    }
}

fn allocate_shape<B: PipelineBackend + ?Sized>(
    shape: TargetShape,
    backend: &mut B,
) -> Vec<DoubleBuffered<FrameBufferId>> {
    match (shape.buffering, shape.content_type) {
        (Buffering::None, _) | (_, ContentType::Sound) => Vec::new(),
        (Buffering::Single, ContentType::Image) => {
            vec![DoubleBuffered::single(backend.create_frame_buffer())]
        }
        (Buffering::Double, ContentType::Image) => {
            let front = backend.create_frame_buffer();
            let back = backend.create_frame_buffer();
            vec![DoubleBuffered::new(front, back)]
        }
        (Buffering::Single, ContentType::CubeMap) => backend
            .create_cube_map_frame_buffer()
            .into_iter()
            .map(DoubleBuffered::single)
            .collect(),
        (Buffering::Double, ContentType::CubeMap) => {
            let front = backend.create_cube_map_frame_buffer();
            let back = backend.create_cube_map_frame_buffer();
            front
                .into_iter()
                .zip(back)
                .map(|(front, back)| DoubleBuffered::new(front, back))
                .collect()
        }
    }
}
