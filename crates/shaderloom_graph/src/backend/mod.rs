// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contract between the pipeline compiler and a rendering backend.
//!
//! The compiler decides *what* to create and in which order; a backend owns
//! the concrete render targets and textures and executes the emitted passes
//! every frame. All calls are synchronous.

pub mod recording;

use crate::link::{Filter, Wrap};
use crate::node::ContentType;
use crate::texture::{CubeMapData, ImageData, CUBE_FACE_COUNT};

/// Backend handle of a sampleable texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Backend handle of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameBufferId(pub u64);

/// A static texture resident on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureObject {
    /// Texture handle
    pub id: TextureId,
    /// Size in texels (face size for cubemaps)
    pub size: [u32; 2],
}

/// A pair of resources alternated once per frame.
///
/// [`advance`](Self::advance) swaps the pair and returns the new front, so a
/// target and the textures read from it stay in lockstep as long as each
/// copy is advanced exactly once per frame. A single-buffered value holds
/// the same resource on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoubleBuffered<T> {
    front: T,
    back: T,
}

impl<T: Copy> DoubleBuffered<T> {
    /// A double-buffered pair
    pub fn new(front: T, back: T) -> Self {
        Self { front, back }
    }

    /// A single resource used for both sides
    pub fn single(value: T) -> Self {
        Self {
            front: value,
            back: value,
        }
    }

    /// Swap the pair and return the resource to use this frame.
    pub fn advance(&mut self) -> T {
        std::mem::swap(&mut self.front, &mut self.back);
        self.front
    }

    /// Current front resource
    pub fn front(&self) -> T {
        self.front
    }

    /// Current back resource
    pub fn back(&self) -> T {
        self.back
    }

    /// The same pair in the opposite phase
    pub fn flipped(&self) -> Self {
        Self {
            front: self.back,
            back: self.front,
        }
    }

    /// Apply `f` to both sides
    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> DoubleBuffered<U> {
        DoubleBuffered {
            front: f(self.front),
            back: f(self.back),
        }
    }
}

impl<T: Copy + PartialEq> DoubleBuffered<T> {
    /// Whether the two sides are distinct resources
    pub fn is_double(&self) -> bool {
        self.front != self.back
    }
}

/// A resolved shader input channel
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Channel slot (0-3)
    pub slot: u32,
    /// Texture to sample, advanced once per frame
    pub texture: DoubleBuffered<TextureId>,
    /// Dimensionality of the source
    pub content_type: ContentType,
    /// Sampling filter
    pub filter: Filter,
    /// Wrap mode
    pub wrap: Wrap,
    /// Declared size of the source, if it has one independent of the surface
    pub size: Option<[u32; 2]>,
}

/// One render pass as handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct PassDescriptor {
    /// Name of the shader node, for diagnostics
    pub name: String,
    /// ShaderToy GLSL source
    pub source: String,
    /// Whether the pass renders an image or the six faces of a cubemap
    pub content_type: ContentType,
    /// Render targets, one per face; empty when drawing to the surface
    pub targets: Vec<DoubleBuffered<FrameBufferId>>,
    /// Bound input channels
    pub channels: Vec<Channel>,
    /// Clamp the output color to `[0, 1]`; set for the pass drawing to the surface
    pub clamp_output: bool,
}

/// Per-frame ShaderToy uniforms
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameUniforms {
    /// Surface resolution in pixels (`iResolution`)
    pub resolution: [f32; 3],
    /// Seconds since the clock started (`iTime`)
    pub time: f32,
    /// Seconds since the previous frame (`iTimeDelta`)
    pub time_delta: f32,
    /// Frames per second (`iFrameRate`)
    pub frame_rate: f32,
    /// Frame index (`iFrame`)
    pub frame: i32,
    /// Mouse position and click state (`iMouse`)
    pub mouse: [f32; 4],
    /// Year, month, day, seconds since midnight (`iDate`)
    pub date: [f32; 4],
}

/// Callback refreshing a dynamic texture's packed RGBA8 texels every frame
pub type DynamicTextureUpdate = Box<dyn FnMut(&mut [u32])>;

/// Errors reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Shader source failed to compile or link
    #[error("Shader compilation failed: {0}")]
    Compile(String),

    /// Resource creation or upload failed
    #[error("Resource error: {0}")]
    Resource(String),
}

/// A pipeline under construction and, once built, under execution.
pub trait PipelineBackend {
    /// Create a 2D render target
    fn create_frame_buffer(&mut self) -> FrameBufferId;

    /// Create the six face targets of one cube render target
    fn create_cube_map_frame_buffer(&mut self) -> [FrameBufferId; CUBE_FACE_COUNT];

    /// Texture read from a render target. Faces of one cube share a texture.
    fn frame_buffer_texture(&self, frame_buffer: FrameBufferId) -> TextureId;

    /// Create a texture whose texels `update` rewrites every frame
    fn create_dynamic_texture(
        &mut self,
        width: u32,
        height: u32,
        update: DynamicTextureUpdate,
    ) -> TextureId;

    /// Append a render pass
    fn add_pass(&mut self, pass: PassDescriptor) -> Result<(), BackendError>;

    /// Execute every pass once
    fn render(&mut self, uniforms: &FrameUniforms);
}

/// Uploads static textures. Textures outlive any one pipeline.
pub trait TextureLoader {
    /// Upload a 2D image
    fn load_texture(&mut self, image: &ImageData) -> Result<TextureObject, BackendError>;

    /// Upload a cubemap
    fn load_cube_map(&mut self, cube_map: &CubeMapData) -> Result<TextureObject, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_buffer_alternates() {
        let mut pair = DoubleBuffered::new(1, 2);
        assert!(pair.is_double());
        assert_eq!(pair.advance(), 2);
        assert_eq!(pair.advance(), 1);
        assert_eq!(pair.advance(), 2);
    }

    #[test]
    fn test_flipped_pair_reads_the_other_side() {
        let mut written = DoubleBuffered::new(10, 20);
        let mut delayed = written.flipped();
        for _ in 0..4 {
            assert_ne!(written.advance(), delayed.advance());
        }
    }

    #[test]
    fn test_single_buffer_never_changes() {
        let mut single = DoubleBuffered::single(7);
        assert!(!single.is_double());
        assert_eq!(single.advance(), 7);
        assert_eq!(single.advance(), 7);
        assert_eq!(single.map(|v| v * 2).front(), 14);
    }
}
