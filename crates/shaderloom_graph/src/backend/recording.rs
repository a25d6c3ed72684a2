// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory backend that records what the compiler asks for.
//!
//! Used by the headless CLI and by tests. Rendering a frame does not shade
//! anything; it advances every double-buffered resource exactly like a GPU
//! backend would and records which targets each pass wrote and which
//! textures it read.

use std::collections::HashMap;

use super::{
    BackendError, DoubleBuffered, DynamicTextureUpdate, FrameBufferId, FrameUniforms,
    PassDescriptor, PipelineBackend, TextureId, TextureLoader, TextureObject,
};
use crate::texture::{CubeMapData, ImageData, CUBE_FACE_COUNT};

/// First id handed out by [`RecordingTextureLoader`], keeping static
/// textures apart from pipeline-owned ones.
const STATIC_TEXTURE_BASE: u64 = 1 << 32;

/// What one pass touched during a rendered frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassTrace {
    /// Pass name
    pub name: String,
    /// Targets written, one per face
    pub writes: Vec<FrameBufferId>,
    /// Textures sampled, by channel slot
    pub reads: Vec<(u32, TextureId)>,
}

struct DynamicTexture {
    id: TextureId,
    texels: Vec<u32>,
    update: DynamicTextureUpdate,
}

/// A [`PipelineBackend`] that keeps everything in memory
#[derive(Default)]
pub struct RecordingBackend {
    next_id: u64,
    frame_buffers: HashMap<FrameBufferId, TextureId>,
    cube_map_count: usize,
    dynamic_textures: Vec<DynamicTexture>,
    passes: Vec<PassDescriptor>,
    fail_marker: Option<String>,
    frames_rendered: u64,
    last_frame: Vec<PassTrace>,
    last_uniforms: Option<FrameUniforms>,
}

impl RecordingBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any pass whose source contains `marker`, as a compiler would
    /// reject a syntax error.
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    /// Passes added so far, in execution order
    pub fn passes(&self) -> &[PassDescriptor] {
        &self.passes
    }

    /// Find a pass by name
    pub fn pass(&self, name: &str) -> Option<&PassDescriptor> {
        self.passes.iter().find(|p| p.name == name)
    }

    /// Number of render targets created, counting each cube face
    pub fn frame_buffer_count(&self) -> usize {
        self.frame_buffers.len()
    }

    /// Number of cube render targets created
    pub fn cube_map_count(&self) -> usize {
        self.cube_map_count
    }

    /// Number of dynamic textures created
    pub fn dynamic_texture_count(&self) -> usize {
        self.dynamic_textures.len()
    }

    /// Current texels of a dynamic texture
    pub fn dynamic_texture(&self, id: TextureId) -> Option<&[u32]> {
        self.dynamic_textures
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.texels.as_slice())
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Per-pass trace of the most recent frame
    pub fn last_frame(&self) -> &[PassTrace] {
        &self.last_frame
    }

    /// Uniforms of the most recent frame
    pub fn last_uniforms(&self) -> Option<&FrameUniforms> {
        self.last_uniforms.as_ref()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl std::fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("frame_buffers", &self.frame_buffers.len())
            .field("dynamic_textures", &self.dynamic_textures.len())
            .field("passes", &self.passes.len())
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}

impl PipelineBackend for RecordingBackend {
    fn create_frame_buffer(&mut self) -> FrameBufferId {
        let frame_buffer = FrameBufferId(self.allocate_id());
        let texture = TextureId(self.allocate_id());
        self.frame_buffers.insert(frame_buffer, texture);
        frame_buffer
    }

    fn create_cube_map_frame_buffer(&mut self) -> [FrameBufferId; CUBE_FACE_COUNT] {
        let texture = TextureId(self.allocate_id());
        let mut faces = [FrameBufferId(0); CUBE_FACE_COUNT];
        for face in &mut faces {
            *face = FrameBufferId(self.allocate_id());
            self.frame_buffers.insert(*face, texture);
        }
        self.cube_map_count += 1;
        faces
    }

    fn frame_buffer_texture(&self, frame_buffer: FrameBufferId) -> TextureId {
        // Unknown targets map to the null texture, like an unbound GL name.
        self.frame_buffers
            .get(&frame_buffer)
            .copied()
            .unwrap_or(TextureId(0))
    }

    fn create_dynamic_texture(
        &mut self,
        width: u32,
        height: u32,
        update: DynamicTextureUpdate,
    ) -> TextureId {
        let id = TextureId(self.allocate_id());
        self.dynamic_textures.push(DynamicTexture {
            id,
            texels: vec![0; width as usize * height as usize],
            update,
        });
        id
    }

    fn add_pass(&mut self, pass: PassDescriptor) -> Result<(), BackendError> {
        if let Some(marker) = &self.fail_marker {
            if pass.source.contains(marker.as_str()) {
                return Err(BackendError::Compile(format!(
                    "'{marker}' is not a valid token"
                )));
            }
        }
        self.passes.push(pass);
        Ok(())
    }

    fn render(&mut self, uniforms: &FrameUniforms) {
        for texture in &mut self.dynamic_textures {
            (texture.update)(&mut texture.texels);
        }

        self.last_frame = self
            .passes
            .iter_mut()
            .map(|pass| PassTrace {
                name: pass.name.clone(),
                writes: pass.targets.iter_mut().map(DoubleBuffered::advance).collect(),
                reads: pass
                    .channels
                    .iter_mut()
                    .map(|channel| (channel.slot, channel.texture.advance()))
                    .collect(),
            })
            .collect();
        self.frames_rendered += 1;
        self.last_uniforms = Some(*uniforms);
    }
}

/// A [`TextureLoader`] that hands out ids without uploading anything
#[derive(Debug)]
pub struct RecordingTextureLoader {
    next_id: u64,
    loaded: usize,
}

impl RecordingTextureLoader {
    /// Create a loader
    pub fn new() -> Self {
        Self {
            next_id: STATIC_TEXTURE_BASE,
            loaded: 0,
        }
    }

    /// Number of textures uploaded
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    fn allocate(&mut self, size: [u32; 2]) -> TextureObject {
        self.next_id += 1;
        self.loaded += 1;
        TextureObject {
            id: TextureId(self.next_id),
            size,
        }
    }
}

impl Default for RecordingTextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLoader for RecordingTextureLoader {
    fn load_texture(&mut self, image: &ImageData) -> Result<TextureObject, BackendError> {
        if image.width == 0 || image.height == 0 {
            return Err(BackendError::Resource("empty image".to_string()));
        }
        Ok(self.allocate(image.size()))
    }

    fn load_cube_map(&mut self, cube_map: &CubeMapData) -> Result<TextureObject, BackendError> {
        let size = cube_map.size();
        if size == 0 {
            return Err(BackendError::Resource("empty cubemap".to_string()));
        }
        Ok(self.allocate([size, size]))
    }
}
