// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader pipeline graph for shaderloom.
//!
//! This crate turns an editable graph of GLSL passes, textures, keyboard
//! inputs and feedback nodes into an ordered list of render passes for a
//! backend to execute every frame.
//!
//! ## Architecture
//!
//! A build runs these stages over the [`Graph`]:
//! - content type propagation ([`propagation`])
//! - topological scheduling from the render output ([`schedule`])
//! - render target planning and allocation ([`allocator`])
//! - pass emission into a [`PipelineBackend`] ([`compiler`])
//!
//! Projects are stored in a JSON transmission format ([`format`]) and can
//! be imported from ShaderToy exports ([`import`]).

pub mod allocator;
pub mod backend;
pub mod compiler;
pub mod format;
pub mod graph;
pub mod import;
pub mod keyboard;
pub mod link;
pub mod node;
pub mod pin;
pub mod propagation;
pub mod schedule;
pub mod texture;

pub use allocator::{BufferPlan, Buffering};
pub use backend::{DoubleBuffered, PipelineBackend, TextureLoader};
pub use compiler::{BuildError, BuildOutput, PipelineCompiler};
pub use format::{FormatError, TransmissionFormat};
pub use graph::{ConnectionError, Graph, GraphError};
pub use import::{import_shadertoy, ImportError, ShaderToyImport};
pub use keyboard::KeyboardState;
pub use link::{Filter, Link, LinkId, Wrap};
pub use node::{ContentType, Node, NodeClass, NodeId};
pub use pin::{Pin, PinId, PinKind};
pub use schedule::Schedule;
