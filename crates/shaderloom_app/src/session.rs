// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editing session.
//!
//! A session owns the graph being edited, the pipeline last compiled from it
//! and the playback state that feeds that pipeline every frame. Builds are
//! transactional: a failed build keeps the previous pipeline running.

use indexmap::IndexMap;
use shaderloom_graph::backend::BackendError;
use shaderloom_graph::keyboard::SharedKeyboard;
use shaderloom_graph::{
    import_shadertoy, BuildError, BuildOutput, ConnectionError, FormatError, Graph, ImportError,
    KeyboardState, LinkId, PinId, PipelineBackend, PipelineCompiler, TextureLoader,
    TransmissionFormat,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::clock::Clock;
use crate::settings::SessionSettings;

/// Session operation errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Pipeline compilation failed
    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    /// A texture could not be uploaded
    #[error("Texture upload failed: {0}")]
    Texture(#[from] BackendError),

    /// Reading or writing a project failed
    #[error("Project error: {0}")]
    Format(#[from] FormatError),

    /// A ShaderToy export could not be imported
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    /// A link could not be made
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// File system failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Graph, pipeline and playback state
pub struct Session<B: PipelineBackend> {
    graph: Graph,
    metadata: IndexMap<String, String>,
    settings: SessionSettings,
    clock: Clock,
    keyboard: SharedKeyboard,
    mouse: [f32; 4],
    loader: Box<dyn TextureLoader>,
    pipeline: Option<BuildOutput<B>>,
}

impl<B: PipelineBackend + Default> Session<B> {
    /// Create a session holding the starter pipeline
    pub fn new(settings: SessionSettings, loader: Box<dyn TextureLoader>) -> Self {
        Self {
            graph: Graph::with_initial_pipeline(),
            metadata: IndexMap::new(),
            clock: Clock::new(settings.time_step),
            settings,
            keyboard: Rc::new(RefCell::new(KeyboardState::new())),
            mouse: [0.0; 4],
            loader,
            pipeline: None,
        }
    }

    /// Compile the graph into a fresh backend.
    ///
    /// On success the new pipeline replaces the running one and the clock
    /// restarts. On failure the running pipeline is kept.
    pub fn build(&mut self) -> Result<&BuildOutput<B>> {
        let compiler = if self.settings.keyboard_enabled {
            let keyboard = Rc::clone(&self.keyboard);
            PipelineCompiler::new()
                .with_keyboard(move || KeyboardState::update_callback(Rc::clone(&keyboard)))
        } else {
            PipelineCompiler::new()
        };

        let result = self
            .graph
            .load_textures(&mut *self.loader)
            .map_err(SessionError::from)
            .and_then(|uploaded| {
                if uploaded > 0 {
                    tracing::debug!("Uploaded {uploaded} textures");
                }
                compiler
                    .build(&mut self.graph, B::default())
                    .map_err(SessionError::from)
            });

        match result {
            Ok(output) => {
                self.clock.reset();
                Ok(&*self.pipeline.insert(output))
            }
            Err(e) => {
                tracing::error!("Build failed: {e}");
                Err(e)
            }
        }
    }
}

impl<B: PipelineBackend> Session<B> {
    /// Advance the clock and render one frame of the running pipeline.
    ///
    /// Returns `false` when nothing has been compiled yet.
    pub fn render_frame(&mut self) -> bool {
        self.clock.tick();
        let uniforms = self.clock.uniforms(self.settings.resolution(), self.mouse);
        match self.pipeline.as_mut() {
            Some(output) => {
                output.pipeline.render(&uniforms);
                true
            }
            None => false,
        }
    }

    /// Load a project file, replacing the graph only when it loads
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = TransmissionFormat::load(path)?;
        let graph = format.to_graph()?;
        tracing::info!(
            "Loaded {} ({} nodes, {} links)",
            path.display(),
            graph.node_count(),
            graph.link_count()
        );
        self.graph = graph;
        self.metadata = format.metadata;
        Ok(())
    }

    /// Save the graph and its metadata as a project file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut format = TransmissionFormat::from_graph(&self.graph)?;
        format.metadata = self.metadata.clone();
        format.save(path.as_ref())?;
        tracing::info!("Saved {}", path.as_ref().display());
        Ok(())
    }

    /// Import a ShaderToy export, replacing the graph only when it succeeds.
    ///
    /// Texture paths in the export (`/media/a/...`) are resolved under
    /// `media_dir`; without one, texture inputs fail to import.
    pub fn import_shadertoy(
        &mut self,
        path: impl AsRef<Path>,
        media_dir: Option<&Path>,
    ) -> Result<()> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let imported = import_shadertoy(&json, |filepath| {
            let Some(dir) = media_dir else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no media directory given",
                ));
            };
            std::fs::read(media_path(dir, filepath))
        })?;
        tracing::info!(
            "Imported {} nodes from {}",
            imported.graph.node_count(),
            path.as_ref().display()
        );
        self.graph = imported.graph;
        self.metadata = imported.metadata;
        Ok(())
    }

    /// Record a key going down
    pub fn press_key(&mut self, key_code: u8) {
        if self.settings.keyboard_enabled {
            self.keyboard.borrow_mut().press(key_code);
        }
    }

    /// Update `iMouse`. Without a click only the position is kept.
    pub fn set_mouse(&mut self, position: [f32; 2], click: Option<[f32; 2]>) {
        let [cx, cy] = click.unwrap_or([0.0, 0.0]);
        self.mouse = [position[0], position[1], cx, cy];
    }

    /// The graph being edited
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable project metadata
    pub fn metadata_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.metadata
    }

    /// The running pipeline, if any build succeeded
    pub fn pipeline(&self) -> Option<&BuildOutput<B>> {
        self.pipeline.as_ref()
    }
}

#[allow(dead_code)] // Intentionally kept for API completeness
impl<B: PipelineBackend> Session<B> {
    /// Replace the graph with the starter pipeline
    pub fn new_project(&mut self) {
        self.graph.reset();
        self.metadata.clear();
    }

    /// Link two pins with the session's default sampling
    pub fn connect(&mut self, a: PinId, b: PinId) -> Result<LinkId> {
        let defaults = self.settings.link_defaults;
        Ok(self
            .graph
            .connect_with_sampling(a, b, defaults.filter, defaults.wrap)?)
    }

    /// Record a key going up
    pub fn release_key(&mut self, key_code: u8) {
        if self.settings.keyboard_enabled {
            self.keyboard.borrow_mut().release(key_code);
        }
    }

    /// Mutable access to the graph being edited
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Project metadata
    pub fn metadata(&self) -> &IndexMap<String, String> {
        &self.metadata
    }

    /// Session settings
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Playback clock
    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl<B: PipelineBackend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.graph.node_count())
            .field("links", &self.graph.link_count())
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .field("compiled", &self.pipeline.is_some())
            .finish()
    }
}

/// Location of an export's media path under `dir`
fn media_path(dir: &Path, filepath: &str) -> PathBuf {
    dir.join(filepath.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TimeStep;
    use shaderloom_graph::backend::recording::{RecordingBackend, RecordingTextureLoader};
    use shaderloom_graph::keyboard::key_code;
    use shaderloom_graph::node::NodeClass;
    use shaderloom_graph::texture::ImageData;
    use shaderloom_graph::{Filter, NodeId, Wrap};

    fn session() -> Session<RecordingBackend> {
        let settings = SessionSettings {
            time_step: TimeStep::Fixed(0.5),
            ..SessionSettings::default()
        };
        Session::new(settings, Box::new(RecordingTextureLoader::new()))
    }

    fn shader_id(session: &Session<RecordingBackend>) -> NodeId {
        session.graph().direct_render_node().unwrap()
    }

    #[test]
    fn test_build_and_render() {
        let mut session = session();
        assert!(!session.render_frame());

        let output = session.build().unwrap();
        assert_eq!(output.pass_count, 1);

        assert!(session.render_frame());
        assert!(session.render_frame());
        let pipeline = &session.pipeline().unwrap().pipeline;
        assert_eq!(pipeline.frames_rendered(), 2);
        assert_eq!(pipeline.last_uniforms().unwrap().frame, 2);
        assert_eq!(pipeline.last_uniforms().unwrap().time, 1.0);
    }

    #[test]
    fn test_failed_build_keeps_running_pipeline() {
        let mut session = session();
        session.build().unwrap();
        session.render_frame();

        let output = session.graph().render_output().unwrap();
        let extra = session.graph_mut().spawn_shader("void mainImage(out vec4 c, in vec2 p) {}");
        let from = session.graph().node(extra).unwrap().output(0).unwrap().id;
        let to = session.graph().node(output).unwrap().input(0).unwrap().id;
        // The output input is taken, so this must fail and leave the graph alone.
        assert!(session.connect(from, to).is_err());

        let id = shader_id(&session);
        session.graph_mut().remove_node(id).unwrap();
        let err = session.build().unwrap_err();
        assert!(matches!(err, SessionError::Build(BuildError::AmbiguousSink { count: 0 })));

        assert!(session.render_frame());
        assert_eq!(session.pipeline().unwrap().pipeline.frames_rendered(), 2);
    }

    #[test]
    fn test_build_resets_clock() {
        let mut session = session();
        session.build().unwrap();
        session.render_frame();
        session.render_frame();
        assert_eq!(session.clock().frame(), 2);

        session.build().unwrap();
        assert_eq!(session.clock().frame(), 0);
    }

    #[test]
    fn test_textures_are_uploaded_on_build() {
        let mut session = session();
        let texture = session
            .graph_mut()
            .spawn_texture(Some(ImageData::solid(2, 2, 0xff00_00ff)), false);
        let shader = shader_id(&session);
        let from = session.graph().node(texture).unwrap().output(0).unwrap().id;
        let to = session.graph().node(shader).unwrap().input(0).unwrap().id;
        session.connect(from, to).unwrap();

        let output = session.build().unwrap();
        let pass = &output.pipeline.passes()[0];
        assert_eq!(pass.channels.len(), 1);
        assert_eq!(pass.channels[0].size, Some([2, 2]));
    }

    #[test]
    fn test_connect_uses_default_sampling() {
        let mut session = Session::<RecordingBackend>::new(
            SessionSettings {
                link_defaults: crate::settings::LinkDefaults {
                    filter: Filter::Nearest,
                    wrap: Wrap::Clamp,
                },
                ..SessionSettings::default()
            },
            Box::new(RecordingTextureLoader::new()),
        );
        let keyboard = session.graph_mut().spawn_keyboard();
        let shader = shader_id(&session);
        let from = session.graph().node(keyboard).unwrap().output(0).unwrap().id;
        let to = session.graph().node(shader).unwrap().input(1).unwrap().id;

        let link = session.connect(from, to).unwrap();
        let link = session.graph().link(link).unwrap();
        assert_eq!(link.filter, Filter::Nearest);
        assert_eq!(link.wrap, Wrap::Clamp);
    }

    #[test]
    fn test_key_presses_reach_the_keyboard_texture() {
        let mut session = session();
        let keyboard = session.graph_mut().spawn_keyboard();
        let shader = shader_id(&session);
        let from = session.graph().node(keyboard).unwrap().output(0).unwrap().id;
        let to = session.graph().node(shader).unwrap().input(0).unwrap().id;
        session.connect(from, to).unwrap();
        session.build().unwrap();

        let space = key_code("Space").unwrap();
        session.press_key(space);
        session.render_frame();

        let output = session.pipeline().unwrap();
        let texture = output.textures[&keyboard].texture.front();
        let texels = output.pipeline.dynamic_texture(texture).unwrap();
        assert_eq!(texels[usize::from(space)], 0xffff_ffff);
    }

    #[test]
    fn test_save_and_load_keep_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");

        let mut session = session();
        session
            .metadata_mut()
            .insert("name".to_string(), "Feedback".to_string());
        let shader = shader_id(&session);
        session.graph_mut().rename_node(shader, "Main").unwrap();
        session.save(&path).unwrap();

        let mut loaded = self::session();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.metadata()["name"], "Feedback");
        assert!(loaded.graph().node_by_name("Main").is_some());
        assert_eq!(loaded.graph().node_count(), 2);
    }

    #[test]
    fn test_failed_load_keeps_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut session = session();
        let before = session.graph().node_count();
        assert!(matches!(session.load(&path), Err(SessionError::Format(_))));
        assert_eq!(session.graph().node_count(), before);
    }

    #[test]
    fn test_import_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            r#"{
                "info": { "name": "Imported" },
                "renderpass": [
                    { "type": "image", "name": "Image", "code": "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }", "inputs": [], "outputs": [] }
                ]
            }"#,
        )
        .unwrap();

        let mut session = session();
        session.import_shadertoy(&path, None).unwrap();
        assert_eq!(session.metadata()["name"], "Imported");
        assert!(session
            .graph()
            .nodes()
            .any(|node| matches!(node.class, NodeClass::Shader(_))));
        assert_eq!(session.build().unwrap().pass_count, 1);
    }

    #[test]
    fn test_new_project_restores_starter_graph() {
        let mut session = session();
        session.graph_mut().spawn_keyboard();
        session.metadata_mut().insert("name".to_string(), "Old".to_string());

        session.new_project();
        assert_eq!(session.graph().node_count(), 2);
        assert!(session.metadata().is_empty());
        assert!(session.settings().keyboard_enabled);
    }

    #[test]
    fn test_media_path_strips_leading_slash() {
        let dir = Path::new("/tmp/media");
        assert_eq!(
            media_path(dir, "/media/a/noise.png"),
            PathBuf::from("/tmp/media/media/a/noise.png")
        );
    }
}
