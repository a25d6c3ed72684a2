// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use serde::Serialize;
use shaderloom_graph::backend::recording::{RecordingBackend, RecordingTextureLoader};
use shaderloom_graph::keyboard::key_code;
use shaderloom_graph::{BuildOutput, ContentType, Filter, Graph, Wrap};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::{BuildArgs, Command, ImportArgs, InitSettingsArgs, NewArgs};
use crate::session::{Session, SessionError};
use crate::settings::SessionSettings;

/// Errors surfaced to the command line
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A session operation failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The settings file could not be written
    #[error("Failed to write settings {path}: {source}")]
    Settings {
        /// Settings file
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// Refusing to overwrite a file
    #[error("{0} already exists (use --force to overwrite)")]
    Exists(PathBuf),

    /// The JSON report could not be written
    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}

type HeadlessSession = Session<RecordingBackend>;

fn headless_session(settings: SessionSettings) -> HeadlessSession {
    Session::new(settings, Box::new(RecordingTextureLoader::new()))
}

/// Run a parsed subcommand
pub fn run(command: Command, settings: SessionSettings) -> Result<(), CommandError> {
    match command {
        Command::New(args) => run_new(&args, settings),
        Command::Build(args) => run_build(&args, settings),
        Command::Import(args) => run_import(&args, settings),
        Command::InitSettings(args) => run_init_settings(&args),
    }
}

fn run_new(args: &NewArgs, settings: SessionSettings) -> Result<(), CommandError> {
    ensure_writable(&args.file, args.force)?;
    let mut session = headless_session(settings);
    if let Some(name) = &args.name {
        session.metadata_mut().insert("name".to_string(), name.clone());
    }
    session.save(&args.file)?;
    println!("Created {}", args.file.display());
    Ok(())
}

fn run_build(args: &BuildArgs, settings: SessionSettings) -> Result<(), CommandError> {
    let frames = args.frames.unwrap_or(settings.frames);
    let mut session = headless_session(settings);
    session.load(&args.file)?;
    session.build()?;

    for key in &args.keys {
        match key_code(key) {
            Some(code) => session.press_key(code),
            None => tracing::warn!("Unknown key {key}, ignoring"),
        }
    }
    if let Some(position) = args.mouse {
        session.set_mouse(position, Some(position));
    }
    for _ in 0..frames {
        session.render_frame();
    }

    let Some(output) = session.pipeline() else {
        return Ok(());
    };
    let report = BuildReport::new(session.graph(), output);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn run_import(args: &ImportArgs, settings: SessionSettings) -> Result<(), CommandError> {
    let mut session = headless_session(settings);
    session.import_shadertoy(&args.input, args.media.as_deref())?;
    session.save(&args.output)?;
    println!(
        "Imported {} into {}",
        args.input.display(),
        args.output.display()
    );
    Ok(())
}

fn run_init_settings(args: &InitSettingsArgs) -> Result<(), CommandError> {
    ensure_writable(&args.file, false)?;
    SessionSettings::default()
        .save(&args.file)
        .map_err(|source| CommandError::Settings {
            path: args.file.clone(),
            source,
        })?;
    println!("Wrote default settings to {}", args.file.display());
    Ok(())
}

fn ensure_writable(path: &Path, force: bool) -> Result<(), CommandError> {
    if path.exists() && !force {
        return Err(CommandError::Exists(path.to_path_buf()));
    }
    Ok(())
}

/// Summary of a compiled pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    /// Scheduled nodes in execution order
    pub nodes: Vec<NodeReport>,
    /// Emitted passes
    pub pass_count: usize,
    /// Render targets allocated
    pub frame_buffers: usize,
    /// Frames rendered after the build
    pub frames_rendered: u64,
    /// Compile time in milliseconds
    pub compile_ms: f64,
}

/// One scheduled node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    /// Node name
    pub name: String,
    /// Node class
    pub class: &'static str,
    /// Propagated content type
    pub content_type: ContentType,
    /// Render target buffering
    pub buffering: String,
    /// Bound input channels
    pub channels: Vec<ChannelReport>,
}

/// One bound channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReport {
    /// Input slot
    pub slot: u32,
    /// Producing node
    pub source: String,
    /// Sampling filter
    pub filter: Filter,
    /// Wrap mode
    pub wrap: Wrap,
}

impl BuildReport {
    /// Describe `output`, compiled from `graph`
    pub fn new(graph: &Graph, output: &BuildOutput<RecordingBackend>) -> Self {
        let name_of = |id| graph.node(id).map_or_else(String::new, |n| n.name.clone());

        let nodes = output
            .schedule
            .order()
            .iter()
            .filter_map(|&id| {
                let node = graph.node(id)?;
                let channels = output
                    .schedule
                    .producers(id)
                    .iter()
                    .filter_map(|producer| {
                        let link = graph.link(producer.link)?;
                        Some(ChannelReport {
                            slot: producer.slot,
                            source: name_of(producer.node),
                            filter: link.filter,
                            wrap: link.wrap,
                        })
                    })
                    .collect();
                Some(NodeReport {
                    name: node.name.clone(),
                    class: node.class.base_name(),
                    content_type: node.content_type,
                    buffering: format!("{:?}", output.plan.buffering(id)),
                    channels,
                })
            })
            .collect();

        Self {
            nodes,
            pass_count: output.pass_count,
            frame_buffers: output.pipeline.frame_buffer_count(),
            frames_rendered: output.pipeline.frames_rendered(),
            compile_ms: output.elapsed.as_secs_f64() * 1000.0,
        }
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Compiled {} passes into {} frame buffers in {:.1} ms",
            self.pass_count, self.frame_buffers, self.compile_ms
        )?;
        for (index, node) in self.nodes.iter().enumerate() {
            writeln!(
                f,
                "{:>3}. {} [{} {:?}, {}]",
                index + 1,
                node.name,
                node.class,
                node.content_type,
                node.buffering
            )?;
            for channel in &node.channels {
                writeln!(
                    f,
                    "       iChannel{} <- {} ({:?}, {:?})",
                    channel.slot, channel.source, channel.filter, channel.wrap
                )?;
            }
        }
        if self.frames_rendered > 0 {
            writeln!(f, "Rendered {} frames", self.frames_rendered)?;
        }
        Ok(())
    }
}
