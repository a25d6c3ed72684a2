// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::settings::SETTINGS_FILE_NAME;

#[derive(Parser, Debug)]
#[command(
    name = "shaderloom",
    author,
    version,
    about = "Compile node-graph shader pipelines headlessly"
)]
pub struct Cli {
    /// Session settings file (RON).
    #[arg(long, global = true, value_name = "FILE", env = "SHADERLOOM_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the starter pipeline to a new project file.
    New(NewArgs),
    /// Compile a project and print the resulting pipeline.
    Build(BuildArgs),
    /// Convert a ShaderToy JSON export into a project file.
    Import(ImportArgs),
    /// Write the default settings to a file.
    InitSettings(InitSettingsArgs),
}

#[derive(Parser, Debug)]
pub struct NewArgs {
    /// Project file to create.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Project name stored in the metadata.
    #[arg(long)]
    pub name: Option<String>,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Project file to compile.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Frames to render after compiling; defaults to the settings value.
    #[arg(long, value_name = "N")]
    pub frames: Option<u32>,

    /// Keys held while rendering (e.g. `Space`, `A`, `Left`).
    #[arg(long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    /// Mouse position in pixels while rendering (e.g. `320,180`).
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pub mouse: Option<[f32; 2]>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// ShaderToy export (API JSON).
    #[arg(value_name = "JSON")]
    pub input: PathBuf,

    /// Project file to write.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Directory that export texture paths (`/media/a/...`) resolve under.
    #[arg(long, value_name = "DIR")]
    pub media: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InitSettingsArgs {
    /// Settings file to write.
    #[arg(value_name = "FILE", default_value = SETTINGS_FILE_NAME)]
    pub file: PathBuf,
}

fn parse_point(value: &str) -> Result<[f32; 2], String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{value}'"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f32>()
            .map_err(|e| format!("invalid coordinate '{part}': {e}"))
    };
    Ok([parse(x)?, parse(y)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "shaderloom",
            "build",
            "scene.json",
            "--frames",
            "3",
            "--key",
            "Space",
            "--key",
            "A",
            "--mouse",
            "10, 20.5",
            "--settings",
            "session.ron",
        ])
        .unwrap();

        assert_eq!(cli.settings, Some(PathBuf::from("session.ron")));
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.file, PathBuf::from("scene.json"));
        assert_eq!(args.frames, Some(3));
        assert_eq!(args.keys, ["Space", "A"]);
        assert_eq!(args.mouse, Some([10.0, 20.5]));
        assert!(!args.json);
    }

    #[test]
    fn test_import_requires_output() {
        assert!(Cli::try_parse_from(["shaderloom", "import", "export.json"]).is_err());
        let cli =
            Cli::try_parse_from(["shaderloom", "import", "export.json", "-o", "out.json"]).unwrap();
        assert!(matches!(cli.command, Command::Import(ref args) if args.media.is_none()));
    }

    #[test]
    fn test_init_settings_defaults_the_file_name() {
        let cli = Cli::try_parse_from(["shaderloom", "init-settings"]).unwrap();
        let Command::InitSettings(args) = cli.command else {
            panic!("expected init-settings");
        };
        assert_eq!(args.file, PathBuf::from(SETTINGS_FILE_NAME));
    }

    #[test]
    fn test_rejects_malformed_point() {
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,b").is_err());
    }
}
