//! vkrt scene viewer
//!
//! Loads a glTF scene, uploads it, builds its acceleration structures and
//! renders it with a double-buffered rasterizer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkrt-viewer -- [OPTIONS] <SCENE>
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::process::ExitCode;

use anyhow::{bail, Context as _};
use vkrt_app::{init_logging, run, AppConfig};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {e:#}\n\nRun with --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    init_logging();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Build the config from command-line arguments. `Ok(None)` means help was asked for.
fn parse_args(args: &[String]) -> anyhow::Result<Option<AppConfig>> {
    let mut config = AppConfig::default()
        .with_title("vkrt viewer")
        .with_size(WIDTH, HEIGHT);
    let mut scene = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => return Ok(None),
            "--scene" => scene = Some(next_value(args, &mut i, arg)?.to_string()),
            "--width" => config.width = parse_value(arg, next_value(args, &mut i, arg)?)?,
            "--height" => config.height = parse_value(arg, next_value(args, &mut i, arg)?)?,
            "--batch-budget" => config.batch_budget = parse_value(arg, next_value(args, &mut i, arg)?)?,
            "--scale" => config.model_scale = parse_value(arg, next_value(args, &mut i, arg)?)?,
            "--speed" => config.camera_speed = parse_value(arg, next_value(args, &mut i, arg)?)?,
            "--vsync" => config.vsync = true,
            "--no-vsync" => config.vsync = false,
            "--validation" => config.validation = true,
            "--no-validation" => config.validation = false,
            other if other.starts_with('-') => bail!("unknown option {other}"),
            path if scene.is_none() => scene = Some(path.to_string()),
            extra => bail!("unexpected argument {extra}"),
        }
        i += 1;
    }

    let Some(scene) = scene else {
        bail!("no scene file given");
    };
    config.scene_path = scene.into();
    config.validate()?;
    Ok(Some(config))
}

/// Step past `option` and return the argument after it.
fn next_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{option} needs a value"))
}

fn parse_value<T>(option: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value {value:?} for {option}"))
}

fn print_help() {
    eprintln!(
        "vkrt scene viewer

USAGE:
    cargo run -p vkrt-viewer -- [OPTIONS] <SCENE>

SCENE:
    <SCENE>, --scene <PATH>  glTF (.gltf or .glb) file to load

WINDOW OPTIONS:
    --width <N>              Window width (default: {WIDTH})
    --height <N>             Window height (default: {HEIGHT})
    --vsync / --no-vsync     Toggle vsync (default: on)

GPU OPTIONS:
    --validation             Enable Vulkan validation layers
    --no-validation          Disable Vulkan validation layers
    --batch-budget <BYTES>   Bottom-level bytes built per batch (default: 256000000)

VIEW OPTIONS:
    --scale <F>              Uniform scene scale (default: 0.001)
    --speed <F>              Camera speed in scaled units per second (default: 2)

CONTROLS:
    WASD / arrows            Move
    Space / Ctrl             Up / down
    Shift                    Sprint
    Right mouse drag         Look around

OTHER:
    -h, --help               Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                 Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_scene_and_options() {
        let config = parse_args(&args(&[
            "city.glb",
            "--width",
            "800",
            "--batch-budget",
            "1000",
            "--no-validation",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.scene_path.to_str(), Some("city.glb"));
        assert_eq!(config.width, 800);
        assert_eq!(config.height, HEIGHT);
        assert_eq!(config.batch_budget, 1000);
        assert!(!config.validation);
    }

    #[test]
    fn scene_flag() {
        let config = parse_args(&args(&["--scene", "a.gltf", "--scale", "0.5"]))
            .unwrap()
            .unwrap();
        assert_eq!(config.scene_path.to_str(), Some("a.gltf"));
        assert_eq!(config.model_scale, 0.5);
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse_args(&args(&["--width", "10", "-h"])).unwrap().is_none());
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["a.gltf", "--width"])).is_err());
        assert!(parse_args(&args(&["a.gltf", "--width", "wide"])).is_err());
        assert!(parse_args(&args(&["a.gltf", "--bogus"])).is_err());
        assert!(parse_args(&args(&["a.gltf", "b.gltf"])).is_err());
    }

    #[test]
    fn acceleration_structures_cannot_be_disabled() {
        let err = parse_args(&args(&["a.gltf", "--no-accel"])).unwrap_err();
        assert!(err.to_string().contains("unknown option --no-accel"));
    }
}
