// SPDX-License-Identifier: GPL-3.0-only

use anaglyph::compositor::Rotation;
use anaglyph::viewer::{self, ViewerOptions};
use clap::{Args, Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "anaglyph")]
#[command(about = "Stereo webcam anaglyph viewer")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the viewer window (the default)
    Run(RunArgs),

    /// List available cameras
    List,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Device id for the left eye (from 'anaglyph list')
    #[arg(long)]
    left: Option<String>,

    /// Device id for the right eye (from 'anaglyph list')
    #[arg(long)]
    right: Option<String>,

    /// Left eye rotation in degrees (0, 90, 180 or 270)
    #[arg(long, value_parser = parse_rotation)]
    left_rotation: Option<Rotation>,

    /// Right eye rotation in degrees (0, 90, 180 or 270)
    #[arg(long, value_parser = parse_rotation)]
    right_rotation: Option<Rotation>,

    /// Parallax control, -100 to 100
    #[arg(long, allow_negative_numbers = true)]
    parallax: Option<f32>,

    /// Do not start capture on launch
    #[arg(long)]
    no_autostart: bool,
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: u32 = value
        .parse()
        .map_err(|_| format!("not a number: {}", value))?;
    Rotation::try_from_degrees(degrees)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=anaglyph=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) => cli::list_cameras(),
        Some(Commands::Run(args)) => run_viewer(args),
        None => run_viewer(RunArgs::default()),
    }
}

fn run_viewer(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    viewer::run(ViewerOptions {
        left_device: args.left,
        right_device: args.right,
        left_rotation: args.left_rotation,
        right_rotation: args.right_rotation,
        parallax: args.parallax,
        autostart: !args.no_autostart,
    })?;
    Ok(())
}
