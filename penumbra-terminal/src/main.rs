/// Penumbra Terminal - shadow-mapped scene viewer
///
/// Controls:
///   - WASD: Move, Space/C: Rise/Sink
///   - Shift or R: Sprint
///   - Arrow Keys / Left Drag: Look around
///   - F: Move the light to the camera
///   - Q/ESC: Quit
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use penumbra_core::RendererConfig;
use penumbra_terminal::{AppOptions, PresentMode, TerminalApp};

#[derive(Parser, Debug)]
#[command(version, about = "Render OBJ scenes with shadow mapping in the terminal")]
struct Args {
    /// TOML renderer configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OBJ file to add to the scene (repeatable)
    #[arg(short, long = "model")]
    models: Vec<PathBuf>,

    /// Uniform scale applied to every loaded model
    #[arg(short, long, default_value_t = 1.0)]
    scale: f32,

    /// Frame rate cap
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Draw with ASCII ramp characters instead of half blocks
    #[arg(long)]
    ascii: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.verbose {
        "debug"
    } else {
        "warn"
    }))
    .init();

    let config = match &args.config {
        Some(path) => {
            RendererConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => RendererConfig::default(),
    };

    let options = AppOptions {
        models: args.models,
        scale: args.scale,
        present_mode: if args.ascii { PresentMode::Ascii } else { PresentMode::HalfBlock },
        target_fps: args.fps,
    };

    let size = crossterm::terminal::size().context("Failed to query terminal size")?;
    let mut app = TerminalApp::new(&config, &options, size).context("Failed to set up scene")?;
    app.run().context("Terminal session failed")?;

    log::info!("Rendered {} frames", app.frame_loop().frames());
    Ok(())
}
