mod battery;
mod canvas;
mod config;
mod device;
mod error;
mod reader;
mod render_loop;
mod renderer;
mod watcher;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::battery::{BatteryState, SharedBattery, ShutdownSignal};
use crate::canvas::{Canvas, FontState};
use crate::config::MonitorConfig;
use crate::device::{EvdevInput, Framebuffer};
use crate::reader::StateReader;
use crate::render_loop::RenderLoop;
use crate::renderer::{Scene, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::watcher::ChangeWatcher;

#[derive(Parser, Debug)]
#[command(name = "gcw-battery", version, about = "Battery status monitor for the GCW Zero")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the power-supply uevent file
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Override the frame rate ceiling
    #[arg(long)]
    fps: Option<u32>,

    /// Render one frame to a PNG file and exit
    #[arg(long, value_name = "PNG")]
    snapshot: Option<PathBuf>,

    /// Exit after rendering this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Generate shell completions and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    if let Some(shell) = args.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "gcw-battery", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(&config_path)?;

    // Apply CLI overrides
    if let Some(path) = &args.status_file {
        config.device.status_file = path.clone();
    }
    if let Some(fps) = args.fps {
        anyhow::ensure!(fps > 0, "--fps must be at least 1");
        config.display.fps = fps;
    }
    anyhow::ensure!(args.frames != Some(0), "--frames must be at least 1");

    let font = match FontState::load(&config.display.font) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("{:#}; text will not be drawn", e);
            None
        }
    };

    if let Some(out) = &args.snapshot {
        return snapshot(&config, font.as_ref(), out);
    }

    run(config, font, args.frames)
}

fn run(config: MonitorConfig, font: Option<FontState>, max_frames: Option<u64>) -> Result<()> {
    log::info!("Starting gcw-battery on {}", config.device.status_file.display());

    let display = Framebuffer::open(&config.device)?;

    let terminate = Arc::new(AtomicBool::new(false));
    {
        let t = terminate.clone();
        ctrlc::set_handler(move || {
            t.store(true, Ordering::SeqCst);
        })
        .context("Failed to set signal handler")?;
    }
    let input = EvdevInput::open(&config.device.inputs, terminate);

    let shared = SharedBattery::new();
    let shutdown = ShutdownSignal::new();
    let mut watcher = ChangeWatcher::start(
        StateReader::new(&config.device.status_file),
        shared.clone(),
        shutdown.clone(),
    )
    .context("Cannot monitor the battery")?;

    let mut render_loop = RenderLoop::new(config, display, input, font, shared, shutdown)?
        .with_max_frames(max_frames);
    render_loop.run(&mut watcher)?;

    log::info!("Ending gcw-battery after {} frames", render_loop.frames());
    Ok(())
}

fn snapshot(config: &MonitorConfig, font: Option<&FontState>, out: &Path) -> Result<()> {
    let state = StateReader::new(&config.device.status_file)
        .load()
        .unwrap_or_else(|_| BatteryState::default());
    log::info!("Battery state: {:?}", state);

    let mut canvas = Canvas::new(SCREEN_WIDTH, SCREEN_HEIGHT)?;
    renderer::render(&mut canvas, &Scene::from_state(&state), &config.theme, &config.display, font);
    canvas.save_png(out)?;
    log::info!("Wrote {}", out.display());
    Ok(())
}
