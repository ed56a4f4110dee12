use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use resonance_core::{
    AppConfig, EventLoop, InputEvent, LoaderRegistry, Orchestrator, ResonanceError,
    ResourceLoader,
};
use tracing_subscriber::EnvFilter;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

fn main() -> resonance_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live {
            config,
            frames,
            debug,
        } => run_live(config.as_deref(), frames, debug),
        Commands::Preload { config } => run_preload(config.as_deref()),
        Commands::DefaultConfig { output } => write_default_config(&output),
    }
}

fn load_config(path: Option<&Path>) -> resonance_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn run_live(config: Option<&Path>, frames: Option<u64>, debug: bool) -> resonance_core::Result<()> {
    let mut app_config = load_config(config)?;
    app_config.debug.active |= debug;
    tracing::info!(?config, frames, "starting live mode");

    let event_loop = EventLoop::new();
    let orchestrator = Orchestrator::from_config(app_config, &event_loop)?;

    // There is no pointer in a headless run; one synthetic click starts the
    // audio and the first animation.
    orchestrator.handle_input(&InputEvent::Click)?;

    let started = Instant::now();
    let mut drawn = 0_u64;
    while frames.map_or(true, |limit| drawn < limit) {
        let frame_started = Instant::now();
        event_loop.run_frame(started.elapsed().as_secs_f64() * 1000.0)?;
        drawn += 1;
        if let Some(rest) = FRAME_INTERVAL.checked_sub(frame_started.elapsed()) {
            thread::sleep(rest);
        }
    }

    orchestrator.teardown();
    tracing::info!(
        frames = orchestrator.renderer().frames_drawn(),
        world_built = orchestrator.is_world_built(),
        audio = orchestrator.is_audio_enabled(),
        speed = ?orchestrator.value("speed"),
        "live mode finished"
    );
    Ok(())
}

fn run_preload(config: Option<&Path>) -> resonance_core::Result<()> {
    let app_config = load_config(config)?;
    tracing::info!(root = %app_config.assets.root.display(), "preloading sources");

    let event_loop = EventLoop::new();
    let registry = LoaderRegistry::filesystem(app_config.assets.root.clone());
    let resources = ResourceLoader::new(app_config.assets.sources, &registry)?;
    resources.start(&event_loop)?;
    event_loop.run_until_idle()?;

    for name in resources.item_names() {
        if let Some(asset) = resources.item(&name) {
            tracing::info!(%name, kind = %asset.kind(), bytes = asset.byte_len(), "loaded");
        }
    }

    let failures = resources.failures();
    for failure in &failures {
        tracing::error!(%failure, "failed");
    }
    match failures.into_iter().next() {
        Some(failure) => Err(ResonanceError::Load(failure)),
        None => {
            tracing::info!(
                loaded = resources.loaded(),
                total = resources.total(),
                ready = resources.is_ready(),
                "preload finished"
            );
            Ok(())
        }
    }
}

fn write_default_config(output: &Path) -> resonance_core::Result<()> {
    AppConfig::default().save(output)?;
    tracing::info!(?output, "default configuration written");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive sphere driven by a ready barrier and a frame ticker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scene against the wall clock with the headless renderer.
    Live {
        /// JSON configuration file; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Stop after this many frames instead of running until interrupted.
        #[arg(short, long)]
        frames: Option<u64>,
        /// Start with the debug panel active.
        #[arg(long)]
        debug: bool,
    },
    /// Load every configured source and report the outcome.
    Preload {
        /// JSON configuration file; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration as JSON.
    DefaultConfig {
        /// Destination file.
        output: PathBuf,
    },
}
