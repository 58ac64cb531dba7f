// MixFlip - terminal front end for the before/after player
// Loads one player manifest, wires the engine to the TUI and gets out of the way

use anyhow::Result;
use clap::Parser;
use mixflip::analytics::PlaySource;
use mixflip::audio::AudioEngine;
use mixflip::config::Config;
use mixflip::playback::{ControllerOptions, PlaybackController};
use mixflip::ui::App;
use mixflip::PlayerManifest;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mixflip")]
#[command(about = "Play before/after mixes in sync and flip between them instantly")]
struct Args {
    /// Player manifest (JSON). Defaults to library.manifest_path from the config.
    manifest: Option<PathBuf>,

    /// Enable developer logging (keeps stderr)
    #[arg(long)]
    dev: bool,

    /// Where the player is embedded; overrides the manifest
    #[arg(long, value_enum)]
    source: Option<PlaySource>,

    /// Move on to the next song when one finishes
    #[arg(long)]
    auto_advance: bool,
}

fn init_logging() -> Result<()> {
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender, stdout belongs to the TUI
    let file_appender = tracing_appender::rolling::daily(&log_dir, "mixflip.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mixflip=debug"));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(base_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // The writer has to outlive main
    std::mem::forget(guard);

    Ok(())
}

// ALSA likes to print underrun warnings straight onto the TUI
fn redirect_stderr_to_null() -> Result<()> {
    unsafe {
        let null_fd = libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_WRONLY);
        if null_fd == -1 {
            return Err(anyhow::anyhow!("Failed to open /dev/null"));
        }

        if libc::dup2(null_fd, libc::STDERR_FILENO) == -1 {
            libc::close(null_fd);
            return Err(anyhow::anyhow!("Failed to redirect stderr"));
        }

        libc::close(null_fd);
    }

    Ok(())
}

#[cfg(feature = "analytics")]
fn attach_analytics(controller: PlaybackController, config: &Config) -> PlaybackController {
    if !config.analytics.enabled {
        return controller;
    }
    match mixflip::analytics::PlayLog::new(&config.analytics.database_path) {
        Ok(log) => controller.with_analytics(std::sync::Arc::new(log)),
        Err(e) => {
            warn!("Play analytics disabled: {}", e);
            controller
        }
    }
}

#[cfg(not(feature = "analytics"))]
fn attach_analytics(controller: PlaybackController, _config: &Config) -> PlaybackController {
    controller
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;
    info!("MixFlip starting up");

    if args.dev {
        debug!("Dev mode: keeping stderr");
    } else if let Err(e) = redirect_stderr_to_null() {
        warn!("Could not silence stderr: {}", e);
    }

    let config = Config::load()?;

    let manifest_path = args
        .manifest
        .or_else(|| config.library.manifest_path.clone())
        .ok_or_else(|| anyhow::anyhow!("No manifest given and library.manifest_path is not set"))?;
    let manifest = PlayerManifest::load(&manifest_path)?;

    let playlist = manifest.playlist();
    info!(
        "{} of {} song(s) playable in {:?} mode",
        playlist.len(),
        manifest.songs.len(),
        playlist.mode()
    );

    let mut player = manifest.player.clone();
    player.auto_advance |= args.auto_advance;

    let options = ControllerOptions {
        crossfade: config.audio.crossfade(),
        has_active_plan: manifest.has_active_plan,
        source: args.source.unwrap_or(manifest.source),
    };

    let engine = AudioEngine::new(config.audio.unlock_duration())?;

    let controller = attach_analytics(
        PlaybackController::new(engine.backend(), playlist, player, options),
        &config,
    );

    let mut app = App::new(&config, controller)?;
    let result = app.run().await;

    // Terminal restored and every voice released before the stream goes away
    drop(app);
    engine.stop_all();
    info!("MixFlip shut down");

    result
}
