//! Streamview: play a raw YUV frame stream in an SDL2 window

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use tracing::{debug, info, warn, Dispatch};
use tracing_subscriber::EnvFilter;

use streamview::capture::{FrameSource, VideoStream};
use streamview::display::{SdlBackend, TextureFormat};
use streamview::utils::{self, RawTerminal};
use streamview::{Config, PlaybackController, PlayerEvent};

#[derive(Debug, Parser)]
#[command(version, about = "Display a YUV frame stream in a window")]
struct Cli {
    /// Source address: `pattern`, `file://<path>` or a `.yuv` file
    source: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame and initial window width
    #[arg(long)]
    width: Option<u32>,

    /// Frame and initial window height
    #[arg(long)]
    height: Option<u32>,

    /// Texture layout
    #[arg(long, value_enum)]
    format: Option<TextureFormat>,

    #[arg(long)]
    fps: Option<u32>,

    /// Store produced frames bottom-up
    #[arg(long)]
    bottom_up: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(source) = self.source {
            config.source.address = source;
        }
        if let Some(width) = self.width {
            config.source.width = width;
            config.display.width = width;
        }
        if let Some(height) = self.height {
            config.source.height = height;
            config.display.height = height;
        }
        if let Some(format) = self.format {
            config.display.format = format;
        }
        if let Some(fps) = self.fps {
            config.source.fps = fps;
        }
        if self.bottom_up {
            config.source.bottom_up = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let dispatch = Dispatch::new(
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("streamview=debug")),
            )
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .finish(),
    );
    let _log_guard = tracing::dispatcher::set_default(&dispatch);

    let cli = Cli::parse();
    let mut config =
        Config::load(cli.config.as_deref()).wrap_err("Failed to load configuration")?;
    cli.apply(&mut config);
    let config = config.validated().wrap_err("Invalid configuration")?;

    info!("Streamview launching...");
    let queue = Arc::new(config.pipeline.frame_queue());
    let mut stream = VideoStream::open(
        &config.source.address,
        &config.source,
        queue.clone(),
        dispatch.clone(),
    )
    .await
    .wrap_err_with(|| format!("Failed to open {}", config.source.address))?;

    let source: Arc<dyn FrameSource> = stream.queue();
    let mut controller = PlaybackController::new(
        config.display.clone(),
        config.pipeline.clone(),
        source,
        SdlBackend::new,
    )
    .with_dispatch(dispatch.clone());
    let events = controller.events();

    if let Err(e) = tokio::task::block_in_place(|| controller.play()) {
        stream.close().await;
        return Err(e).wrap_err("Failed to start playback");
    }

    // Restored when main returns, even with the key thread still blocked in read
    let _terminal = match RawTerminal::enable() {
        Ok(terminal) => Some(terminal),
        Err(e) => {
            warn!("Stdin is not a terminal, quit with Ctrl-C: {}", e);
            None
        }
    };
    let (key_tx, key_rx) = flume::bounded(1);
    let key_dispatch = dispatch.clone();
    thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            tracing::dispatcher::with_default(&key_dispatch, || {
                match utils::wait_for_key(b'q') {
                    Ok(true) => {
                        let _ = key_tx.send(());
                    }
                    Ok(false) => debug!("Stdin closed"),
                    Err(e) => warn!("Failed to read stdin: {}", e),
                }
            })
        })
        .wrap_err("Failed to spawn keyboard thread")?;

    info!("Playing {}, press q to quit", stream.address());
    tokio::select! {
        Ok(()) = key_rx.recv_async() => info!("Quit key pressed"),
        signal = tokio::signal::ctrl_c() => {
            signal.wrap_err("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
        Ok(PlayerEvent::QuitRequested) = events.recv_async() => info!("Window closed"),
    }

    let discarded = tokio::task::block_in_place(|| controller.stop());
    stream.close().await;
    info!(discarded, dropped = queue.stats().dropped, "Streamview shutting down");
    Ok(())
}
