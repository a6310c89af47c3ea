use anyhow::{Context, Result};
use astra_live::persona::INITIAL_GREETING;
use astra_live::{
    create_router, AppState, AudioSource, Config, LiveSession, LiveStatus, SystemDevices,
    WebSocketTransport,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "astra-live", version, about = "ASTRA AI live voice session")]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/astra-live")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk to ASTRA from this terminal until Ctrl-C
    Talk {
        /// Replay a 16-bit WAV file instead of using the microphone
        #[arg(long)]
        input: Option<String>,
    },
    /// Serve the HTTP control API for the chat UI
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    if cfg.live.api_key.is_empty() {
        warn!("No API key configured (set ASTRA_LIVE__API_KEY)");
    }

    let transport = Arc::new(WebSocketTransport::new(
        cfg.live.endpoint.clone(),
        cfg.live.api_key.clone(),
    ));
    let devices = Arc::new(SystemDevices);

    match cli.command {
        Command::Talk { input } => {
            let source = match input {
                Some(path) => AudioSource::File(path),
                None => AudioSource::Microphone,
            };
            let live = LiveSession::new(cfg.live.session_config(source), transport, devices);
            talk(live).await
        }
        Command::Serve => {
            let live = LiveSession::new(
                cfg.live.session_config(AudioSource::Microphone),
                transport,
                devices,
            );
            serve(&cfg, live).await
        }
    }
}

async fn talk(live: LiveSession) -> Result<()> {
    println!("{}", INITIAL_GREETING);

    let mut status_rx = live.subscribe();
    live.connect().await?;

    info!("Live session running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            status = status_rx.recv() => match status {
                Ok(LiveStatus::Offline) | Err(_) => break,
                Ok(status) => println!("[{}]", status),
            },
        }
    }

    live.disconnect().await;

    let stats = live.stats();
    info!(
        "Session finished: {:.1}s, {} frames sent, {} chunks played, {} dropped",
        stats.duration_secs, stats.frames_sent, stats.chunks_played, stats.chunks_dropped
    );
    if let Some(err) = stats.last_error {
        warn!("Session ended with error: {}", err);
    }

    Ok(())
}

async fn serve(cfg: &Config, live: LiveSession) -> Result<()> {
    let state = AppState::new(live);
    let app = create_router(state.clone());

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // The UI surface is gone; release devices and the connection
    state.live.disconnect().await;

    Ok(())
}
