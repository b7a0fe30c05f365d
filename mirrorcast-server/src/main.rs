//! mirrorcast server — entry point.
//!
//! ```text
//! mirrorcast-server                    Listen on port 7373
//! mirrorcast-server 9000               Listen on port 9000
//! mirrorcast-server --config <path>    Load a custom config TOML
//! mirrorcast-server --replay <file>    Stream a pre-encoded H.264 file
//! mirrorcast-server --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirrorcast_server::backend;
use mirrorcast_server::config::{BackendKind, ServerConfig};
use mirrorcast_server::service::MirrorService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mirrorcast-server", about = "Stream the screen as H.264 over TCP")]
struct Cli {
    /// TCP port to listen on (overrides the config file).
    port: Option<u16>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirrorcast-server.toml")]
    config: PathBuf,

    /// Stream this Annex-B H.264 file in a loop instead of the screen.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = ServerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(path) = cli.replay {
        config.backend.kind = BackendKind::Replay;
        config.backend.replay_file = path;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mirrorcast-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "encoder: {}x{} @ {} bps",
        config.encoder.width, config.encoder.height, config.encoder.bit_rate
    );

    let backend = match backend::select(&config.backend) {
        Ok(backend) => backend,
        Err(e) => {
            error!("failed to initialise media backend: {e}");
            std::process::exit(1);
        }
    };

    let port = config.network.port;
    let service = MirrorService::new(config, backend);
    let listener = match service.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind port {port}: {e}");
            std::process::exit(1);
        }
    };

    // Ctrl-C handler.
    let shutdown = service.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        shutdown.cancel();
    });

    service.serve(listener).await?;

    Ok(())
}
