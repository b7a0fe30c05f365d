//! mirrorcast receiver — entry point.
//!
//! ```text
//! mirrorcast-recv | ffplay -               Play from 127.0.0.1:7373
//! mirrorcast-recv --host 10.0.0.2 -o s.h264  Save a remote stream
//! mirrorcast-recv --config <path>          Load a custom config TOML
//! mirrorcast-recv --gen-config             Write default config to stdout
//! mirrorcast-recv --key 26                 Send a key press, then exit
//! mirrorcast-recv --back                   Send BACK, then exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::AsyncWrite;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mirrorcast_core::ControlEvent;
use mirrorcast_recv::config::RecvConfig;
use mirrorcast_recv::control::ControlSender;
use mirrorcast_recv::receiver::StreamReceiver;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mirrorcast-recv", about = "Receive a mirrorcast H.264 stream")]
struct Cli {
    /// Server host (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Output file, or "-" for stdout (overrides the config file).
    #[arg(short, long)]
    output: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirrorcast-recv.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Input daemon port (overrides the config file).
    #[arg(long)]
    control_port: Option<u16>,

    /// Send an Android key code over the control channel and exit.
    #[arg(long, value_name = "CODE")]
    key: Option<u16>,

    /// Send BACK over the control channel and exit.
    #[arg(long)]
    back: bool,

    /// Send HOME over the control channel and exit.
    #[arg(long)]
    home: bool,
}

impl Cli {
    fn control_events(&self) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        if let Some(code) = self.key {
            events.push(ControlEvent::key(code));
        }
        if self.back {
            events.push(ControlEvent::back());
        }
        if self.home {
            events.push(ControlEvent::home());
        }
        events
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RecvConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let events = cli.control_events();
    let mut config = RecvConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(output) = cli.output {
        config.output.path = output;
    }
    if let Some(port) = cli.control_port {
        config.network.control_port = port;
    }

    // Logs go to stderr; stdout may be carrying the video.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("mirrorcast-recv v{}", env!("CARGO_PKG_VERSION"));

    if !events.is_empty() {
        let address = config.control_address();
        let mut sender = ControlSender::connect(&address, config.connect_timeout()).await?;
        for event in events {
            sender.send(event).await?;
        }
        info!("sent {} control event(s) to {address}", sender.sent());
        return Ok(());
    }

    info!("server: {}", config.server_address());

    let output: Box<dyn AsyncWrite + Unpin + Send> = if config.writes_stdout() {
        Box::new(tokio::io::stdout())
    } else {
        info!("writing stream to {}", config.output.path);
        Box::new(tokio::fs::File::create(&config.output.path).await?)
    };

    let mut receiver = StreamReceiver::new(&config, output);

    // Ctrl-C handler.
    let shutdown = receiver.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        shutdown.cancel();
    });

    receiver.run().await?;

    Ok(())
}
