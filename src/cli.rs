//! Command-line entry point.
//!
//! The teacher's CLI is a large multi-command personal-assistant shell;
//! this process has exactly one job (serve calls), so it keeps the
//! teacher's `clap::Parser` derive style but collapses to a single
//! `serve` command with env-overridable flags for the bind address.

use anyhow::Result;
use clap::Parser;

use crate::config::Config;
use crate::server;

#[derive(Parser)]
#[command(name = "voice-agent")]
#[command(about = "Real-time telephony voice agent: STT -> LLM -> TTS with barge-in", long_about = None)]
#[command(version)]
struct Cli {
    /// Override the bind host (default from $HOST or 0.0.0.0)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Override the bind port (default from $PORT or 8000)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Enable debug-level tracing regardless of $RUST_LOG
    #[arg(long, env = "DEBUG")]
    debug: bool,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.debug {
        config.server.debug = true;
    }

    server::start(config).await
}
