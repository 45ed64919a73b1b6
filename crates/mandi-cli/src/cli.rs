//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use mandi_core::config::Config;

use crate::chat;

#[derive(Parser)]
#[command(name = "mandi")]
#[command(version)]
#[command(about = "Streaming chat client for the mandi shopping assistant")]
struct Cli {
    /// Send one message and exit (interactive chat when omitted)
    message: Option<String>,

    /// Backend base URL (overrides config)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Reuse an existing backend session
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,

    /// Tag the session to a device on first contact
    #[arg(long, value_name = "ID")]
    device_id: Option<String>,
}

pub fn run() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load().context("load config")?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
        config.validate().context("invalid --base-url")?;
    }
    if let Some(session) = cli.session_id {
        config.session_id = Some(session);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    match cli.message {
        Some(message) => runtime.block_on(chat::run_once(&config, cli.device_id.as_deref(), &message)),
        None => runtime.block_on(chat::run_interactive(&config, cli.device_id.as_deref())),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|spec| tracing_subscriber::EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
