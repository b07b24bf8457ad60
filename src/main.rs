//! ios-simulator-mcp - MCP server for iOS Simulator automation
//!
//! Exposes simctl, AppleScript and Appium driven automation of the iOS
//! Simulator to AI assistants over stdio or HTTP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ios_simulator_mcp::config::{Settings, Transport};
use ios_simulator_mcp::server::SERVER_VERSION;
use ios_simulator_mcp::McpServer;

/// MCP server for iOS Simulator automation.
#[derive(Parser, Debug)]
#[command(name = "ios-simulator-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport (stdio or http). Overrides MCP_TRANSPORT.
    #[arg(long)]
    transport: Option<Transport>,

    /// HTTP bind host. Overrides MCP_HOST.
    #[arg(long)]
    host: Option<String>,

    /// HTTP bind port. Overrides MCP_PORT / PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Appium server URL. Overrides APPIUM_URL.
    #[arg(long)]
    appium_url: Option<String>,

    /// Directory for screenshots. Overrides SCREENSHOT_DIR.
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Keep only the N newest screenshots. Overrides SCREENSHOT_KEEP.
    #[arg(long)]
    screenshot_keep: Option<usize>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Log output file (default: stderr).
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) -> ios_simulator_mcp::Result<()> {
        if let Some(transport) = self.transport {
            settings.transport = transport;
        }
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(url) = &self.appium_url {
            settings.appium.url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = &self.screenshot_dir {
            settings.screenshot_dir = dir.clone();
        }
        if self.screenshot_keep.is_some() {
            settings.screenshot_keep = self.screenshot_keep;
        }
        settings.finalize()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {:#}", e);
            eprintln!("ios-simulator-mcp: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut settings = Settings::from_env().context("invalid configuration")?;
    args.apply(&mut settings).context("invalid command line")?;

    init_logging(&args, &settings)?;

    tracing::info!(
        "Starting {} v{} ({:?} deployment, {} transport)",
        settings.server_name,
        SERVER_VERSION,
        settings.deployment,
        settings.transport
    );
    tracing::info!("Appium endpoint: {}", settings.appium.url);

    let transport = settings.transport;
    let bind = (settings.host.clone(), settings.port);
    let server = McpServer::from_settings(settings).context("failed to build server")?;

    match transport {
        Transport::Stdio => server.run_stdio().await?,
        Transport::Http => serve_http(server, bind).await?,
    }
    Ok(())
}

#[cfg(feature = "http")]
async fn serve_http(server: McpServer, (host, port): (String, u16)) -> anyhow::Result<()> {
    let addr = tokio::net::lookup_host((host.as_str(), port))
        .await
        .with_context(|| format!("cannot resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("no address for {}:{}", host, port))?;
    ios_simulator_mcp::http::serve(std::sync::Arc::new(server), addr).await?;
    Ok(())
}

#[cfg(not(feature = "http"))]
async fn serve_http(_server: McpServer, _bind: (String, u16)) -> anyhow::Result<()> {
    anyhow::bail!("HTTP transport requested but this build lacks the `http` feature")
}

fn init_logging(args: &Args, settings: &Settings) -> anyhow::Result<()> {
    let default_level = if args.verbose {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the protocol, so logs go to stderr or a file.
    let writer = match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(args.log_file.is_none());

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
    Ok(())
}
