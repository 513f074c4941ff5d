//! chatwire - an interactive line-protocol chat client.
//!
//! Opens one TCP connection to a chat server, sends each input line as a
//! newline-terminated message and renders the reply, which is either plain
//! text or a tag-delimited payload describing a command result or a model
//! reply.

mod client;
mod config;
mod error;
mod protocol;
mod shutdown;
mod tags;

use anyhow::{Context, Result};
use clap::Parser;
use client::{Framer, Renderer, Session, SessionEnd};
use config::{ColorMode, Config};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatwire")]
#[command(author, version, about = "An interactive line-protocol chat client")]
#[command(long_about = "Connects to a chat server over TCP and exchanges one line per message.\n\nType '/help' in the session for commands, 'exit' to quit.")]
struct Cli {
    /// Server hostname or IP address
    #[arg(value_name = "HOST")]
    host: Option<String>,

    /// Server port (falls back to the configured port if invalid)
    #[arg(value_name = "PORT")]
    port: Option<String>,

    /// Path to the config file
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// When to style output
    #[arg(long, value_enum, value_name = "WHEN")]
    color: Option<ColorMode>,

    /// Override the idle timeout that ends an unterminated reply
    #[arg(long, value_name = "MS")]
    idle_timeout_ms: Option<u64>,

    /// Log debug output to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let host = config.server.host.clone();
    let port = config.server.port;

    let stream = match client::connect(&host, port, config.connect_timeout()) {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Connect failed: {:?}", e);
            eprintln!("Error: {}", e);
            eprintln!("Failed to connect to server");
            std::process::exit(1);
        }
    };

    println!("Connected to server ({}:{})", host, port);

    let session = Session::new(
        stream,
        Framer::new(config.framing.chunk_size, config.idle_timeout()),
        Renderer::new(config.session.color.enabled()),
        config.session.max_input,
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let outcome = session.run(stdin, &mut stdout, shutdown::termination()).await;
    drop(session);

    match outcome {
        Ok(SessionEnd::Signalled) => {
            println!("\nReceived termination signal. Exiting client...");
            // A pending stdin read would otherwise hold the runtime open.
            std::process::exit(0);
        }
        Ok(end) => {
            debug!("Session ended: {:?}", end);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize logging to stderr, honouring `RUST_LOG`.
fn init_logging(verbose: bool) -> Result<()> {
    let directive = if verbose { "chatwire=debug" } else { "chatwire=warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = &cli.port {
        match parse_port(port) {
            Some(port) => config.server.port = port,
            None => warn!(
                "Invalid port '{}', using {}",
                port, config.server.port
            ),
        }
    }
    if let Some(color) = cli.color {
        config.session.color = color;
    }
    if let Some(ms) = cli.idle_timeout_ms {
        config.framing.idle_timeout_ms = ms;
    }
}

/// Parse a port in 1..=65535.
fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok().filter(|&port| port != 0)
}
