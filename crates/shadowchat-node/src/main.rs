// ============================================
// File: crates/shadowchat-node/src/main.rs
// ============================================
//! # ShadowChat Entry Point
//!
//! ## Creation Reason
//! Single binary for running the relay and for chatting through it.
//! Handles CLI parsing, logging setup, and configuration loading.
//!
//! ## Usage
//! ```bash
//! shadowchat serve                       # Run the relay
//! shadowchat connect --user alice        # Chat from the terminal
//! shadowchat keygen --out alice.json     # Create a client key file
//! shadowchat validate                    # Validate config file
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Chat output goes to stdout; logs go to stderr
//! - `RUST_LOG` overrides the configured level
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shadowchat_core::KeyExchange;
use shadowchat_node::{identity, ChatEvent, Client, NodeConfig, NodeError, Server};

/// Default configuration path.
const DEFAULT_CONFIG: &str = "shadowchat.toml";

// ============================================
// CLI Definition
// ============================================

/// ShadowChat end-to-end encrypted chat relay
#[derive(Parser, Debug)]
#[command(name = "shadowchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Override the listen address
        #[arg(long)]
        listen: Option<std::net::SocketAddr>,
    },

    /// Connect to a relay and chat from the terminal
    Connect {
        /// Display name
        #[arg(short, long)]
        user: String,

        /// Relay URL (overrides the config file)
        #[arg(long)]
        url: Option<String>,

        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Generate a client identity key file
    Keygen {
        /// Output path
        #[arg(short, long)]
        out: PathBuf,

        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, listen } => cmd_serve(&config, listen).await,
        Commands::Connect { user, url, config } => cmd_connect(&config, user, url).await,
        Commands::Keygen { out, config } => cmd_keygen(&config, &out).await,
        Commands::Validate { config } => cmd_validate(&config).await,
    };

    if let Err(e) = result {
        init_logging("error");
        error!("{}", e);
        // Configuration and startup problems exit with 2
        let code = match e.downcast_ref::<NodeError>() {
            Some(err) if err.is_fatal() => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

// ============================================
// Commands
// ============================================

/// Runs the relay.
async fn cmd_serve(config_path: &Path, listen: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    let mut config = NodeConfig::load_or_default(config_path).await?;
    if let Some(addr) = listen {
        config.network.listen_addr = addr;
    }
    init_logging(&config.logging.level);

    let server = Server::new(config);
    server.run().await?;
    Ok(())
}

/// Runs an interactive chat session.
async fn cmd_connect(config_path: &Path, user: String, url: Option<String>) -> anyhow::Result<()> {
    let mut config = NodeConfig::load_or_default(config_path).await?;
    if let Some(url) = url {
        config.client.server_url = url;
    }
    config.validate()?;
    init_logging(&config.logging.level);

    let mut handle = Client::new(config, user)?.connect().await?;
    println!("Connected as {}. Type a message, /peers, or /quit.", handle.user_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/peers" => {
                        for peer in handle.keyed_peers() {
                            println!("  {peer}");
                        }
                    }
                    text => {
                        let sent = handle.send_text(text).await?;
                        if sent == 0 {
                            println!("(no peers with an agreed key yet)");
                        }
                    }
                }
            }
            event = handle.next_event() => {
                match event {
                    Some(ChatEvent::Message { sender_id, text }) => println!("{sender_id}: {text}"),
                    Some(ChatEvent::PeerKeyed { user_id }) => println!("* secure session with {user_id}"),
                    Some(ChatEvent::Notice(notice)) => println!("* {notice}"),
                    Some(ChatEvent::Disconnected) | None => {
                        println!("* disconnected");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.close().await?;
    Ok(())
}

/// Writes a new identity key file.
async fn cmd_keygen(config_path: &Path, out: &Path) -> anyhow::Result<()> {
    let config = NodeConfig::load_or_default(config_path).await?;
    init_logging(&config.logging.level);

    if tokio::fs::try_exists(out).await? {
        anyhow::bail!("{} already exists; refusing to overwrite", out.display());
    }

    let key_pair = identity::generate(config.crypto.rsa_bits).await?;
    identity::save(&key_pair, out).await?;

    println!("Key written to {}", out.display());
    println!("Fingerprint: {}", KeyExchange::fingerprint(&key_pair.public_key_der()?));
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    if !tokio::fs::try_exists(config_path).await? {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Defaults will be used.");
        return Ok(());
    }

    let config = NodeConfig::load(config_path).await?;
    info!("Configuration loaded");

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:     {}{}", config.network.listen_addr, config.network.path);
    println!();
    println!("Limits:");
    println!("   Max Connections:  {}", config.limits.max_connections);
    println!("   Outbound Queue:   {}", config.limits.outbound_queue_capacity);
    println!("   Idle Timeout:     {}s", config.limits.idle_timeout_secs);
    println!();
    println!("Crypto:");
    println!("   RSA Bits:         {}", config.crypto.rsa_bits);
    println!("   Session Key:      {} bytes", config.crypto.session_key_size);
    println!();
    println!("Client:");
    println!("   Server URL:       {}", config.client.server_url);
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}
