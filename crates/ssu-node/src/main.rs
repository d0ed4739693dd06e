// ============================================
// File: crates/ssu-node/src/main.rs
// ============================================
//! # SSU Node Entry Point
//!
//! ## Creation Reason
//! Operator binary: key management, configuration checks and a small
//! listen/dial pair for exercising the handshake against real peers.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Identity key file generation and loading
//! - Echo listener and one-shot dialer
//!
//! ## Usage
//! ```bash
//! # Step 1: Create an identity and an introduction key
//! ssu-node keygen --config /etc/ssu/node.toml
//!
//! # Step 2: Accept sessions (echoes every message back)
//! ssu-node listen --config /etc/ssu/node.toml
//!
//! # Other commands
//! ssu-node show-key                  # Public identity and intro key
//! ssu-node validate                  # Validate config file
//! ssu-node dial --peer 192.0.2.1:8887 --identity <b64> --intro-key <b64> --message hi
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The binary ships no SessionConfirmed codec, so `listen` and `dial`
//!   stop at the third handshake message with a clean `Unimplemented`
//!   failure
//! - `RUST_LOG` overrides the configured log level
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use base64::Engine;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ssu_common::Timestamp;
use ssu_core::crypto::{IdentityKeyPair, IdentityPublicKey, IntroKey};
use ssu_node::{Dialer, Listener, ListenerOptions, NodeConfig, NodeError, RemotePeer, SessionConnection};

const DEFAULT_CONFIG: &str = "/etc/ssu/node.toml";

// ============================================
// CLI Definition
// ============================================

/// SSU handshake node
#[derive(Parser, Debug)]
#[command(name = "ssu-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an identity key file and a fresh introduction key
    Keygen {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Show the public identity key and the configured introduction key
    ShowKey {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Output format: base64 (default), hex
        #[arg(long, default_value = "base64")]
        format: String,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Accept sessions and echo received data
    Listen {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Dial a peer, send one message and print the reply
    Dial {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Peer address
        #[arg(long)]
        peer: SocketAddr,

        /// Peer's base64 Ed25519 identity key
        #[arg(long)]
        identity: String,

        /// Peer's base64 introduction key
        #[arg(long)]
        intro_key: String,

        /// Message to send
        #[arg(short, long, default_value = "hello")]
        message: String,

        /// Seconds to wait for the reply
        #[arg(long, default_value_t = 5)]
        wait_secs: u64,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging("info");

    let result = match cli.command {
        Commands::Keygen { config, force } => cmd_keygen(&config, force).await,
        Commands::ShowKey { config, format } => cmd_show_key(&config, &format).await,
        Commands::Validate { config } => cmd_validate(&config).await,
        Commands::Listen { config } => cmd_listen(&config).await,
        Commands::Dial {
            config,
            peer,
            identity,
            intro_key,
            message,
            wait_secs,
        } => {
            cmd_dial(
                &config,
                peer,
                &identity,
                &intro_key,
                &message,
                Duration::from_secs(wait_secs),
            )
            .await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Writes a new identity key file and prints a fresh introduction key.
async fn cmd_keygen(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let key_path = PathBuf::from(&config.identity.key_file);

    if key_path.exists() && !force {
        bail!(
            "key file {} already exists (use --force to replace it)",
            key_path.display()
        );
    }

    let identity = IdentityKeyPair::generate();
    save_key(&identity, &key_path).await?;
    info!(path = %key_path.display(), "Identity key written");

    let intro_key = IntroKey::generate();
    println!("Identity:   {}", identity.public_key());
    println!();
    println!("Add the introduction key to the [identity] section of {}:", config_path.display());
    println!();
    println!("   intro_key = \"{}\"", intro_key.to_base64());
    println!();
    Ok(())
}

/// Prints what peers need to dial this node.
async fn cmd_show_key(config_path: &Path, format: &str) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let identity = load_key(Path::new(&config.identity.key_file)).await?;
    let intro_key = config.identity.intro_key()?;

    match format {
        "hex" => {
            println!("identity  = {}", hex::encode(identity.public_key_bytes()));
            if let Some(key) = intro_key {
                println!("intro_key = {}", hex::encode(key.as_bytes()));
            }
        }
        "base64" => {
            println!("identity  = {}", identity.public_key());
            if let Some(key) = intro_key {
                println!("intro_key = {}", key.to_base64());
            }
        }
        other => bail!("unknown format '{other}' (expected base64 or hex)"),
    }
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Node will use default values.");
        return Ok(());
    }

    let config = NodeConfig::load(config_path).await?;
    let hs = &config.handshake;

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:       {}", config.listen_addr());
    println!();
    println!("Handshake:");
    println!("   Retransmit:   {}ms x {}", hs.retransmit_interval_ms, hs.max_attempts);
    println!("   Timeout:      {}s", hs.timeout_secs);
    println!("   Clock skew:   {}s", hs.max_clock_skew_secs);
    println!("   Max pending:  {}", hs.max_pending);
    println!("   Relay tag:    {}", if hs.offer_relay_tag { "offered" } else { "none" });
    println!();
    println!("Identity:");
    println!("   Key file:     {}", config.identity.key_file);
    println!(
        "   Intro key:    {}",
        if config.identity.intro_key.is_some() { "set" } else { "missing" }
    );
    println!();
    Ok(())
}

/// Accepts sessions until interrupted, echoing every message.
async fn cmd_listen(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);

    let identity = load_key(Path::new(&config.identity.key_file)).await?;
    let intro_key = config
        .identity
        .intro_key()?
        .context("identity.intro_key is required to listen (run keygen)")?;

    info!(identity = %identity.public_key(), "Starting SSU listener");
    warn!("No SessionConfirmed codec installed; inbound handshakes stop at CreatedSent");

    let options = ListenerOptions::new(Arc::new(identity), intro_key).with_config(config.handshake.clone());
    let mut listener = Listener::bind(config.listen_addr(), options)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok(conn) => {
                        tokio::spawn(echo(conn));
                    }
                    Err(NodeError::Closed) => break,
                    Err(e) => warn!(error = %e, "Accept failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    listener.close().await?;
    Ok(())
}

/// Dials one peer, sends `message` and prints the reply.
async fn cmd_dial(
    config_path: &Path,
    peer: SocketAddr,
    identity: &str,
    intro_key: &str,
    message: &str,
    wait: Duration,
) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);

    let identity = IdentityPublicKey::from_base64(identity).context("invalid --identity")?;
    let intro_key = IntroKey::from_base64(intro_key).context("invalid --intro-key")?;
    let remote = RemotePeer::new(peer, intro_key, identity);

    let conn = Dialer::new(config.handshake.clone())
        .dial(&remote)
        .await
        .with_context(|| format!("handshake with {peer} failed"))?;
    info!(%peer, local = %conn.local_addr(), "Connected");

    conn.write(message.as_bytes()).await?;
    conn.set_read_deadline(Some(tokio::time::Instant::now() + wait));

    let mut buf = vec![0u8; ssu_node::services::connection::MAX_DATA_CHUNK];
    let result = conn.read(&mut buf).await;
    conn.close().await?;

    let n = result.context("no reply")?;
    println!("{}", String::from_utf8_lossy(&buf[..n]));
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

async fn echo(conn: SessionConnection) {
    let peer = conn.remote_addr();
    let mut buf = vec![0u8; ssu_node::services::connection::MAX_DATA_CHUNK];

    loop {
        let n = match conn.read(&mut buf).await {
            Ok(n) => n,
            Err(NodeError::Closed) => break,
            Err(e) => {
                warn!(%peer, error = %e, "Read failed");
                break;
            }
        };
        if let Err(e) = conn.write(&buf[..n]).await {
            warn!(%peer, error = %e, "Echo failed");
            break;
        }
    }

    if let Err(e) = conn.close().await {
        debug!(%peer, error = %e, "Close failed");
    }
}

/// Initializes the tracing subscriber.
///
/// Only the first call installs a subscriber; later calls are no-ops.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads config, falling back to defaults when the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<NodeConfig> {
    if path.exists() {
        Ok(NodeConfig::load(path).await?)
    } else {
        debug!(path = %path.display(), "Config file not found, using defaults");
        Ok(NodeConfig::default())
    }
}

/// Loads an identity key from a JSON file.
async fn load_key(path: &Path) -> anyhow::Result<IdentityKeyPair> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read key file {} (run keygen)", path.display()))?;
    let key_data: KeyFile = serde_json::from_str(&content)?;

    if key_data.key_type != "ed25519" {
        bail!("unsupported key type '{}'", key_data.key_type);
    }
    let private_bytes = base64::engine::general_purpose::STANDARD.decode(&key_data.private_key)?;
    Ok(IdentityKeyPair::from_bytes(&private_bytes)?)
}

/// Saves an identity key to a JSON file.
async fn save_key(identity: &IdentityKeyPair, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let key_data = KeyFile {
        version: "1.0".to_string(),
        key_type: "ed25519".to_string(),
        public_key: base64::engine::general_purpose::STANDARD.encode(identity.public_key_bytes()),
        private_key: base64::engine::general_purpose::STANDARD.encode(identity.to_bytes()),
        created_at: Timestamp::now().as_secs(),
    };

    let content = serde_json::to_string_pretty(&key_data)?;
    tokio::fs::write(path, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

/// Identity key file format.
#[derive(serde::Serialize, serde::Deserialize)]
struct KeyFile {
    version: String,
    key_type: String,
    public_key: String,
    private_key: String,
    /// Unix seconds.
    created_at: u32,
}
