//! minechat CLI
//!
//! Single binary for the minechat client:
//! - `chat`: supervised read and send sessions with a liveness watchdog
//! - `listen`: read-only listener that keeps the history file
//! - `send`: one authenticated message
//! - `register`: obtain and save an account token
//! - `config`: show or write the configuration file

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mc_client::sinks::{preload_history, ConsoleSink, HistoryWriter, TracingStatusSink};
use mc_client::{connection, outbound_queue, register, LivenessSender, SendSession, Supervisor};
use mc_core::config::{self, ClientConfig};
use mc_core::credential::FileCredentialStore;
use mc_core::traits::{CredentialStore, LineSink, StatusSink};
use mc_core::SessionError;

/// Messages typed ahead of a slow send session
const OUTBOUND_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "minechat")]
#[command(author, version, about = "Resilient minechat client")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "MINECHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Chat server hostname (overrides config)
    #[arg(long, global = true, env = "MINECHAT_HOST")]
    host: Option<String>,

    /// Port broadcasting the chat stream
    #[arg(long, global = true, env = "MINECHAT_PORT")]
    port: Option<u16>,

    /// Port accepting messages
    #[arg(long, global = true, env = "MINECHAT_SEND_PORT")]
    send_port: Option<u16>,

    /// Token file written by `register`
    #[arg(long, global = true, env = "MINECHAT_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Chat history file
    #[arg(long, global = true, env = "MINECHAT_HISTORY")]
    history: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "MINECHAT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the chat and send lines typed on stdin
    Chat,

    /// Read the chat and keep the history file, without sending
    Listen,

    /// Send one message and exit
    Send {
        /// Message text
        #[arg(short, long)]
        message: String,
    },

    /// Register a new account and save its token
    Register {
        /// Nickname to register
        #[arg(short, long, default_value = "anonymous")]
        nickname: String,
        /// Overwrite an existing token file
        #[arg(short, long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = match &cli.command {
        // The file may not exist yet
        Commands::Config {
            action: ConfigAction::Init { .. },
        } => apply_overrides(&cli, ClientConfig::default()),
        _ => load_client_config(&cli)?,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down...");
            ctrl_c_token.cancel();
        }
    });

    match cli.command {
        Commands::Chat => run_chat(config, cancel).await,
        Commands::Listen => run_listen(config, cancel).await,
        Commands::Send { message } => run_send(config, message, cancel).await,
        Commands::Register { nickname, force } => run_register(config, &nickname, force).await,
        Commands::Config { action } => run_config(action, config, &config_path),
    }
}

/// Load the config file, then apply command-line overrides
fn load_client_config(cli: &Cli) -> Result<ClientConfig> {
    let config: ClientConfig = if let Some(path) = &cli.config {
        config::load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ClientConfig::default()
            })
        } else {
            ClientConfig::default()
        }
    };

    let config = apply_overrides(cli, config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(cli: &Cli, mut config: ClientConfig) -> ClientConfig {
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if let Some(port) = cli.send_port {
        config.send_port = port;
    }
    if let Some(path) = &cli.token_file {
        config.token_file = path.clone();
    }
    if let Some(path) = &cli.history {
        config.history_file = path.clone();
    }
    config
}

async fn run_chat(config: ClientConfig, cancel: CancellationToken) -> Result<()> {
    let store = FileCredentialStore::new(&config.token_file);
    let history_path = config::expand_home(&config.history_file);

    let display: Arc<dyn LineSink> = Arc::new(ConsoleSink);
    preload_history(&history_path, display.as_ref())
        .await
        .with_context(|| format!("Failed to read history from {:?}", history_path))?;
    let (history, history_task) = HistoryWriter::spawn(&history_path)
        .await
        .with_context(|| format!("Failed to open history file {:?}", history_path))?;

    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    spawn_stdin_reader(tx);

    let status: Arc<dyn StatusSink> = Arc::new(TracingStatusSink);
    let supervisor = Supervisor::new(config, display, Arc::new(history), status);
    let result = supervisor.run_forever(&store, outbound_queue(rx), cancel).await;

    drop(supervisor);
    if let Err(e) = history_task.await {
        tracing::warn!("History writer task failed: {}", e);
    }
    result.map_err(anyhow::Error::from)
}

async fn run_listen(config: ClientConfig, cancel: CancellationToken) -> Result<()> {
    let history_path = config::expand_home(&config.history_file);
    let (history, history_task) = HistoryWriter::spawn(&history_path)
        .await
        .with_context(|| format!("Failed to open history file {:?}", history_path))?;

    let supervisor = Supervisor::new(
        config,
        Arc::new(ConsoleSink),
        Arc::new(history),
        Arc::new(TracingStatusSink),
    );
    let result = supervisor.run_listen_forever(cancel).await;

    drop(supervisor);
    if let Err(e) = history_task.await {
        tracing::warn!("History writer task failed: {}", e);
    }
    result.map_err(anyhow::Error::from)
}

/// Send one message through a send session whose queue holds only that message
async fn run_send(config: ClientConfig, message: String, cancel: CancellationToken) -> Result<()> {
    let store = FileCredentialStore::new(&config.token_file);
    let credential = store.load().await?;

    let (tx, rx) = mpsc::channel::<String>(1);
    tx.send(message).await.context("Failed to queue message")?;
    drop(tx);

    let session = SendSession::new(
        &config,
        credential,
        Arc::new(TracingStatusSink),
        LivenessSender::detached(),
    );
    match session.run(outbound_queue(rx), cancel).await {
        Err(SessionError::Shutdown) => {
            tracing::info!("Message sent");
            Ok(())
        }
        Err(SessionError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
        Ok(()) => Ok(()),
    }
}

async fn run_register(config: ClientConfig, nickname: &str, force: bool) -> Result<()> {
    let store = FileCredentialStore::new(&config.token_file);
    if store.exists() && !force {
        anyhow::bail!(
            "Token file {:?} already exists. Use --force to overwrite it.",
            store.path()
        );
    }

    let mut conn = connection::connect(&config.send_address(), config.connect_timeout).await?;
    let account = register(&mut conn, nickname).await;
    connection::close(conn).await;
    let account = account.context("Registration failed")?;

    store.save(&account).await?;
    println!("{}", serde_json::to_string_pretty(&account)?);
    Ok(())
}

fn run_config(action: ConfigAction, config: ClientConfig, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file {:?} already exists. Use --force to overwrite it.",
                    path
                );
            }
            config.validate().context("Invalid configuration")?;
            config::save_config(path, &config)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Forward stdin lines to the outbound queue from a dedicated thread.
///
/// Blocking stdin reads on a runtime thread would hold up shutdown.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        tracing::debug!("stdin closed");
    });
}
