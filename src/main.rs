//! IRC Bridge - Main binary

use clap::{Parser, Subcommand};
use ircbridge_core::{send_once, CommandQueue, Config, Daemon, FileStore, MemoryStore, TcpConnector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// IRC Bridge - keep an IRC channel connection alive behind a file-based control queue
#[derive(Parser)]
#[command(name = "ircbridge")]
#[command(about = "A persistent IRC bridge daemon controlled through plain files")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "ircbridge.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Test configuration and exit
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run {
        /// Server hostname
        server: Option<String>,
        /// Server port
        port: Option<u16>,
        /// Channel to join, e.g. "#agents"
        channel: Option<String>,
        /// Nickname
        nickname: Option<String>,
        /// Directory for commands.txt, inbox.txt, outbox.txt and status.txt
        #[arg(long)]
        control_dir: Option<PathBuf>,
    },
    /// Connect, send one message to a channel, and disconnect
    Send {
        server: String,
        port: u16,
        channel: String,
        nickname: String,
        message: String,
    },
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "ircbridge.toml")]
        output: PathBuf,
    },
    /// Print the daemon's current status line
    Status {
        #[arg(long)]
        control_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    let mut config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config { output }) => {
            generate_config(&output)?;
            return Ok(());
        }
        Some(Commands::Status { control_dir }) => {
            let directory = control_dir.unwrap_or(config.control.directory);
            show_status(&directory)?;
            return Ok(());
        }
        Some(Commands::Send { server, port, channel, nickname, message }) => {
            config.server.host = server;
            config.server.port = port;
            config.identity.channel = channel;
            config.identity.nickname = nickname;
            config.validate()?;

            let connector = TcpConnector::new(config.timing.registration_timeout());
            let control = CommandQueue::new(Arc::new(MemoryStore::new()));
            send_once(
                &connector,
                &config.session_settings(),
                control,
                &config.identity.channel,
                &message,
            )
            .await?;
            return Ok(());
        }
        Some(Commands::Run { server, port, channel, nickname, control_dir }) => {
            if let Some(server) = server {
                config.server.host = server;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(channel) = channel {
                config.identity.channel = channel;
            }
            if let Some(nickname) = nickname {
                config.identity.nickname = nickname;
            }
            if let Some(directory) = control_dir {
                config.control.directory = directory;
            }
        }
        None => {}
    }

    // Test configuration if requested
    if cli.test_config {
        config.validate()?;
        info!("Configuration is valid");
        return Ok(());
    }

    config.validate()?;
    run_daemon(config).await
}

/// Load the config file if present, defaults otherwise
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        info!("Loading configuration from {:?}", path);
        Ok(Config::from_file(path)?)
    } else {
        info!("Configuration file not found, using defaults");
        Ok(Config::default())
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let directory = config.control.directory.clone();
    let store = FileStore::open(&directory).await?;
    info!("Starting IRC bridge...");
    info!("Control files in {:?}", directory);
    info!("  Send: echo 'SEND {} Hello!' >> {:?}", config.identity.channel, store.commands_path());
    info!("  View: tail -f {:?}", store.inbox_path());
    info!("  Stop: echo 'QUIT' >> {:?}", store.commands_path());

    let connector = Arc::new(TcpConnector::new(config.timing.registration_timeout()));
    let daemon = Daemon::new(&config, connector, Arc::new(store));

    let shutdown = daemon.shutdown_token();
    tokio::spawn(watch_signals(shutdown));

    let outcome = daemon.run().await?;
    info!("Daemon exited after {} reconnect(s)", outcome.reconnects);
    Ok(())
}

/// Cancel the shutdown token on Ctrl-C or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Keyboard interrupt received"),
                    _ = term.recv() => info!("Terminate signal received"),
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Keyboard interrupt received");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Keyboard interrupt received");
    }

    shutdown.cancel();
}

/// Initialize logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    Ok(())
}

/// Generate default configuration file
fn generate_config(output: &Path) -> anyhow::Result<()> {
    let config = Config::default();
    config.to_file(output)?;
    println!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Print the status file
fn show_status(directory: &Path) -> anyhow::Result<()> {
    let path = directory.join(ircbridge_core::control::STATUS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(status) => print!("{}", status),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("No status at {:?}", path),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
