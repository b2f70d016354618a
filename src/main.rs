//! Binary entry point for nova.
//!
//! Runs the HTTP service, applies schema migrations, or writes a default
//! configuration file.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use nova::cache::DataCache;
use nova::config::NovaConfig;
use nova::http::{self, AppState};
use nova::observability;
use nova::storage::schema;
use nova::{Context, Database};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Configuration file read when `--config` is not given, if it exists.
const DEFAULT_CONFIG_FILE: &str = "nova.yaml";

/// Nova - users and questions over an embedded database.
#[derive(Parser)]
#[command(name = "nova")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = "NOVA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve,

    /// Apply pending schema migrations and exit.
    Migrate,

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration.
    Init {
        /// Destination file.
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration.
    Show,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration: the given file, else `nova.yaml` if present, else
/// defaults, then environment overrides.
fn load_config(path: Option<&Path>) -> Result<NovaConfig> {
    let config = match path {
        Some(path) => NovaConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => NovaConfig::load(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("loading {DEFAULT_CONFIG_FILE}"))?,
        None => NovaConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Runs the selected command.
async fn run_command(command: Commands, config: NovaConfig) -> Result<()> {
    match command {
        Commands::Serve => cmd_serve(config).await,
        Commands::Migrate => cmd_migrate(&config).await,
        Commands::Config {
            action: ConfigAction::Init { path, force },
        } => cmd_config_init(&path, force),
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            let yaml = serde_yaml_ng::to_string(&config).context("rendering configuration")?;
            print!("{yaml}");
            Ok(())
        },
    }
}

fn open_database(config: &NovaConfig) -> Result<Database> {
    let path = config.database.path.to_string_lossy();
    Database::open(&path, config.database_config())
        .with_context(|| format!("opening database {path}"))
}

fn listen_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("invalid listen address {host}"))?;
    Ok(SocketAddr::new(ip, port))
}

async fn cmd_migrate(config: &NovaConfig) -> Result<()> {
    let db = open_database(config)?;
    let applied = schema::migrate(&db, &Context::background()).await?;
    println!(
        "Applied {applied} migration(s); schema at version {}",
        db.migration_version()
    );
    db.close()?;
    Ok(())
}

fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    NovaConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn cmd_serve(config: NovaConfig) -> Result<()> {
    config.tls.validate()?;
    if config.tls.enabled() {
        tracing::warn!(
            tls_type = %config.tls.tls_type,
            "TLS termination is not built in; serving plain HTTP"
        );
    }

    let db = Arc::new(open_database(&config)?);
    let ctx = Context::background();
    schema::migrate(&db, &ctx).await?;

    if config.database.debug {
        observability::install_prometheus(listen_addr(&config.ipv4_addr, config.debug_port)?)?;
    }

    let cache = DataCache::from_config(&config.cache)?;
    let state = AppState::new(Arc::clone(&db), cache);
    state.warm_cache(&ctx).await?;

    let addr = listen_addr(&config.ipv4_addr, config.port)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(fqdn = %config.fqdn, %addr, "Starting nova");

    let served = http::serve(listener, http::router(state), shutdown_signal()).await;
    db.close()?;
    tracing::info!("Database closed");
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
