#![deny(unsafe_code)]

//! banbridge CLI: HTTP bridge and one-shot client for the fail2ban socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use banbridge_config::AppConfig;
use banbridge_core::api::ApiState;
use banbridge_core::{build_info, BridgeClient, Command, StatusParser};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// banbridge: talk to fail2ban over its control socket.
#[derive(Parser, Debug)]
#[command(name = "banbridge", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "banbridge.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// fail2ban control socket, overriding the configured one.
    #[arg(long, env = "F2B_SOCKET", global = true)]
    socket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API and the web front end.
    Serve {
        /// Address to listen on.
        #[arg(long)]
        listen: Option<String>,

        /// Port to listen on.
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Directory served for non-API paths.
        #[arg(long, env = "STATIC_ROOT")]
        static_root: Option<String>,
    },

    /// Send a raw command and print the reply.
    Exec {
        /// Command tokens, e.g. `get sshd bantime`.
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,

        /// Print the decoded reply as JSON instead of flattened text.
        #[arg(long)]
        json: bool,
    },

    /// Show global status, or the status of one jail.
    Status {
        /// Jail name.
        jail: Option<String>,
    },

    /// List banned addresses across all jails.
    Banned,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, found) = load_config(&cli.config).await?;
    init_tracing(cli.verbose, &config.logging.level);
    if !found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    apply_overrides(&mut config, &cli);
    config
        .validate()
        .with_context(|| format!("invalid configuration in '{}'", cli.config.display()))?;

    match cli.command {
        Commands::Serve { .. } => cmd_serve(&config).await?,
        Commands::Exec { tokens, json } => cmd_exec(&config, tokens, json).await?,
        Commands::Status { jail } => cmd_status(&config, jail).await?,
        Commands::Banned => cmd_banned(&config).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

/// `RUST_LOG` wins, then `-v`, then the configured level.
fn init_tracing(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(socket) = &cli.socket {
        config.bridge.socket_path = socket.clone();
    }
    if let Commands::Serve {
        listen,
        port,
        static_root,
    } = &cli.command
    {
        if let Some(listen) = listen {
            config.server.listen_addr = listen.clone();
        }
        if let Some(port) = port {
            config.server.listen_port = *port;
        }
        if let Some(root) = static_root {
            config.server.static_root = root.clone();
        }
    }
}

async fn cmd_serve(config: &AppConfig) -> Result<()> {
    info!(version = %build_info::version_string(), "Starting banbridge");

    let state = ApiState::from_config(config).context("invalid status aliases")?;
    let addr = (config.server.listen_addr.as_str(), config.server.listen_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;

    banbridge_core::api::serve(listener, Arc::new(state), shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

async fn cmd_exec(config: &AppConfig, tokens: Vec<String>, json: bool) -> Result<()> {
    let command = Command::new(tokens)?;
    let reply = BridgeClient::from_config(&config.bridge).execute(&command).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", banbridge_core::flatten(&reply));
    }
    Ok(())
}

async fn cmd_status(config: &AppConfig, jail: Option<String>) -> Result<()> {
    let parser = StatusParser::new(&config.aliases).context("invalid status aliases")?;
    let client = BridgeClient::from_config(&config.bridge);

    let json = match jail {
        Some(jail) => {
            let reply = client.execute(&Command::new(["status".to_string(), jail])?).await?;
            serde_json::to_string_pretty(&parser.parse_unit_status(&reply))?
        }
        None => {
            let reply = client.execute(&Command::new(["status"])?).await?;
            serde_json::to_string_pretty(&parser.parse_global_status(&reply))?
        }
    };
    println!("{json}");
    Ok(())
}

async fn cmd_banned(config: &AppConfig) -> Result<()> {
    let client = BridgeClient::from_config(&config.bridge);
    let reply = client.execute(&Command::new(["banned"])?).await?;
    for ip in banbridge_core::collect_addresses(&reply) {
        println!("{ip}");
    }
    Ok(())
}

fn cmd_config(path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("TOML error")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", path.display());
    }
    Ok(())
}

/// Read the config file, or defaults when it does not exist. Validation
/// waits until the command-line overrides are applied.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if path.exists() {
        let config = AppConfig::read(path)
            .await
            .with_context(|| format!("failed to load '{}'", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_keeps_flag_like_tokens() {
        let cli = Cli::try_parse_from(["banbridge", "exec", "reload", "--unban", "sshd"]).unwrap();
        match cli.command {
            Commands::Exec { tokens, json } => {
                assert_eq!(tokens, vec!["reload", "--unban", "sshd"]);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_exec_requires_tokens() {
        assert!(Cli::try_parse_from(["banbridge", "exec"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "banbridge",
            "status",
            "sshd",
            "-vv",
            "--socket",
            "/tmp/f2b.sock",
            "--config",
            "other.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.socket.as_deref(), Some("/tmp/f2b.sock"));
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Commands::Status { jail: Some(ref j) } if j == "sshd"));
    }

    #[test]
    fn test_serve_overrides_apply() {
        let cli = Cli::try_parse_from([
            "banbridge",
            "--socket",
            "/run/f2b.sock",
            "serve",
            "--listen",
            "127.0.0.1",
            "--port",
            "8080",
            "--static-root",
            "/srv/www",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.bridge.socket_path, "/run/f2b.sock");
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(config.server.static_root, "/srv/www");
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_leave_unset_fields_alone() {
        let cli = Cli::try_parse_from(["banbridge", "banned"]).unwrap();
        let mut config = AppConfig::default();
        let before = config.server.listen_port;
        apply_overrides(&mut config, &cli);
        assert_eq!(config.server.listen_port, before);
    }

    #[tokio::test]
    async fn test_missing_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, found) = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert!(!found);
        assert_eq!(config.server.listen_port, AppConfig::default().server.listen_port);
    }

    #[tokio::test]
    async fn test_malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banbridge.toml");
        std::fs::write(&path, "[server\n").unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to load"));
    }

    #[tokio::test]
    async fn test_invalid_values_fail_after_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banbridge.toml");
        std::fs::write(&path, "[server]\nlisten_port = 0\n").unwrap();
        let (mut config, found) = load_config(&path).await.unwrap();
        assert!(found);

        let cli = Cli::try_parse_from(["banbridge", "banned"]).unwrap();
        apply_overrides(&mut config, &cli);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listen_port"));
    }

    #[tokio::test]
    async fn test_socket_flag_rescues_empty_configured_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banbridge.toml");
        std::fs::write(&path, "[bridge]\nsocket_path = \"\"\n").unwrap();
        let (mut config, _) = load_config(&path).await.unwrap();

        let cli = Cli::try_parse_from(["banbridge", "--socket", "/run/f2b.sock", "banned"]).unwrap();
        apply_overrides(&mut config, &cli);
        config.validate().unwrap();
        assert_eq!(config.bridge.socket_path, "/run/f2b.sock");
    }
}
