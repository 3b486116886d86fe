// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - content acquisition engine.
//!
//! Binary entry point: loads configuration, installs logging and dispatches
//! to the subcommands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;
mod records;
mod resolve;
mod runtime;
mod serve;
mod token;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;

/// Courier - resolve vending-bot links into relocated media and access links.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve one or more links and print the minted access links.
    Resolve {
        #[arg(required = true, value_name = "LINK")]
        links: Vec<String>,
    },
    /// Read links from stdin, one per line, and resolve them as they arrive.
    Serve,
    /// Encode or decode access tokens.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// List persisted link records.
    Records {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print the records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check configuration, database and bridge health.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Mint a token for a stored message, or an inclusive range with `--end`.
    Encode {
        index: u64,
        #[arg(long, value_name = "INDEX")]
        end: Option<u64>,
    },
    /// Decode a bare token or a full access link.
    Decode {
        #[arg(value_name = "TOKEN|URL")]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let Cli { config: config_path, command } = Cli::parse();

    let loaded = match &config_path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    if let Err(e) = run(command, &config, config_path.as_deref()).await {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}

async fn run(
    command: Commands,
    config: &CourierConfig,
    config_path: Option<&Path>,
) -> Result<(), courier_core::CourierError> {
    match command {
        Commands::Resolve { links } => resolve::run_resolve(config, &links).await,
        Commands::Serve => serve::run_serve(config).await,
        Commands::Token { action } => {
            let output = match action {
                TokenAction::Encode { index, end } => token::encode(config, index, end)?,
                TokenAction::Decode { token } => token::decode(config, &token)?,
            };
            println!("{output}");
            Ok(())
        }
        Commands::Records { limit, json } => records::run_records(config, limit, json).await,
        Commands::Doctor { plain } => doctor::run_doctor(config, config_path, plain).await,
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc can advance the epoch; the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    #[serial_test::serial]
    fn binary_loads_config_defaults() {
        let config = courier_config::load_and_validate_str("").expect("defaults should be valid");
        assert_eq!(config.agent.name, "courier");
        assert_eq!(config.engine.max_link_retries, 3);
    }

    #[test]
    fn cli_parses_token_range() {
        let cli = Cli::try_parse_from(["courier", "token", "encode", "10", "--end", "12"]).unwrap();
        match cli.command {
            Commands::Token {
                action: TokenAction::Encode { index, end },
            } => {
                assert_eq!(index, 10);
                assert_eq!(end, Some(12));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn resolve_requires_a_link() {
        assert!(Cli::try_parse_from(["courier", "resolve"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["courier", "records", "--json", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Records { json: true, limit: 20 }));
    }
}
