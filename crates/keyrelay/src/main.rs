// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! keyrelay - re-posts APK uploads to Telegram channels with a formatted key.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod supervisor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keyrelay_config::{ConfigError, KeyrelayConfig};

/// keyrelay - APK re-post bot.
#[derive(Parser, Debug)]
#[command(name = "keyrelay", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot until interrupted.
    Serve,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate configuration and exit.
    Check,
}

fn load(path: Option<&PathBuf>) -> Result<KeyrelayConfig, Vec<ConfigError>> {
    match path {
        Some(path) => keyrelay_config::load_and_validate_path(path),
        None => keyrelay_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            keyrelay_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config {
            action: ConfigAction::Check,
        }) => {
            println!(
                "keyrelay: config ok (owner={}, data_dir={})",
                config.access.owner_id, config.storage.data_dir
            );
        }
        None => {
            println!("keyrelay: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn parses_serve_with_config_path() {
        let cli = Cli::try_parse_from(["keyrelay", "serve", "--config", "/tmp/k.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/k.toml")));
    }

    #[test]
    fn parses_config_check() {
        let cli = Cli::try_parse_from(["keyrelay", "config", "check"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Check
            })
        ));
    }

    #[test]
    fn explicit_config_file_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyrelay.toml");
        std::fs::write(&path, "[access]\nowner_id = 0\n").unwrap();
        assert!(load(Some(&path)).is_err());

        std::fs::write(&path, "[access]\nowner_id = 77\n").unwrap();
        assert_eq!(load(Some(&path)).unwrap().access.owner_id, 77);
    }
}
