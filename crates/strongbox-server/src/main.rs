//! Strongbox Server: headless vault daemon
//!
//! # Usage
//!
//! ```bash
//! strongbox-server --config /path/to/strongbox.toml
//! strongbox-server --check     # Print one status snapshot and exit
//! strongbox-server --validate  # Validate config and exit
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use strongbox_server::config::ServerConfig;
use strongbox_server::{daemon, hardening};

fn main() -> Result<()> {
    // PINs live in memory for the whole run
    hardening::disable_core_dumps();

    // Electrum over SSL needs a process-wide rustls provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("/config/strongbox.toml");
    let mut one_shot = false;
    let mut validate_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--check" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("strongbox-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let mut server_config = ServerConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    server_config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    server_config
        .validate()
        .context("Configuration validation failed")?;

    std::env::set_var("RUST_LOG", &server_config.server.log_level);
    env_logger::init();

    if validate_only {
        println!("✅ Configuration is valid.");
        println!("  Bind:          {}", server_config.server.bind);
        println!("  Data dir:      {}", server_config.server.data_dir.display());
        println!("  Wallet:        {:?}", server_config.wallet.backend);
        println!("  Network:       {}", server_config.wallet.network);
        println!("  Electrum:      {}", server_config.wallet.electrum_url);
        println!("  DMS timeout:   {} secs", server_config.deadman.timeout_secs);
        println!(
            "  DMS interval:  {} secs",
            server_config.deadman.check_interval().as_secs()
        );
        println!("  Witness:       {:?}", server_config.witness.kind);
        println!("  Heirs:         {}", server_config.recovery.heirs.len());
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if one_shot {
        let status = rt.block_on(daemon::check_once(&server_config))?;
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let shutdown = rt.block_on(async {
            tokio::select! {
                result = daemon::run(server_config) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received shutdown signal. Exiting…");
                    Ok(())
                }
            }
        });

        if let Err(e) = shutdown {
            log::error!("Server error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"Strongbox Server: headless vault with a dead man's switch

USAGE:
    strongbox-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/strongbox.toml)
    --check               Print one status snapshot as JSON and exit
    --validate            Validate configuration and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    STRONGBOX_BIND             HTTP listen address
    STRONGBOX_DATA_DIR         Data directory path
    STRONGBOX_LOG_LEVEL        Log level (error/warn/info/debug/trace)
    STRONGBOX_NETWORK          Bitcoin network (bitcoin/testnet/signet/regtest)
    STRONGBOX_ELECTRUM_URL     Electrum server URL
    STRONGBOX_WALLET_ADDRESS   Watched on-chain address
    STRONGBOX_DMS_TIMEOUT      Dead man's switch timeout in seconds
    STRONGBOX_FULL_ACCESS_PIN  Full-access PIN
    STRONGBOX_DURESS_PIN       Duress PIN

EXAMPLES:
    # Run with a config file
    strongbox-server --config /path/to/strongbox.toml

    # One-off balance check
    strongbox-server --config strongbox.toml --check

    # Validate configuration
    strongbox-server --config strongbox.toml --validate
"#
    );
}
