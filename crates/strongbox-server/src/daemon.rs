//! Service wiring and the main server loop.

use crate::api;
use crate::config::{ServerConfig, WalletBackend, WitnessKind};
use crate::trigger::RecoveryRelease;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use strongbox_deadman::{CalendarWitness, DeadmanMonitor, DigestJournal, LivenessWitness};
use strongbox_vault::{AccessResolver, LedgerAggregator, Vault, VaultStatus};
use strongbox_wallet::{ElectrumWallet, MockHardwareSigner, MockWallet, WalletAdapter};

/// Build the wallet adapter selected by `[wallet]`.
pub fn build_wallet(config: &ServerConfig) -> Result<Arc<dyn WalletAdapter>> {
    match config.wallet.backend {
        WalletBackend::Electrum => {
            let address = config
                .wallet
                .address
                .as_deref()
                .context("wallet.address is required for the electrum backend")?;
            let wallet = ElectrumWallet::new(&config.wallet.electrum_url, config.network(), address)
                .context("Failed to set up Electrum wallet")?
                .include_unconfirmed(config.wallet.include_unconfirmed)
                .with_timeout(config.balance_timeout());
            Ok(Arc::new(wallet))
        }
        WalletBackend::Mock => {
            log::warn!("Using the mock wallet backend; balances are simulated.");
            let address = config.wallet.address.clone().unwrap_or_default();
            Ok(Arc::new(MockWallet::new(
                address,
                config.wallet.mock_balance_sats,
            )))
        }
    }
}

fn build_witness(config: &ServerConfig) -> Option<Arc<dyn LivenessWitness>> {
    match config.witness.kind {
        WitnessKind::None => None,
        WitnessKind::Journal => Some(Arc::new(DigestJournal::new(config.journal_path()))),
        WitnessKind::Calendar => Some(Arc::new(
            CalendarWitness::new(&config.witness.calendar_url, config.receipt_dir())
                .with_timeout(Duration::from_secs(config.witness.timeout_secs)),
        )),
    }
}

/// Assemble the vault service from configuration.
///
/// The dead man's switch is armed but its timer is not started.
pub fn build_vault(config: &ServerConfig) -> Result<Arc<Vault>> {
    let ledger = if config.vault.persist_ledger {
        std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
            format!(
                "Failed to create data directory {}",
                config.server.data_dir.display()
            )
        })?;
        LedgerAggregator::open(config.ledger_path()).context("Failed to open ledger")?
    } else {
        LedgerAggregator::new()
    };

    let mut monitor = DeadmanMonitor::from_config(&config.deadman)
        .context("Invalid dead man's switch configuration")?;
    if let Some(witness) = build_witness(config) {
        log::info!("Liveness proofs via {}", witness.name());
        monitor = monitor
            .with_witness(witness)
            .with_witness_timeout(Duration::from_secs(config.witness.timeout_secs));
    }
    let monitor = Arc::new(monitor);
    monitor.on_trigger(RecoveryRelease::from_config(config));

    let access = AccessResolver::new(&config.access.full_access_pin, &config.access.duress_pin)
        .context("Invalid access PINs")?;
    if config.access.uses_default_pins() {
        log::warn!("⚠️  Default demo PINs in use. Set [access] before storing real funds.");
    }

    let vault = Vault::new(ledger, monitor, access, build_wallet(config)?)
        .with_signer(Arc::new(MockHardwareSigner::new(
            config.vault.cold_storage_address.clone(),
        )))
        .with_cold_storage(config.vault.cold_storage_address.clone())
        .with_onchain_timeout(config.balance_timeout());

    Ok(Arc::new(vault))
}

/// Run the server until the listener fails.
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("Strongbox server starting…");
    log::info!("  Bind:       {}", config.server.bind);
    log::info!("  Network:    {}", config.wallet.network);
    log::info!("  Wallet:     {:?}", config.wallet.backend);
    log::info!("  Data dir:   {}", config.server.data_dir.display());
    log::info!(
        "  Dead man's switch: {}s timeout, heirs: {}",
        config.deadman.timeout_secs,
        config.recovery.heirs.len()
    );

    let vault = build_vault(&config)?;
    let timer = vault.deadman().spawn();

    let listener = tokio::net::TcpListener::bind(config.bind_addr()?)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    vault.set_connected(true);
    log::info!("Listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, api::create_router(Arc::clone(&vault))).await;

    vault.set_connected(false);
    timer.abort();
    served.context("HTTP server failed")
}

/// One status snapshot without starting the listener or the timer.
pub async fn check_once(config: &ServerConfig) -> Result<VaultStatus> {
    let vault = build_vault(config)?;
    Ok(vault.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use strongbox_vault::AccessMode;

    fn mock_config(data_dir: &Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.data_dir = data_dir.to_path_buf();
        config.wallet.backend = WalletBackend::Mock;
        config.wallet.address = Some("tb1qmock".into());
        config.wallet.mock_balance_sats = 20_000;
        config
    }

    #[tokio::test]
    async fn test_check_once_with_mock_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let status = check_once(&mock_config(dir.path())).await.unwrap();
        assert_eq!(status.balance, 20_000);
        assert_eq!(status.address.as_deref(), Some("tb1qmock"));
        assert_eq!(status.cold_storage, "tb1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh");
    }

    #[tokio::test]
    async fn test_persisted_ledger_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let config = mock_config(dir.path());

        let vault = build_vault(&config).unwrap();
        vault.ledger().credit(800).unwrap();
        drop(vault);

        assert!(config.ledger_path().exists());
        let status = check_once(&config).await.unwrap();
        assert_eq!(status.breakdown.ecash, 800);
        assert_eq!(status.balance, 20_800);
    }

    #[tokio::test]
    async fn test_in_memory_ledger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock_config(&dir.path().join("data"));
        config.vault.persist_ledger = false;

        let vault = build_vault(&config).unwrap();
        vault.ledger().credit(1).unwrap();
        assert!(!config.ledger_path().exists());
    }

    #[tokio::test]
    async fn test_configured_pins_apply() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock_config(dir.path());
        config.access.full_access_pin = "2468".into();
        config.access.duress_pin = "1357".into();

        let vault = build_vault(&config).unwrap();
        assert_eq!(vault.unlock("2468"), AccessMode::FullAccess);
        assert_eq!(vault.unlock("1357"), AccessMode::Duress);
        assert_eq!(vault.unlock("55555"), AccessMode::Locked);
    }

    #[tokio::test]
    async fn test_journal_witness_records_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock_config(dir.path());
        config.witness.kind = WitnessKind::Journal;

        let vault = build_vault(&config).unwrap();
        vault.heartbeat().await;
        assert!(config.journal_path().exists());
        assert!(vault.deadman().last_receipt().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_writes_release() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = mock_config(dir.path());
        config.vault.persist_ledger = false;
        config.deadman.timeout_secs = 10;

        let vault = build_vault(&config).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(vault.deadman().check().is_some());

        let manifest = config.release_dir().join(crate::trigger::MANIFEST_FILE);
        assert!(manifest.exists());
    }

    #[test]
    fn test_electrum_backend_needs_address() {
        let config = ServerConfig::default();
        assert!(build_wallet(&config).is_err());
    }

    #[test]
    fn test_electrum_wallet_bounded_by_balance_timeout() {
        // Accepts connections and never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });

        let mut config = ServerConfig::default();
        config.wallet.network = "testnet".into();
        config.wallet.electrum_url = format!("tcp://127.0.0.1:{}", port);
        config.wallet.address = Some("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".into());
        config.wallet.balance_timeout_secs = 1;

        let wallet = build_wallet(&config).unwrap();
        let started = std::time::Instant::now();
        assert!(wallet.get_balance().is_err());
        assert!(started.elapsed() < Duration::from_secs(8));
    }
}
