//! Strongbox Vault
//!
//! The single service object behind every request handler. Owns:
//!
//! - the ecash [`LedgerAggregator`]
//! - the dead man's switch [`DeadmanMonitor`]
//! - the duress-aware [`AccessResolver`]
//!
//! and talks to the injected [`WalletAdapter`] and optional
//! [`HardwareSigner`].
//!
//! # Concurrency
//!
//! Ledger and switch state sit behind their own mutexes. No lock is held while
//! the wallet adapter or the liveness witness is in flight: adapter calls run
//! on the blocking pool under a timeout, and a failed or slow adapter reports
//! zero on-chain funds rather than stalling the status.

pub mod access;
pub mod ledger;

pub use access::{AccessError, AccessMode, AccessResolver};
pub use ledger::{LedgerAggregator, LedgerError, LogEntry, Redemption, VaultLedger};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strongbox_deadman::{DeadmanMonitor, SwitchStatus};
use strongbox_wallet::{DeviceInfo, HardwareSigner, WalletAdapter};

/// Number of audit log entries reported by [`Vault::status`].
pub const STATUS_LOG_WINDOW: usize = 5;

/// Default bound on the on-chain balance query.
pub const DEFAULT_ONCHAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the vault is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Offline,
    Connected,
}

/// Per-rail balances in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub onchain: u64,
    pub ecash: u64,
}

/// Full vault status, as reported to the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStatus {
    /// Total across both rails
    pub balance: u64,
    pub breakdown: BalanceBreakdown,
    pub connection: ConnectionState,
    /// Wallet receive address, if the adapter answered
    pub address: Option<String>,
    /// Most recent audit log entries, oldest first
    pub logs: Vec<LogEntry>,
    pub cold_storage: String,
}

/// What the wallet adapter reported for one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnchainSnapshot {
    pub balance: u64,
    pub address: Option<String>,
}

/// The vault service.
pub struct Vault {
    ledger: LedgerAggregator,
    deadman: Arc<DeadmanMonitor>,
    access: AccessResolver,
    wallet: Arc<dyn WalletAdapter>,
    signer: Option<Arc<dyn HardwareSigner>>,
    cold_storage: String,
    onchain_timeout: Duration,
    connected: AtomicBool,
}

impl Vault {
    pub fn new(
        ledger: LedgerAggregator,
        deadman: Arc<DeadmanMonitor>,
        access: AccessResolver,
        wallet: Arc<dyn WalletAdapter>,
    ) -> Self {
        Self {
            ledger,
            deadman,
            access,
            wallet,
            signer: None,
            cold_storage: String::new(),
            onchain_timeout: DEFAULT_ONCHAIN_TIMEOUT,
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn HardwareSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_cold_storage(mut self, address: impl Into<String>) -> Self {
        self.cold_storage = address.into();
        self
    }

    pub fn with_onchain_timeout(mut self, timeout: Duration) -> Self {
        self.onchain_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &LedgerAggregator {
        &self.ledger
    }

    pub fn deadman(&self) -> &Arc<DeadmanMonitor> {
        &self.deadman
    }

    pub fn cold_storage(&self) -> &str {
        &self.cold_storage
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn connection(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Offline
        }
    }

    /// Query the wallet adapter. Failures and timeouts yield zero.
    pub async fn onchain_snapshot(&self) -> OnchainSnapshot {
        let wallet = Arc::clone(&self.wallet);
        let job = tokio::task::spawn_blocking(move || (wallet.get_balance(), wallet.get_address()));

        match tokio::time::timeout(self.onchain_timeout, job).await {
            Ok(Ok((balance, address))) => {
                let balance = balance.unwrap_or_else(|e| {
                    log::warn!("On-chain balance unavailable, reporting 0: {}", e);
                    0
                });
                let address = address
                    .map_err(|e| log::warn!("Wallet address unavailable: {}", e))
                    .ok();
                OnchainSnapshot { balance, address }
            }
            Ok(Err(e)) => {
                log::warn!("Wallet query task aborted, reporting 0: {}", e);
                OnchainSnapshot {
                    balance: 0,
                    address: None,
                }
            }
            Err(_) => {
                log::warn!(
                    "Wallet query timed out after {:?}, reporting 0",
                    self.onchain_timeout
                );
                OnchainSnapshot {
                    balance: 0,
                    address: None,
                }
            }
        }
    }

    /// Aggregate status across both rails.
    pub async fn status(&self) -> VaultStatus {
        let onchain = self.onchain_snapshot().await;
        let (ecash, logs) = self.ledger.snapshot(STATUS_LOG_WINDOW);

        VaultStatus {
            balance: onchain.balance.saturating_add(ecash),
            breakdown: BalanceBreakdown {
                onchain: onchain.balance,
                ecash,
            },
            connection: self.connection(),
            address: onchain.address,
            logs,
            cold_storage: self.cold_storage.clone(),
        }
    }

    pub fn unlock(&self, secret: &str) -> AccessMode {
        let mode = self.access.resolve(secret);
        match mode {
            AccessMode::Locked => log::info!("Unlock attempt rejected"),
            // Logged like a normal unlock so the log does not betray the duress PIN.
            AccessMode::Duress | AccessMode::FullAccess => log::info!("Vault unlocked"),
        }
        mode
    }

    pub fn receive_ecash(&self, token: &str) -> Redemption {
        self.ledger.receive_token(token)
    }

    pub async fn heartbeat(&self) -> SwitchStatus {
        self.deadman.heartbeat().await
    }

    pub fn deadman_status(&self) -> SwitchStatus {
        self.deadman.status()
    }

    /// Look for the hardware signer. `None` if absent or not configured.
    pub fn scan_signer(&self) -> Option<DeviceInfo> {
        let signer = self.signer.as_ref()?;
        match signer.scan() {
            Ok(device) => device,
            Err(e) => {
                log::warn!("Hardware signer scan failed: {}", e);
                None
            }
        }
    }

    /// Cold-storage address from the hardware signer.
    pub fn signer_address(&self) -> Option<String> {
        let signer = self.signer.as_ref()?;
        signer
            .cold_address()
            .map_err(|e| log::warn!("Hardware signer address unavailable: {}", e))
            .ok()
    }
}
