//! Server configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strongbox_deadman::DeadmanConfig;
use strongbox_vault::access::{DEFAULT_DURESS_PIN, DEFAULT_FULL_ACCESS_PIN};

/// Top-level server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener, data directory and logging
    #[serde(default)]
    pub server: ServerSection,

    /// On-chain wallet backend
    #[serde(default)]
    pub wallet: WalletSection,

    #[serde(default)]
    pub vault: VaultSection,

    /// Dead man's switch timing
    #[serde(default)]
    pub deadman: DeadmanConfig,

    /// Unlock PINs
    #[serde(default)]
    pub access: AccessSection,

    /// Liveness proof on heartbeat
    #[serde(default)]
    pub witness: WitnessSection,

    /// What to release when the switch fires
    #[serde(default)]
    pub recovery: RecoverySection,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// HTTP listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Data directory (ledger, liveness proofs, release output)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Which wallet adapter backs the on-chain balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletBackend {
    Electrum,
    Mock,
}

/// On-chain wallet settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSection {
    #[serde(default = "default_backend")]
    pub backend: WalletBackend,

    /// Bitcoin network: "bitcoin", "testnet", "signet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Electrum server URL
    #[serde(default = "default_electrum_url")]
    pub electrum_url: String,

    /// Watched receive address. Required for the electrum backend.
    #[serde(default)]
    pub address: Option<String>,

    /// Upper bound on a single balance query
    #[serde(default = "default_balance_timeout")]
    pub balance_timeout_secs: u64,

    /// Count mempool funds in the balance
    #[serde(default)]
    pub include_unconfirmed: bool,

    /// Balance reported by the mock backend
    #[serde(default)]
    pub mock_balance_sats: u64,
}

impl Default for WalletSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            network: default_network(),
            electrum_url: default_electrum_url(),
            address: None,
            balance_timeout_secs: default_balance_timeout(),
            include_unconfirmed: false,
            mock_balance_sats: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSection {
    /// Cold-storage address shown to the owner
    #[serde(default = "default_cold_storage")]
    pub cold_storage_address: String,

    /// Keep the ecash ledger at `<data_dir>/ledger.json`
    #[serde(default = "default_true")]
    pub persist_ledger: bool,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            cold_storage_address: default_cold_storage(),
            persist_ledger: true,
        }
    }
}

/// Unlock PINs
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessSection {
    #[serde(default = "default_full_access_pin")]
    pub full_access_pin: String,

    #[serde(default = "default_duress_pin")]
    pub duress_pin: String,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            full_access_pin: default_full_access_pin(),
            duress_pin: default_duress_pin(),
        }
    }
}

impl AccessSection {
    /// Still using the well-known demo PINs.
    pub fn uses_default_pins(&self) -> bool {
        self.full_access_pin == DEFAULT_FULL_ACCESS_PIN || self.duress_pin == DEFAULT_DURESS_PIN
    }
}

// PINs never reach the logs.
impl std::fmt::Debug for AccessSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSection")
            .field("full_access_pin", &"<redacted>")
            .field("duress_pin", &"<redacted>")
            .finish()
    }
}

/// Where liveness proofs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WitnessKind {
    None,
    Journal,
    Calendar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessSection {
    #[serde(default = "default_witness_kind")]
    pub kind: WitnessKind,

    /// OpenTimestamps calendar server
    #[serde(default = "default_calendar_url")]
    pub calendar_url: String,

    #[serde(default = "default_witness_timeout")]
    pub timeout_secs: u64,
}

impl Default for WitnessSection {
    fn default() -> Self {
        Self {
            kind: default_witness_kind(),
            calendar_url: default_calendar_url(),
            timeout_secs: default_witness_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoverySection {
    /// Encrypted recovery bundle copied into the release directory
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,

    /// Heirs to contact on release
    #[serde(default)]
    pub heirs: Vec<HeirContact>,
}

/// Heir contact information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeirContact {
    /// Human-readable label
    pub label: String,

    /// Heir's npub
    pub npub: Option<String>,

    /// Heir's email
    pub email: Option<String>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> WalletBackend {
    WalletBackend::Electrum
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_electrum_url() -> String {
    strongbox_wallet::default_server(bitcoin::Network::Testnet).to_string()
}

fn default_balance_timeout() -> u64 {
    5
}

fn default_cold_storage() -> String {
    "tb1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_full_access_pin() -> String {
    DEFAULT_FULL_ACCESS_PIN.to_string()
}

fn default_duress_pin() -> String {
    DEFAULT_DURESS_PIN.to_string()
}

fn default_witness_kind() -> WitnessKind {
    WitnessKind::None
}

fn default_calendar_url() -> String {
    strongbox_deadman::witness::DEFAULT_CALENDAR.to_string()
}

fn default_witness_timeout() -> u64 {
    10
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `STRONGBOX_BIND`
    /// - `STRONGBOX_DATA_DIR`
    /// - `STRONGBOX_LOG_LEVEL`
    /// - `STRONGBOX_NETWORK`
    /// - `STRONGBOX_ELECTRUM_URL`
    /// - `STRONGBOX_WALLET_ADDRESS`
    /// - `STRONGBOX_DMS_TIMEOUT`
    /// - `STRONGBOX_FULL_ACCESS_PIN`
    /// - `STRONGBOX_DURESS_PIN`
    ///
    /// Fails on a value that cannot be parsed for its field.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("STRONGBOX_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("STRONGBOX_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("STRONGBOX_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Some(v) = var("STRONGBOX_NETWORK") {
            self.wallet.network = v;
        }
        if let Some(v) = var("STRONGBOX_ELECTRUM_URL") {
            self.wallet.electrum_url = v;
        }
        if let Some(v) = var("STRONGBOX_WALLET_ADDRESS") {
            self.wallet.address = Some(v);
        }
        if let Some(v) = var("STRONGBOX_DMS_TIMEOUT") {
            self.deadman.timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("STRONGBOX_DMS_TIMEOUT={:?} is not a number of seconds", v))?;
        }
        if let Some(v) = var("STRONGBOX_FULL_ACCESS_PIN") {
            self.access.full_access_pin = v;
        }
        if let Some(v) = var("STRONGBOX_DURESS_PIN") {
            self.access.duress_pin = v;
        }
        Ok(())
    }

    pub fn network(&self) -> bitcoin::Network {
        strongbox_wallet::parse_network(&self.wallet.network)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    pub fn balance_timeout(&self) -> Duration {
        Duration::from_secs(self.wallet.balance_timeout_secs)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.server.data_dir.join("ledger.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.server.data_dir.join("liveness.jsonl")
    }

    pub fn receipt_dir(&self) -> PathBuf {
        self.server.data_dir.join("ots")
    }

    pub fn release_dir(&self) -> PathBuf {
        self.server.data_dir.join("release")
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        anyhow::ensure!(
            strongbox_wallet::try_parse_network(&self.wallet.network).is_some(),
            "wallet.network {:?} is not one of bitcoin, testnet, signet, regtest",
            self.wallet.network
        );

        anyhow::ensure!(
            self.wallet.balance_timeout_secs > 0,
            "wallet.balance_timeout_secs must be > 0"
        );

        if self.wallet.backend == WalletBackend::Electrum {
            let address = self.wallet.address.as_deref().unwrap_or_default();
            anyhow::ensure!(
                !address.is_empty(),
                "wallet.address is required for the electrum backend"
            );
            anyhow::ensure!(
                !self.wallet.electrum_url.is_empty(),
                "wallet.electrum_url must not be empty"
            );
        }

        anyhow::ensure!(
            !self.vault.cold_storage_address.is_empty(),
            "vault.cold_storage_address must not be empty"
        );

        self.deadman
            .validate()
            .context("Invalid [deadman] section")?;

        anyhow::ensure!(
            !self.access.full_access_pin.is_empty() && !self.access.duress_pin.is_empty(),
            "access PINs must not be empty"
        );
        anyhow::ensure!(
            self.access.full_access_pin != self.access.duress_pin,
            "access.full_access_pin and access.duress_pin must differ"
        );

        if self.witness.kind != WitnessKind::None {
            anyhow::ensure!(
                self.witness.timeout_secs > 0,
                "witness.timeout_secs must be > 0"
            );
        }
        if self.witness.kind == WitnessKind::Calendar {
            anyhow::ensure!(
                self.witness.calendar_url.starts_with("https://")
                    || self.witness.calendar_url.starts_with("http://"),
                "witness.calendar_url must be an http(s) URL"
            );
        }

        for heir in &self.recovery.heirs {
            anyhow::ensure!(!heir.label.is_empty(), "recovery.heirs label must not be empty");
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
