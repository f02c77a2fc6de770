//! Ecash ledger: balance, audit log and optional JSON persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors from ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Credit amount must be > 0")]
    ZeroAmount,

    #[error("Balance would overflow")]
    Overflow,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One audit log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Credited amount in satoshis
    pub amount: u64,
    pub message: String,
}

/// Ledger contents. Append-only log, most recent last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultLedger {
    pub ecash_balance: u64,
    pub audit_log: Vec<LogEntry>,
}

impl VaultLedger {
    /// Load from file, or start empty if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to file (write to a sibling temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Outcome of redeeming a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// Token accepted and balance credited.
    Credited { amount: u64, balance: u64 },
    /// Well-formed token worth nothing. Nothing credited.
    ZeroValue,
    /// Token could not be decoded. Nothing credited.
    Malformed,
    /// Token decoded but the balance cannot absorb it.
    Rejected,
}

impl Redemption {
    pub fn is_success(&self) -> bool {
        matches!(self, Redemption::Credited { .. })
    }
}

/// Owns the ecash balance and audit log.
///
/// Every mutation goes through [`credit`](Self::credit), which holds the ledger
/// lock for the read-modify-write so concurrent credits never lose updates.
pub struct LedgerAggregator {
    ledger: Mutex<VaultLedger>,
    state_path: Option<PathBuf>,
    // Serializes snapshot+write so the newest snapshot is the one left on disk.
    persist_lock: Mutex<()>,
}

impl Default for LedgerAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerAggregator {
    /// Empty, in-memory ledger.
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(VaultLedger::default()),
            state_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Ledger persisted at `path`, loading existing contents.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let ledger = VaultLedger::load(&path)?;
        log::info!(
            "Ledger loaded from {}: {} sats, {} log entries",
            path.display(),
            ledger.ecash_balance,
            ledger.audit_log.len()
        );
        Ok(Self {
            ledger: Mutex::new(ledger),
            state_path: Some(path),
            persist_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, VaultLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit `amount` sats. Returns the new balance.
    pub fn credit(&self, amount: u64) -> Result<u64, LedgerError> {
        self.credit_with_message(amount, format!("⚡ Ecash Received: {} sats", amount))
    }

    fn credit_with_message(&self, amount: u64, message: String) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let balance = {
            let mut ledger = self.lock();
            let balance = ledger
                .ecash_balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            ledger.ecash_balance = balance;
            ledger.audit_log.push(LogEntry {
                timestamp: Utc::now(),
                amount,
                message,
            });
            balance
        };

        self.persist();
        Ok(balance)
    }

    fn persist(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.lock().clone();
        if let Err(e) = snapshot.save(path) {
            log::error!("Failed to persist ledger to {}: {}", path.display(), e);
        }
    }

    pub fn ecash_balance(&self) -> u64 {
        self.lock().ecash_balance
    }

    /// On-chain balance plus the ecash balance at the time of the call.
    pub fn total_balance(&self, onchain_balance: u64) -> u64 {
        onchain_balance.saturating_add(self.ecash_balance())
    }

    /// Last `n` log entries, oldest first.
    pub fn recent_log(&self, n: usize) -> Vec<LogEntry> {
        self.snapshot(n).1
    }

    /// Ecash balance and the last `n` log entries, read under one lock.
    pub fn snapshot(&self, n: usize) -> (u64, Vec<LogEntry>) {
        let ledger = self.lock();
        let start = ledger.audit_log.len().saturating_sub(n);
        (ledger.ecash_balance, ledger.audit_log[start..].to_vec())
    }

    /// Decode a bearer token and credit its value.
    pub fn receive_token(&self, token: &str) -> Redemption {
        let parsed = match strongbox_cashu::decode_token(token) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("Rejected malformed token: {}", e);
                return Redemption::Malformed;
            }
        };
        let amount = match parsed.value() {
            Ok(amount) => amount,
            Err(e) => {
                log::debug!("Rejected malformed token: {}", e);
                return Redemption::Malformed;
            }
        };
        if amount == 0 {
            log::info!("Rejected zero-value token");
            return Redemption::ZeroValue;
        }

        let mint = parsed.mint().unwrap_or("unknown mint");
        let message = format!("⚡ Ecash Received: {} sats ({})", amount, mint);
        match self.credit_with_message(amount, message) {
            Ok(balance) => {
                log::info!("Credited {} sats from {}; ecash balance {}", amount, mint, balance);
                Redemption::Credited { amount, balance }
            }
            Err(e) => {
                log::warn!("Token of {} sats not credited: {}", amount, e);
                Redemption::Rejected
            }
        }
    }
}
