//! Watch-only wallet backed by an Electrum server.
//!
//! # Security
//!
//! - Always use SSL/TLS connections (ssl:// or tcp+tls://)
//! - Holds no keys; signing requests are refused

use crate::{Error, Signature, WalletAdapter};
use bitcoin::{Address, Network};
use electrum_client::{ElectrumApi, Error as ElectrumError};
use std::str::FromStr;
use std::time::Duration;

/// Socket timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Watch-only wallet tracking a single receive address.
///
/// A fresh connection is opened per query so a dropped server never leaves a
/// stale client behind.
pub struct ElectrumWallet {
    url: String,
    network: Network,
    address: Address,
    include_unconfirmed: bool,
    timeout: Duration,
}

impl ElectrumWallet {
    /// Create a wallet watching `address` on `network`.
    ///
    /// No connection is made until the first balance query.
    pub fn new(url: &str, network: Network, address: &str) -> Result<Self, Error> {
        if !url.starts_with("ssl://") && !url.contains("tls") {
            log::warn!("Electrum URL {} is not using SSL - insecure for mainnet!", url);
        }

        let address = Address::from_str(address)
            .map_err(|e| Error::InvalidAddress(e.to_string()))?
            .require_network(network)
            .map_err(|e| Error::InvalidAddress(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            network,
            address,
            include_unconfirmed: false,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Count unconfirmed incoming funds in the balance.
    pub fn include_unconfirmed(mut self, include: bool) -> Self {
        self.include_unconfirmed = include;
        self
    }

    /// Socket read/write timeout, so a silent server fails the query instead
    /// of holding the calling thread. Whole seconds, at least one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Network this wallet is configured for
    pub fn network(&self) -> Network {
        self.network
    }

    fn connect(&self) -> Result<electrum_client::Client, Error> {
        let secs = self.timeout.as_secs().clamp(1, u8::MAX as u64) as u8;
        let config = electrum_client::ConfigBuilder::new()
            .timeout(Some(secs))
            .build();
        electrum_client::Client::from_config(&self.url, config)
            .map_err(|e: ElectrumError| Error::Connection(e.to_string()))
    }
}

impl WalletAdapter for ElectrumWallet {
    fn get_balance(&self) -> Result<u64, Error> {
        let client = self.connect()?;
        let script = self.address.script_pubkey();
        let balance = client.script_get_balance(script.as_script())?;

        // unconfirmed can be negative (pending spends)
        let total = if self.include_unconfirmed {
            (balance.confirmed as i64 + balance.unconfirmed).max(0) as u64
        } else {
            balance.confirmed
        };

        log::debug!("Electrum balance for {}: {} sats", self.address, total);
        Ok(total)
    }

    fn get_address(&self) -> Result<String, Error> {
        Ok(self.address.to_string())
    }

    fn sign(&self, _message: &[u8]) -> Result<Signature, Error> {
        Err(Error::WatchOnly)
    }
}
