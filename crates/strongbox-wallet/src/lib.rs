//! Strongbox Wallet Adapters
//!
//! The vault treats on-chain custody as a black box. This crate defines the
//! two collaborator interfaces it talks to and their implementations:
//!
//! - [`WalletAdapter`]: confirmed balance, receive address, message signing.
//!   [`ElectrumWallet`] (watch-only, Electrum protocol) and [`MockWallet`].
//! - [`HardwareSigner`]: cold-storage device. Only [`MockHardwareSigner`]
//!   exists; real device access is out of scope.
//!
//! All calls are blocking. Async callers should run them on a blocking pool
//! and bound them with a timeout.
//!
//! # Example
//!
//! ```ignore
//! use strongbox_wallet::{ElectrumWallet, WalletAdapter};
//! use bitcoin::Network;
//!
//! let wallet = ElectrumWallet::new(
//!     "ssl://mempool.space:40002",
//!     Network::Testnet,
//!     "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
//! )?;
//! println!("balance: {}", wallet.get_balance()?);
//! ```

mod electrum;
mod mock;
mod signer;

pub use electrum::ElectrumWallet;
pub use mock::MockWallet;
pub use signer::{DeviceInfo, HardwareSigner, MockHardwareSigner};

pub use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::Network;
use thiserror::Error;

/// Errors from wallet and signer operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Electrum protocol error: {0}")]
    Protocol(#[from] electrum_client::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Wallet is watch-only and cannot sign")]
    WatchOnly,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
}

/// On-chain wallet as seen by the vault.
pub trait WalletAdapter: Send + Sync {
    /// Balance in satoshis. May block on network I/O.
    fn get_balance(&self) -> Result<u64, Error>;

    /// Current receive address.
    fn get_address(&self) -> Result<String, Error>;

    /// Sign an arbitrary message (ECDSA over its SHA-256).
    fn sign(&self, message: &[u8]) -> Result<Signature, Error>;
}

/// Default Electrum servers for each network
pub fn default_server(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "ssl://electrum.blockstream.info:60002",
        Network::Testnet => "ssl://mempool.space:40002",
        Network::Signet => "ssl://mempool.space:60602",
        Network::Regtest => "tcp://127.0.0.1:60401",
        _ => "ssl://electrum.blockstream.info:60002",
    }
}

/// Parse a network name as used in config files. `None` for unknown names.
pub fn try_parse_network(name: &str) -> Option<Network> {
    match name {
        "bitcoin" | "mainnet" => Some(Network::Bitcoin),
        "testnet" | "testnet3" => Some(Network::Testnet),
        "signet" => Some(Network::Signet),
        "regtest" => Some(Network::Regtest),
        _ => None,
    }
}

/// Like [`try_parse_network`], falling back to mainnet with a warning.
pub fn parse_network(name: &str) -> Network {
    try_parse_network(name).unwrap_or_else(|| {
        log::warn!("Unknown network {:?}, falling back to mainnet", name);
        Network::Bitcoin
    })
}

/// ECDSA over SHA-256(message) with a key derived from `seed`.
pub(crate) fn sign_with_seed(seed: &[u8], message: &[u8]) -> Result<Signature, Error> {
    use bitcoin::hashes::{sha256, Hash};
    use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};

    let key_bytes = sha256::Hash::hash(seed).to_byte_array();
    let secret_key =
        SecretKey::from_slice(&key_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    let digest = Message::from_digest(sha256::Hash::hash(message).to_byte_array());

    let secp = Secp256k1::signing_only();
    Ok(secp.sign_ecdsa(&digest, &secret_key))
}

/// Public key matching [`sign_with_seed`].
pub(crate) fn pubkey_for_seed(seed: &[u8]) -> Result<bitcoin::secp256k1::PublicKey, Error> {
    use bitcoin::hashes::{sha256, Hash};
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    let key_bytes = sha256::Hash::hash(seed).to_byte_array();
    let secret_key =
        SecretKey::from_slice(&key_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    Ok(secret_key.public_key(&Secp256k1::signing_only()))
}
