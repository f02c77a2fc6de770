//! In-memory wallet for tests and demo deployments.

use crate::{Error, Signature, WalletAdapter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Wallet with a settable balance, optional latency and failure injection.
pub struct MockWallet {
    address: String,
    balance: AtomicU64,
    failing: AtomicBool,
    latency: Option<Duration>,
    seed: Vec<u8>,
}

impl MockWallet {
    pub fn new(address: impl Into<String>, balance: u64) -> Self {
        let address = address.into();
        let seed = address.as_bytes().to_vec();
        Self {
            address,
            balance: AtomicU64::new(balance),
            failing: AtomicBool::new(false),
            latency: None,
            seed,
        }
    }

    /// Sleep this long inside every balance query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_balance(&self, sats: u64) {
        self.balance.store(sats, Ordering::SeqCst);
    }

    /// Make balance queries fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Public key that verifies this wallet's signatures.
    pub fn signing_pubkey(&self) -> Result<bitcoin::secp256k1::PublicKey, Error> {
        crate::pubkey_for_seed(&self.seed)
    }
}

impl WalletAdapter for MockWallet {
    fn get_balance(&self) -> Result<u64, Error> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("mock wallet set to fail".into()));
        }
        Ok(self.balance.load(Ordering::SeqCst))
    }

    fn get_address(&self) -> Result<String, Error> {
        Ok(self.address.clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, Error> {
        crate::sign_with_seed(&self.seed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::{sha256, Hash};
    use bitcoin::secp256k1::{Message, Secp256k1};

    #[test]
    fn test_balance_and_address() {
        let wallet = MockWallet::new("tb1qmock", 20_000);
        assert_eq!(wallet.get_balance().unwrap(), 20_000);
        assert_eq!(wallet.get_address().unwrap(), "tb1qmock");

        wallet.set_balance(5);
        assert_eq!(wallet.get_balance().unwrap(), 5);
    }

    #[test]
    fn test_failure_injection() {
        let wallet = MockWallet::new("tb1qmock", 1);
        wallet.set_failing(true);
        assert!(matches!(wallet.get_balance(), Err(Error::Unavailable(_))));
        wallet.set_failing(false);
        assert_eq!(wallet.get_balance().unwrap(), 1);
    }

    #[test]
    fn test_signature_verifies() {
        let wallet = MockWallet::new("tb1qmock", 0);
        let sig = wallet.sign(b"withdraw 1000").unwrap();
        let msg = Message::from_digest(sha256::Hash::hash(b"withdraw 1000").to_byte_array());
        let pk = wallet.signing_pubkey().unwrap();
        assert!(Secp256k1::verification_only()
            .verify_ecdsa(&msg, &sig, &pk)
            .is_ok());
    }
}
