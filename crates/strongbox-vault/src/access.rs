//! Panic/duress PIN resolution.
//!
//! Two configured PINs select FULL_ACCESS and DURESS. Anything else is LOCKED;
//! a wrong PIN is not an error and reveals nothing about how close it was.
//!
//! Inputs and PINs are reduced to SHA-256 digests and compared with
//! [`subtle::ConstantTimeEq`], both comparisons always run. Stored digests are
//! zeroized on drop.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Demo full-access PIN
pub const DEFAULT_FULL_ACCESS_PIN: &str = "55555";
/// Demo duress PIN
pub const DEFAULT_DURESS_PIN: &str = "44444";

/// Errors from resolver construction
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccessError {
    #[error("PIN must not be empty")]
    EmptyPin,

    #[error("Full-access and duress PINs must differ")]
    DuplicatePin,
}

/// Operating mode selected at unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    #[serde(rename = "LOCKED")]
    Locked,
    /// Decoy mode for coerced unlocks
    #[serde(rename = "DURESS_MODE")]
    Duress,
    #[serde(rename = "GOD_MODE")]
    FullAccess,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct PinDigest([u8; 32]);

impl PinDigest {
    fn of(pin: &str) -> Self {
        Self(Sha256::digest(pin.as_bytes()).into())
    }
}

/// Maps a secret to an [`AccessMode`]. Stateless after construction.
pub struct AccessResolver {
    full_access: PinDigest,
    duress: PinDigest,
}

impl AccessResolver {
    pub fn new(full_access_pin: &str, duress_pin: &str) -> Result<Self, AccessError> {
        if full_access_pin.is_empty() || duress_pin.is_empty() {
            return Err(AccessError::EmptyPin);
        }
        if full_access_pin == duress_pin {
            return Err(AccessError::DuplicatePin);
        }
        Ok(Self {
            full_access: PinDigest::of(full_access_pin),
            duress: PinDigest::of(duress_pin),
        })
    }

    pub fn resolve(&self, secret: &str) -> AccessMode {
        let candidate = PinDigest::of(secret);

        let is_full = self.full_access.0[..].ct_eq(&candidate.0[..]);
        let is_duress = self.duress.0[..].ct_eq(&candidate.0[..]);

        if bool::from(is_full) {
            AccessMode::FullAccess
        } else if bool::from(is_duress) {
            AccessMode::Duress
        } else {
            AccessMode::Locked
        }
    }
}

impl Default for AccessResolver {
    fn default() -> Self {
        Self {
            full_access: PinDigest::of(DEFAULT_FULL_ACCESS_PIN),
            duress: PinDigest::of(DEFAULT_DURESS_PIN),
        }
    }
}
