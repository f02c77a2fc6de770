//! Hardware signer (cold storage) interface.

use crate::{Error, Signature};

/// Identity of an attached signing device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device model name
    pub model: String,
    /// Master key fingerprint, hex
    pub fingerprint: String,
}

/// A cold-storage signing device.
pub trait HardwareSigner: Send + Sync {
    /// Look for an attached device.
    fn scan(&self) -> Result<Option<DeviceInfo>, Error>;

    /// Cold-storage receive address held by the device.
    fn cold_address(&self) -> Result<String, Error>;

    /// Sign a message on the device.
    fn sign(&self, message: &[u8]) -> Result<Signature, Error>;
}

/// Simulated device that is always attached.
pub struct MockHardwareSigner {
    device: DeviceInfo,
    cold_address: String,
    connected: bool,
}

impl MockHardwareSigner {
    pub fn new(cold_address: impl Into<String>) -> Self {
        Self {
            device: DeviceInfo {
                model: "mock-signer".into(),
                fingerprint: "d34db33f".into(),
            },
            cold_address: cold_address.into(),
            connected: true,
        }
    }

    /// Simulate an unplugged device.
    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }
}

impl HardwareSigner for MockHardwareSigner {
    fn scan(&self) -> Result<Option<DeviceInfo>, Error> {
        Ok(self.connected.then(|| self.device.clone()))
    }

    fn cold_address(&self) -> Result<String, Error> {
        if !self.connected {
            return Err(Error::Unavailable("no signing device attached".into()));
        }
        Ok(self.cold_address.clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, Error> {
        if !self.connected {
            return Err(Error::Unavailable("no signing device attached".into()));
        }
        crate::sign_with_seed(self.device.fingerprint.as_bytes(), message)
    }
}
