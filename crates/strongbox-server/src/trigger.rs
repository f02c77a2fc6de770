//! Recovery release: what happens when the owner stops checking in.
//!
//! Writes a release manifest into `<data_dir>/release/`, copies the encrypted
//! recovery bundle next to it and logs every heir that should be contacted.

use crate::config::{HeirContact, ServerConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strongbox_deadman::{Expiry, TriggerAction};

/// Manifest file name inside the release directory.
pub const MANIFEST_FILE: &str = "release.json";

/// Contents of `release.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub triggered_at: DateTime<Utc>,
    /// Heartbeat episode that expired
    pub episode: u64,
    /// Seconds since the owner was last heard from
    pub silent_for_secs: u64,
    pub cold_storage_address: String,
    pub heirs: Vec<HeirContact>,
    /// File name of the copied recovery bundle, if one was configured
    pub bundle: Option<String>,
}

/// Trigger action that releases recovery material to the heirs.
pub struct RecoveryRelease {
    release_dir: PathBuf,
    cold_storage: String,
    heirs: Vec<HeirContact>,
    bundle_path: Option<PathBuf>,
}

impl RecoveryRelease {
    pub fn new(release_dir: impl Into<PathBuf>, cold_storage: impl Into<String>) -> Self {
        Self {
            release_dir: release_dir.into(),
            cold_storage: cold_storage.into(),
            heirs: Vec::new(),
            bundle_path: None,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            release_dir: config.release_dir(),
            cold_storage: config.vault.cold_storage_address.clone(),
            heirs: config.recovery.heirs.clone(),
            bundle_path: config.recovery.bundle_path.clone(),
        }
    }

    pub fn with_heirs(mut self, heirs: Vec<HeirContact>) -> Self {
        self.heirs = heirs;
        self
    }

    pub fn with_bundle(mut self, bundle: impl Into<PathBuf>) -> Self {
        self.bundle_path = Some(bundle.into());
        self
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    /// Write the release directory. Returns the manifest path.
    pub fn release(&self, expiry: &Expiry) -> Result<PathBuf> {
        fs::create_dir_all(&self.release_dir).with_context(|| {
            format!(
                "Failed to create release directory {}",
                self.release_dir.display()
            )
        })?;

        // A missing bundle must not stop the manifest from being written.
        let bundle = match &self.bundle_path {
            Some(source) => match self.copy_bundle(source) {
                Ok(name) => Some(name),
                Err(e) => {
                    log::error!("❌ Recovery bundle not released: {:#}", e);
                    None
                }
            },
            None => None,
        };

        let manifest = ReleaseManifest {
            triggered_at: Utc::now(),
            episode: expiry.episode,
            silent_for_secs: expiry.silent_for.as_secs(),
            cold_storage_address: self.cold_storage.clone(),
            heirs: self.heirs.clone(),
            bundle,
        };

        let path = self.release_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn copy_bundle(&self, source: &Path) -> Result<String> {
        let name = source
            .file_name()
            .with_context(|| format!("Bundle path has no file name: {}", source.display()))?
            .to_string_lossy()
            .into_owned();
        fs::copy(source, self.release_dir.join(&name))
            .with_context(|| format!("Failed to copy bundle {}", source.display()))?;
        Ok(name)
    }

    fn notify_heirs(&self) {
        if self.heirs.is_empty() {
            log::warn!("No heirs configured; release written for manual pickup.");
            return;
        }
        for heir in &self.heirs {
            let channels: Vec<&str> = [heir.npub.as_deref(), heir.email.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if channels.is_empty() {
                log::warn!("Heir {} has no contact channel configured", heir.label);
            } else {
                log::info!("Contact heir {} via {}", heir.label, channels.join(", "));
            }
        }
    }
}

impl TriggerAction for RecoveryRelease {
    fn fire(&self, expiry: &Expiry) {
        log::warn!("🔴 Releasing recovery material…");
        match self.release(expiry) {
            Ok(path) => log::info!("✅ Recovery release written to {}", path.display()),
            Err(e) => log::error!("❌ Recovery release failed: {:#}", e),
        }
        self.notify_heirs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn expiry() -> Expiry {
        Expiry {
            episode: 3,
            last_heartbeat: tokio::time::Instant::now(),
            silent_for: Duration::from_secs(75),
        }
    }

    fn heirs() -> Vec<HeirContact> {
        vec![
            HeirContact {
                label: "Spouse".into(),
                npub: Some("npub1spouse".into()),
                email: Some("spouse@example.com".into()),
            },
            HeirContact {
                label: "Child".into(),
                npub: None,
                email: None,
            },
        ]
    }

    fn read_manifest(path: &Path) -> ReleaseManifest {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_release_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let release = RecoveryRelease::new(dir.path().join("release"), "tb1qcold").with_heirs(heirs());

        let path = release.release(&expiry()).unwrap();
        assert_eq!(path, dir.path().join("release").join(MANIFEST_FILE));

        let manifest = read_manifest(&path);
        assert_eq!(manifest.episode, 3);
        assert_eq!(manifest.silent_for_secs, 75);
        assert_eq!(manifest.cold_storage_address, "tb1qcold");
        assert_eq!(manifest.heirs, heirs());
        assert_eq!(manifest.bundle, None);
    }

    #[test]
    fn test_release_copies_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("recovery.age");
        fs::write(&bundle, b"encrypted").unwrap();

        let release = RecoveryRelease::new(dir.path().join("release"), "tb1qcold").with_bundle(&bundle);
        let path = release.release(&expiry()).unwrap();

        assert_eq!(read_manifest(&path).bundle.as_deref(), Some("recovery.age"));
        assert_eq!(
            fs::read(dir.path().join("release").join("recovery.age")).unwrap(),
            b"encrypted"
        );
    }

    #[test]
    fn test_missing_bundle_still_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let release = RecoveryRelease::new(dir.path().join("release"), "tb1qcold")
            .with_bundle(dir.path().join("absent.age"));

        let path = release.release(&expiry()).unwrap();
        assert_eq!(read_manifest(&path).bundle, None);
    }

    #[test]
    fn test_fire_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the release directory should be
        let blocked = dir.path().join("release");
        fs::write(&blocked, b"").unwrap();

        let release = RecoveryRelease::new(&blocked, "tb1qcold");
        assert!(release.release(&expiry()).is_err());
        release.fire(&expiry());
    }

    #[test]
    fn test_from_config() {
        let mut config = ServerConfig::default();
        config.server.data_dir = PathBuf::from("/srv/strongbox");
        config.recovery.heirs = heirs();

        let release = RecoveryRelease::from_config(&config);
        assert_eq!(release.release_dir(), Path::new("/srv/strongbox/release"));
        assert_eq!(release.heirs.len(), 2);
    }
}
