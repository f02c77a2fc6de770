//! Liveness witnesses: third parties that record proof a heartbeat happened.
//!
//! A witness is optional. When configured, every heartbeat submits
//! `SHA-256("Alive-<unix seconds>")` to it. Witness calls block; the monitor
//! runs them on the blocking pool under a timeout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from witness operations
#[derive(Error, Debug)]
pub enum WitnessError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Calendar request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Calendar rejected digest: HTTP {0}")]
    Rejected(u16),
}

/// Record of a successful stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessReceipt {
    /// Which witness produced this receipt
    pub witness: String,
    /// Hex-encoded digest that was stamped
    pub digest: String,
    pub stamped_at: DateTime<Utc>,
    /// Where the proof material was stored, if anywhere
    pub location: Option<PathBuf>,
}

/// Something that can timestamp a liveness digest.
pub trait LivenessWitness: Send + Sync {
    fn name(&self) -> &'static str;

    /// Record `digest`. May block on disk or network I/O.
    fn stamp(&self, digest: &[u8; 32]) -> Result<WitnessReceipt, WitnessError>;
}

/// Digest of the liveness statement for time `at`.
pub fn liveness_digest(at: DateTime<Utc>) -> [u8; 32] {
    let statement = format!("Alive-{}", at.timestamp());
    Sha256::digest(statement.as_bytes()).into()
}

// ============================================================================
// Local journal
// ============================================================================

/// Appends one JSON line per heartbeat to a local file.
pub struct DigestJournal {
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct JournalLine {
    digest: String,
    stamped_at: DateTime<Utc>,
}

impl DigestJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LivenessWitness for DigestJournal {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn stamp(&self, digest: &[u8; 32]) -> Result<WitnessReceipt, WitnessError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = JournalLine {
            digest: hex::encode(digest),
            stamped_at: Utc::now(),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&line)?)?;

        Ok(WitnessReceipt {
            witness: self.name().to_string(),
            digest: line.digest,
            stamped_at: line.stamped_at,
            location: Some(self.path.clone()),
        })
    }
}

// ============================================================================
// OpenTimestamps calendar
// ============================================================================

/// Detached-timestamp file header, followed by the major version.
const OTS_HEADER_MAGIC: &[u8] = b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";
const OTS_MAJOR_VERSION: u8 = 0x01;
const OTS_OP_SHA256: u8 = 0x08;

/// Default public calendar.
pub const DEFAULT_CALENDAR: &str = "https://a.pool.opentimestamps.org";

/// Submits digests to an OpenTimestamps calendar and stores the pending
/// proofs as `<digest>.ots` files.
pub struct CalendarWitness {
    calendar_url: String,
    receipt_dir: PathBuf,
    timeout: Duration,
}

impl CalendarWitness {
    pub fn new(calendar_url: impl Into<String>, receipt_dir: impl Into<PathBuf>) -> Self {
        Self {
            calendar_url: calendar_url.into(),
            receipt_dir: receipt_dir.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wrap a calendar response into a detached `.ots` file body.
    fn detached_timestamp(digest: &[u8; 32], calendar_response: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(OTS_HEADER_MAGIC.len() + 2 + 32 + calendar_response.len());
        out.extend_from_slice(OTS_HEADER_MAGIC);
        out.push(OTS_MAJOR_VERSION);
        out.push(OTS_OP_SHA256);
        out.extend_from_slice(digest);
        out.extend_from_slice(calendar_response);
        out
    }
}

impl LivenessWitness for CalendarWitness {
    fn name(&self) -> &'static str {
        "opentimestamps"
    }

    fn stamp(&self, digest: &[u8; 32]) -> Result<WitnessReceipt, WitnessError> {
        // Built per call: the blocking client must not live on an async thread.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let url = format!("{}/digest", self.calendar_url.trim_end_matches('/'));
        let response = client
            .post(&url)
            .header("Accept", "application/vnd.opentimestamps.v1")
            .body(digest.to_vec())
            .send()?;

        if !response.status().is_success() {
            return Err(WitnessError::Rejected(response.status().as_u16()));
        }
        let body = response.bytes()?;

        fs::create_dir_all(&self.receipt_dir)?;
        let digest_hex = hex::encode(digest);
        let path = self.receipt_dir.join(format!("{}.ots", digest_hex));
        fs::write(&path, Self::detached_timestamp(digest, &body))?;

        log::debug!("Pending timestamp stored at {}", path.display());

        Ok(WitnessReceipt {
            witness: self.name().to_string(),
            digest: digest_hex,
            stamped_at: Utc::now(),
            location: Some(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_liveness_digest_is_sha256_of_statement() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let expected: [u8; 32] = Sha256::digest(b"Alive-1700000000").into();
        assert_eq!(liveness_digest(at), expected);
    }

    #[test]
    fn test_liveness_digest_changes_with_time() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert_ne!(liveness_digest(a), liveness_digest(b));
    }

    #[test]
    fn test_journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("liveness.jsonl");
        let journal = DigestJournal::new(&path);

        let first = journal.stamp(&[0x11; 32]).unwrap();
        let second = journal.stamp(&[0x22; 32]).unwrap();

        assert_eq!(first.witness, "journal");
        assert_eq!(first.digest, "11".repeat(32));
        assert_eq!(second.location.as_deref(), Some(path.as_path()));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(&"11".repeat(32)));
        assert!(lines[1].contains(&"22".repeat(32)));
    }

    #[test]
    fn test_journal_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let journal = DigestJournal::new(dir.path());
        assert!(journal.stamp(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_detached_timestamp_layout() {
        let digest = [0xAB; 32];
        let body = CalendarWitness::detached_timestamp(&digest, &[0xf0, 0x10]);
        assert!(body.starts_with(OTS_HEADER_MAGIC));
        let rest = &body[OTS_HEADER_MAGIC.len()..];
        assert_eq!(rest[0], OTS_MAJOR_VERSION);
        assert_eq!(rest[1], OTS_OP_SHA256);
        assert_eq!(&rest[2..34], &digest);
        assert_eq!(&rest[34..], &[0xf0, 0x10]);
    }

    #[test]
    fn test_calendar_unreachable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let witness = CalendarWitness::new("http://127.0.0.1:1", dir.path())
            .with_timeout(Duration::from_secs(2));
        assert!(matches!(
            witness.stamp(&[0u8; 32]),
            Err(WitnessError::Http(_))
        ));
    }
}
