//! Strongbox Dead Man's Switch
//!
//! Tracks owner liveness and fires a recovery action when check-ins stop.
//!
//! # How It Works
//!
//! Every heartbeat resets the grace period. The switch reports how much of the
//! timeout has elapsed:
//!
//! ```text
//! |--- Healthy ---|--- CheckinRecommended ---|--- CheckinRequired ---|--- Expired
//! 0%             50%                        90%                    100%
//! ```
//!
//! [`DeadmanMonitor`] runs a timer task that evaluates the switch independently
//! of incoming requests. On expiry it moves to TRIGGERED and fires every
//! registered [`TriggerAction`] exactly once, then waits for the next heartbeat
//! to re-arm.
//!
//! Heartbeats optionally ask a [`LivenessWitness`] to timestamp a liveness
//! digest. Witness failures are logged and never fail the heartbeat.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strongbox_deadman::{DeadMansSwitch, DeadmanMonitor};
//!
//! let switch = DeadMansSwitch::new(Duration::from_secs(60));
//! let monitor = Arc::new(DeadmanMonitor::new(switch, Duration::from_secs(5)));
//! monitor.on_trigger(|expiry: &strongbox_deadman::Expiry| {
//!     println!("owner silent for {:?}", expiry.silent_for);
//! });
//! let timer = monitor.spawn();
//! monitor.heartbeat().await;
//! ```

mod monitor;
mod switch;
pub mod witness;

pub use monitor::{DeadmanMonitor, TriggerAction};
pub use switch::{DeadMansSwitch, Expiry, SwitchState, SwitchStatus, Urgency};
pub use witness::{
    liveness_digest, CalendarWitness, DigestJournal, LivenessWitness, WitnessError,
    WitnessReceipt,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from dead man's switch configuration
#[derive(Error, Debug)]
pub enum DeadmanError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Dead man's switch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadmanConfig {
    /// Grace period between heartbeats (seconds).
    pub timeout_secs: u64,

    /// How often the timer task evaluates expiry (seconds).
    /// Default: a tenth of the timeout, at least one second.
    pub check_interval_secs: Option<u64>,

    /// Fraction of the timeout elapsed before recommending check-in (0.0–1.0).
    /// Default: 0.5.
    pub checkin_threshold: f64,

    /// Fraction of the timeout elapsed before check-in is critical (0.0–1.0).
    /// Default: 0.9.
    pub critical_threshold: f64,
}

impl Default for DeadmanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            check_interval_secs: None,
            checkin_threshold: 0.5,
            critical_threshold: 0.9,
        }
    }
}

impl DeadmanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        let secs = self
            .check_interval_secs
            .unwrap_or(self.timeout_secs / 10)
            .max(1);
        Duration::from_secs(secs)
    }

    /// Validate that the timeout, interval and thresholds are sensible.
    pub fn validate(&self) -> Result<(), DeadmanError> {
        if self.timeout_secs == 0 {
            return Err(DeadmanError::InvalidConfig(
                "timeout_secs must be > 0".into(),
            ));
        }
        // The timer must get at least two looks at every grace period.
        if self.check_interval() > self.timeout() / 2 {
            return Err(DeadmanError::InvalidConfig(
                "check interval must be at most half the timeout".into(),
            ));
        }
        if self.checkin_threshold <= 0.0 || self.checkin_threshold >= 1.0 {
            return Err(DeadmanError::InvalidConfig(
                "checkin_threshold must be between 0.0 and 1.0 exclusive".into(),
            ));
        }
        if self.critical_threshold <= self.checkin_threshold || self.critical_threshold >= 1.0 {
            return Err(DeadmanError::InvalidConfig(
                "critical_threshold must be between checkin_threshold and 1.0 exclusive".into(),
            ));
        }
        Ok(())
    }
}
