//! Switch state: last heartbeat, remaining grace, expiry episodes.
//!
//! Time comes from `tokio::time::Instant` so tests can pause and advance the
//! clock.

use crate::{DeadmanConfig, DeadmanError};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Logical switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    /// Grace period still running.
    Armed,
    /// Grace period exhausted.
    Triggered,
}

/// What the elapsed fraction of the grace period recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    /// Far from expiry. No action needed.
    Healthy,
    /// Passed the check-in threshold. Should check in soon.
    CheckinRecommended,
    /// Passed the critical threshold. Must check in now.
    CheckinRequired,
    /// Grace period exhausted. Recovery has been (or is about to be) released.
    Expired,
}

/// Snapshot of the switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchStatus {
    pub state: SwitchState,
    /// Time left before the switch triggers. Zero once triggered.
    pub remaining: Duration,
    /// Fraction of the timeout elapsed since the last heartbeat (0.0–1.0+).
    pub elapsed_fraction: f64,
    pub urgency: Urgency,
}

impl SwitchStatus {
    /// Remaining grace in whole seconds, truncated.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining.as_secs()
    }
}

/// A fired expiry, handed to trigger actions.
#[derive(Debug, Clone, Copy)]
pub struct Expiry {
    /// Heartbeat episode that expired (0 = never checked in since start).
    pub episode: u64,
    /// When the owner was last heard from.
    pub last_heartbeat: Instant,
    /// How long the owner has been silent.
    pub silent_for: Duration,
}

struct Inner {
    last_heartbeat: Instant,
    armed: bool,
    episode: u64,
    critical_reported: bool,
}

/// Liveness tracker. Thread-safe; share behind an `Arc`.
pub struct DeadMansSwitch {
    timeout: Duration,
    checkin_threshold: f64,
    critical_threshold: f64,
    inner: Mutex<Inner>,
}

impl DeadMansSwitch {
    /// Armed switch with default thresholds; the clock starts now.
    pub fn new(timeout: Duration) -> Self {
        let defaults = DeadmanConfig::default();
        Self {
            timeout,
            checkin_threshold: defaults.checkin_threshold,
            critical_threshold: defaults.critical_threshold,
            inner: Mutex::new(Inner {
                last_heartbeat: Instant::now(),
                armed: true,
                episode: 0,
                critical_reported: false,
            }),
        }
    }

    pub fn from_config(config: &DeadmanConfig) -> Result<Self, DeadmanError> {
        config.validate()?;
        let mut switch = Self::new(config.timeout());
        switch.checkin_threshold = config.checkin_threshold;
        switch.critical_threshold = config.critical_threshold;
        Ok(switch)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a liveness signal and re-arm. Returns the new episode number.
    pub fn heartbeat(&self) -> u64 {
        self.rearm().0
    }

    /// Re-arm, handing back the expiry of the closing episode if it ran out
    /// without being taken. Both happen under one lock, so an expired episode
    /// is either taken here or by [`take_expiry`](Self::take_expiry), never lost.
    pub(crate) fn rearm(&self) -> (u64, Option<Expiry>) {
        let now = Instant::now();
        let mut inner = self.lock();

        let silent_for = now.saturating_duration_since(inner.last_heartbeat);
        let missed = (inner.armed && silent_for >= self.timeout).then(|| Expiry {
            episode: inner.episode,
            last_heartbeat: inner.last_heartbeat,
            silent_for,
        });

        if now > inner.last_heartbeat {
            inner.last_heartbeat = now;
        }
        inner.armed = true;
        inner.critical_reported = false;
        inner.episode += 1;
        (inner.episode, missed)
    }

    /// Compute the current status. Never mutates.
    pub fn status(&self) -> SwitchStatus {
        let last = self.lock().last_heartbeat;
        self.evaluate(Instant::now().saturating_duration_since(last))
    }

    /// Whether the current episode has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    fn evaluate(&self, elapsed: Duration) -> SwitchStatus {
        let remaining = self.timeout.saturating_sub(elapsed);
        let elapsed_fraction = if self.timeout.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64() / self.timeout.as_secs_f64()
        };

        let (state, urgency) = if remaining.is_zero() {
            (SwitchState::Triggered, Urgency::Expired)
        } else if elapsed_fraction >= self.critical_threshold {
            (SwitchState::Armed, Urgency::CheckinRequired)
        } else if elapsed_fraction >= self.checkin_threshold {
            (SwitchState::Armed, Urgency::CheckinRecommended)
        } else {
            (SwitchState::Armed, Urgency::Healthy)
        };

        SwitchStatus {
            state,
            remaining,
            elapsed_fraction,
            urgency,
        }
    }

    /// Disarm and return the expiry if the grace period ran out and this
    /// episode has not fired yet.
    pub(crate) fn take_expiry(&self) -> Option<Expiry> {
        let now = Instant::now();
        let mut inner = self.lock();
        let silent_for = now.saturating_duration_since(inner.last_heartbeat);
        if !inner.armed || silent_for < self.timeout {
            return None;
        }
        inner.armed = false;
        Some(Expiry {
            episode: inner.episode,
            last_heartbeat: inner.last_heartbeat,
            silent_for,
        })
    }

    /// True once per episode, when the critical threshold is first crossed.
    pub(crate) fn take_critical(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        if inner.critical_reported || !inner.armed {
            return false;
        }
        let status = self.evaluate(now.saturating_duration_since(inner.last_heartbeat));
        if status.urgency == Urgency::CheckinRequired {
            inner.critical_reported = true;
            return true;
        }
        false
    }
}
