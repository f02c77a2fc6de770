//! The active monitor: heartbeats, witness requests and the expiry timer.

use crate::switch::{DeadMansSwitch, Expiry, SwitchStatus};
use crate::witness::{liveness_digest, LivenessWitness, WitnessReceipt};
use crate::{DeadmanConfig, DeadmanError};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Action fired when the switch expires.
///
/// The timer and late heartbeats run actions on the blocking pool, so file
/// and network I/O is fine here.
pub trait TriggerAction: Send + Sync {
    fn fire(&self, expiry: &Expiry);
}

impl<F> TriggerAction for F
where
    F: Fn(&Expiry) + Send + Sync,
{
    fn fire(&self, expiry: &Expiry) {
        self(expiry)
    }
}

/// Owns the switch, the optional liveness witness and the trigger actions.
pub struct DeadmanMonitor {
    switch: DeadMansSwitch,
    check_interval: Duration,
    witness: Option<Arc<dyn LivenessWitness>>,
    witness_timeout: Duration,
    actions: Mutex<Vec<Arc<dyn TriggerAction>>>,
    last_receipt: Mutex<Option<WitnessReceipt>>,
}

impl DeadmanMonitor {
    pub fn new(switch: DeadMansSwitch, check_interval: Duration) -> Self {
        Self {
            switch,
            check_interval,
            witness: None,
            witness_timeout: Duration::from_secs(10),
            actions: Mutex::new(Vec::new()),
            last_receipt: Mutex::new(None),
        }
    }

    pub fn from_config(config: &DeadmanConfig) -> Result<Self, DeadmanError> {
        let switch = DeadMansSwitch::from_config(config)?;
        Ok(Self::new(switch, config.check_interval()))
    }

    /// Request a liveness proof on every heartbeat.
    pub fn with_witness(mut self, witness: Arc<dyn LivenessWitness>) -> Self {
        self.witness = Some(witness);
        self
    }

    pub fn with_witness_timeout(mut self, timeout: Duration) -> Self {
        self.witness_timeout = timeout;
        self
    }

    /// Register an action to fire on expiry.
    pub fn on_trigger(&self, action: impl TriggerAction + 'static) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(action));
    }

    pub fn switch(&self) -> &DeadMansSwitch {
        &self.switch
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn status(&self) -> SwitchStatus {
        self.switch.status()
    }

    /// Most recent successful liveness proof.
    pub fn last_receipt(&self) -> Option<WitnessReceipt> {
        self.last_receipt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-arm the switch, then best-effort stamp a liveness proof.
    ///
    /// Always succeeds. Witness errors and timeouts are only logged.
    pub async fn heartbeat(&self) -> SwitchStatus {
        let (episode, missed) = self.switch.rearm();
        // The episode ran out between timer ticks; it still gets its release.
        if let Some(expiry) = missed {
            self.report_expiry(&expiry);
            self.fire_blocking(expiry).await;
        }
        log::info!("Heartbeat received (episode {})", episode);

        if let Some(witness) = self.witness.clone() {
            let digest = liveness_digest(Utc::now());
            let name = witness.name();
            let job = tokio::task::spawn_blocking(move || witness.stamp(&digest));

            match tokio::time::timeout(self.witness_timeout, job).await {
                Ok(Ok(Ok(receipt))) => {
                    log::info!("Liveness proof stamped via {}: {}", name, receipt.digest);
                    *self
                        .last_receipt
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(receipt);
                }
                Ok(Ok(Err(e))) => log::warn!("Liveness proof via {} failed: {}", name, e),
                Ok(Err(e)) => log::warn!("Liveness proof task via {} aborted: {}", name, e),
                Err(_) => log::warn!(
                    "Liveness proof via {} timed out after {:?}",
                    name,
                    self.witness_timeout
                ),
            }
        }

        self.switch.status()
    }

    /// Evaluate the switch once. Fires the trigger actions inline if this
    /// call observed the expiry.
    pub fn check(&self) -> Option<Expiry> {
        let expiry = self.take_due()?;
        for action in self.actions() {
            action.fire(&expiry);
        }
        Some(expiry)
    }

    /// Critical warning plus the expiry, if this call observed it.
    fn take_due(&self) -> Option<Expiry> {
        if self.switch.take_critical() {
            let status = self.switch.status();
            log::warn!(
                "⚠️  Check-in required: {}s left before the dead man's switch triggers",
                status.remaining_secs()
            );
        }

        let expiry = self.switch.take_expiry()?;
        self.report_expiry(&expiry);
        Some(expiry)
    }

    fn report_expiry(&self, expiry: &Expiry) {
        log::warn!(
            "🔴 Dead man's switch TRIGGERED: no heartbeat for {}s (episode {})",
            expiry.silent_for.as_secs(),
            expiry.episode
        );
    }

    fn actions(&self) -> Vec<Arc<dyn TriggerAction>> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run every action on the blocking pool and wait for them.
    async fn fire_blocking(&self, expiry: Expiry) {
        let actions = self.actions();
        if actions.is_empty() {
            return;
        }
        let job = tokio::task::spawn_blocking(move || {
            for action in actions {
                action.fire(&expiry);
            }
        });
        if let Err(e) = job.await {
            log::error!("Trigger action panicked (episode {}): {}", expiry.episode, e);
        }
    }

    /// Start the timer task. Runs until the handle is aborted.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            log::info!(
                "Dead man's switch armed: timeout {}s, checking every {}s",
                monitor.switch.timeout().as_secs(),
                monitor.check_interval.as_secs()
            );
            let mut ticker = tokio::time::interval(monitor.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(expiry) = monitor.take_due() {
                    monitor.fire_blocking(expiry).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::SwitchState;
    use crate::witness::{DigestJournal, WitnessError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(10);
    const INTERVAL: Duration = Duration::from_secs(1);

    fn counting_monitor() -> (Arc<DeadmanMonitor>, Arc<AtomicUsize>) {
        let monitor = Arc::new(DeadmanMonitor::new(
            DeadMansSwitch::new(TIMEOUT),
            INTERVAL,
        ));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        monitor.on_trigger(move |_: &Expiry| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (monitor, fired)
    }

    struct FailingWitness;

    impl LivenessWitness for FailingWitness {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn stamp(&self, _digest: &[u8; 32]) -> Result<WitnessReceipt, WitnessError> {
            Err(WitnessError::Rejected(503))
        }
    }

    struct SlowWitness;

    impl LivenessWitness for SlowWitness {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn stamp(&self, _digest: &[u8; 32]) -> Result<WitnessReceipt, WitnessError> {
            std::thread::sleep(Duration::from_millis(500));
            Err(WitnessError::Rejected(504))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_exactly_once_per_expiry() {
        let (monitor, fired) = counting_monitor();
        let timer = monitor.spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Well past the timeout with nobody polling
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.status().state, SwitchState::Triggered);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        timer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_rearms_for_next_episode() {
        let (monitor, fired) = counting_monitor();
        let timer = monitor.spawn();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let status = monitor.heartbeat().await;
        assert_eq!(status.state, SwitchState::Armed);
        assert_eq!(status.remaining, TIMEOUT);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        timer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_between_ticks_still_fires() {
        let (monitor, fired) = counting_monitor();
        let timer = monitor.spawn();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        monitor.heartbeat().await;

        // Expired at 13.5s, next tick is at 14s
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(monitor.status().state, SwitchState::Triggered);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let status = monitor.heartbeat().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(status.state, SwitchState::Armed);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.status().state, SwitchState::Armed);

        timer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_actions_off_the_runtime_thread() {
        let monitor = Arc::new(DeadmanMonitor::new(DeadMansSwitch::new(TIMEOUT), INTERVAL));
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        monitor.on_trigger(move |_: &Expiry| {
            *slot.lock().unwrap() = Some(std::thread::current().id());
        });
        let timer = monitor.spawn();

        tokio::time::sleep(TIMEOUT + INTERVAL).await;
        let action_thread = seen.lock().unwrap().expect("action did not fire");
        assert_ne!(action_thread, std::thread::current().id());

        timer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_heartbeats_never_fire() {
        let (monitor, fired) = counting_monitor();
        let timer = monitor.spawn();

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_secs(8)).await;
            monitor.heartbeat().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        timer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_without_timer() {
        let (monitor, fired) = counting_monitor();
        assert!(monitor.check().is_none());

        tokio::time::advance(TIMEOUT).await;
        let expiry = monitor.check().unwrap();
        assert_eq!(expiry.episode, 0);
        assert!(monitor.check().is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_registered_action_fires() {
        let (monitor, fired) = counting_monitor();
        let second = Arc::new(AtomicUsize::new(0));
        let counter = second.clone();
        monitor.on_trigger(move |_: &Expiry| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(TIMEOUT).await;
        monitor.check();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_witness_failure_does_not_fail_heartbeat() {
        let monitor = DeadmanMonitor::new(DeadMansSwitch::new(TIMEOUT), INTERVAL)
            .with_witness(Arc::new(FailingWitness));

        let status = monitor.heartbeat().await;
        assert_eq!(status.state, SwitchState::Armed);
        assert!(monitor.last_receipt().is_none());
        assert_eq!(monitor.switch().heartbeat(), 2);
    }

    #[tokio::test]
    async fn test_slow_witness_is_bounded() {
        let monitor = DeadmanMonitor::new(DeadMansSwitch::new(TIMEOUT), INTERVAL)
            .with_witness(Arc::new(SlowWitness))
            .with_witness_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let status = monitor.heartbeat().await;
        assert!(started.elapsed() < Duration::from_millis(450));
        assert_eq!(status.state, SwitchState::Armed);
        assert!(monitor.last_receipt().is_none());
    }

    #[tokio::test]
    async fn test_witness_receipt_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let journal = DigestJournal::new(dir.path().join("liveness.jsonl"));
        let monitor = DeadmanMonitor::new(DeadMansSwitch::new(TIMEOUT), INTERVAL)
            .with_witness(Arc::new(journal));

        monitor.heartbeat().await;
        let receipt = monitor.last_receipt().unwrap();
        assert_eq!(receipt.witness, "journal");
        assert_eq!(receipt.digest.len(), 64);
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid() {
        let config = DeadmanConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(DeadmanMonitor::from_config(&config).is_err());

        let monitor = DeadmanMonitor::from_config(&DeadmanConfig::default()).unwrap();
        assert_eq!(monitor.check_interval(), Duration::from_secs(6));
    }
}
