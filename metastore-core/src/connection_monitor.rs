//! Background reconnection with exponential backoff
//!
//! Each zone gets one [`ConnectionMonitor`] task. While its target reports
//! itself connected the monitor sleeps one interval between probes. Once a
//! probe fails it backs off exponentially and asks the target to reconnect
//! after every sleep:
//!
//! ```text
//! delay(n) = interval * 2^min(n, max_exp_counter)
//! ```
//!
//! where `n` counts reconnect attempts since the last success. A successful
//! reconnect resets `n` to zero.
//!
//! Reconnect failures are logged and swallowed; only the shutdown signal
//! stops the task. A reconnect that is already running when shutdown is
//! requested is allowed to finish.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::abstractions::Clock;
use crate::config::MonitorConfig;
use crate::error::MetastoreResult;
use crate::observability::zone_span;
use crate::types::Zone;

/// Something the monitor can probe and reconnect
#[async_trait]
pub trait Reconnectable: Send + Sync {
    /// Cheap liveness probe; must not do a network round trip
    async fn is_connected(&self) -> bool;

    /// Establish a fresh connection, replacing the current one
    async fn reconnect(&self) -> MetastoreResult<()>;
}

/// Reconnect delay schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    interval: Duration,
    max_exp_counter: u32,
    attempts: u32,
}

impl Backoff {
    pub fn new(interval: Duration, max_exp_counter: u32) -> Self {
        Self {
            interval,
            max_exp_counter,
            attempts: 0,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.interval, config.max_exp_counter)
    }

    /// Reconnect attempts since the last success
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sleep between probes while connected
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay before the next reconnect attempt, counting that attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = Self::delay_for(self.interval, self.max_exp_counter, self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay for the `attempt`-th reconnect (zero based)
    pub fn delay_for(interval: Duration, max_exp_counter: u32, attempt: u32) -> Duration {
        let exp = attempt.min(max_exp_counter);
        let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
        interval.saturating_mul(factor)
    }
}

/// Whether the monitored target was last seen healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Live,
    Recovering,
}

/// Snapshot published by a running monitor
#[derive(Debug, Clone, Default)]
pub struct MonitorStatus {
    pub state: MonitorState,
    /// Reconnect attempts since the last success
    pub attempts: u32,
    /// Successful reconnects over the monitor's lifetime
    pub reconnects: u64,
    /// Failed reconnects over the monitor's lifetime
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Outcome of one monitor iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorStep {
    /// Target was connected; slept one interval
    Healthy { slept: Duration },
    /// Target was down; slept, then reconnected
    Reconnected { slept: Duration, attempt: u32 },
    /// Target was down; slept, then failed to reconnect
    ReconnectFailed { slept: Duration, attempt: u32 },
    /// Shutdown arrived during the sleep
    Cancelled,
}

/// Reconnection driver for one zone
pub struct ConnectionMonitor {
    zone: Zone,
    target: Arc<dyn Reconnectable>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    status: MonitorStatus,
    status_tx: Option<watch::Sender<MonitorStatus>>,
}

impl ConnectionMonitor {
    pub fn new(
        zone: Zone,
        target: Arc<dyn Reconnectable>,
        clock: Arc<dyn Clock>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            zone,
            target,
            clock,
            backoff: Backoff::from_config(config),
            status: MonitorStatus::default(),
            status_tx: None,
        }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn status(&self) -> &MonitorStatus {
        &self.status
    }

    /// Start the monitor as a background task
    pub fn spawn(mut self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(MonitorStatus::default());
        self.status_tx = Some(status_tx);
        let zone = self.zone;

        let task = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        MonitorHandle {
            zone,
            shutdown_tx,
            status_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Loop until shutdown is signalled
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(zone = %self.zone, "connection monitor started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            if self.step(&mut shutdown_rx).await == MonitorStep::Cancelled {
                break;
            }
        }
        info!(zone = %self.zone, "connection monitor stopped");
    }

    /// Run a single probe/sleep/reconnect iteration
    pub async fn step(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> MonitorStep {
        if self.target.is_connected().await {
            let slept = self.backoff.interval();
            if self.sleep_or_shutdown(slept, shutdown_rx).await {
                return MonitorStep::Cancelled;
            }
            return MonitorStep::Healthy { slept };
        }

        let slept = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        if self.status.state == MonitorState::Live {
            warn!(zone = %self.zone, "connection lost, starting reconnect backoff");
        }
        self.status.state = MonitorState::Recovering;
        self.status.attempts = attempt;
        self.publish();

        debug!(zone = %self.zone, attempt, delay = ?slept, "waiting before reconnect");
        if self.sleep_or_shutdown(slept, shutdown_rx).await {
            return MonitorStep::Cancelled;
        }

        let reconnect = self.target.reconnect();
        match reconnect.instrument(zone_span("reconnect", self.zone)).await {
            Ok(()) => {
                info!(zone = %self.zone, attempts = attempt, "reconnected");
                self.backoff.reset();
                self.status.state = MonitorState::Live;
                self.status.attempts = 0;
                self.status.reconnects += 1;
                self.status.last_error = None;
                self.publish();
                MonitorStep::Reconnected { slept, attempt }
            }
            Err(e) => {
                warn!(zone = %self.zone, attempt, error = %e, "reconnect attempt failed");
                self.status.failures += 1;
                self.status.last_error = Some(e.to_string());
                self.publish();
                MonitorStep::ReconnectFailed { slept, attempt }
            }
        }
    }

    /// Returns true if shutdown was requested before the sleep finished
    async fn sleep_or_shutdown(
        &self,
        duration: Duration,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = self.clock.sleep(duration) => false,
            changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(self.status.clone());
        }
    }
}

/// Handle to a spawned monitor; dropping it stops the task
pub struct MonitorHandle {
    zone: Zone,
    shutdown_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<MonitorStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorHandle {
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Latest published status
    pub fn status(&self) -> MonitorStatus {
        self.status_rx.borrow().clone()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> MonitorStatus
    where
        F: FnMut(&MonitorStatus) -> bool,
    {
        let mut rx = self.status_rx.clone();
        loop {
            {
                let status = rx.borrow_and_update();
                if predicate(&*status) {
                    return (*status).clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Signal shutdown and wait for the task to exit
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(zone = %self.zone, "connection monitor task failed: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(true)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), 8);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_backoff_plateaus_at_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), 8);
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(256_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(256_000));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), 8);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let delay = Backoff::delay_for(Duration::from_secs(u64::MAX / 2), 40, 40);
        assert_eq!(delay, Duration::MAX);
    }
}
