//! Time abstractions for testability
//!
//! The connection monitor is the only component that sleeps. It does so
//! through [`Clock`] so tests can substitute [`MockClock`], which records
//! every requested sleep and advances virtual time instead of waiting.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Instant in time (monotonic clock)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(u64); // Microseconds since the clock's epoch

impl Instant {
    /// Create from microseconds
    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Get microseconds value
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Duration since another instant
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Abstraction for time operations
#[async_trait]
pub trait Clock: Send + Sync {
    /// Get current instant (monotonic)
    fn now(&self) -> Instant;

    /// Sleep for a duration
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by tokio timers
pub struct SystemClock {
    epoch: std::time::Instant,
}

impl SystemClock {
    /// Create new instance
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.epoch.elapsed().as_micros() as u64)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct MockClockState {
    current_micros: u64,
    sleeps: Vec<Duration>,
}

/// Mock clock for deterministic testing
///
/// `sleep` returns after yielding once to the scheduler, having advanced
/// virtual time by the requested duration.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    state: Arc<Mutex<MockClockState>>,
}

impl MockClock {
    /// Create new mock clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by duration without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.state.lock().current_micros += duration.as_micros() as u64;
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// Total virtual time elapsed
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.state.lock().current_micros)
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.state.lock().current_micros)
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.current_micros += duration.as_micros() as u64;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}
