use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Per-provider breaker.
///
/// Trips after `failure_threshold` consecutive failures and closes again
/// once `cooldown` has elapsed. Recovery is checked lazily whenever
/// availability is queried, so no timer task is involved.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_threshold: u32,
    cooldown: Duration,
    failure_count: AtomicU32,
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        let name = name.into();
        debug!(
            "Creating circuit breaker '{}' with threshold {} and cooldown {:?}",
            name, failure_threshold, cooldown
        );

        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_threshold,
            cooldown,
            failure_count: AtomicU32::new(0),
            name,
        }
    }

    /// Whether calls may go through right now, closing the breaker if its cooldown ran out.
    pub fn is_available(&self) -> bool {
        {
            let state = self.state.read();
            match *state {
                CircuitState::Closed => return true,
                CircuitState::Open { opened_at } if opened_at.elapsed() < self.cooldown => {
                    return false;
                }
                CircuitState::Open { .. } => {}
            }
        }

        let mut state = self.state.write();
        if let CircuitState::Open { opened_at } = *state {
            if opened_at.elapsed() < self.cooldown {
                return false;
            }
            *state = CircuitState::Closed;
            self.failure_count.store(0, Ordering::SeqCst);
            info!(
                "Circuit breaker '{}' cooldown elapsed, provider available again",
                self.name
            );
        }
        true
    }

    /// Reset the consecutive-failure count.
    ///
    /// An open breaker stays open: only the cooldown check in
    /// [`is_available`](Self::is_available) closes it.
    pub fn record_success(&self) {
        let state = self.state.write();
        let previous_count = self.failure_count.swap(0, Ordering::SeqCst);

        match *state {
            CircuitState::Open { .. } => {
                debug!(
                    "Circuit breaker '{}' saw a success while open, cooldown still applies",
                    self.name
                );
            }
            CircuitState::Closed => {
                if previous_count > 0 {
                    debug!(
                        "Circuit breaker '{}' reset failure count from {}",
                        self.name, previous_count
                    );
                }
            }
        }
    }

    /// Count a failure; returns true when this call tripped the breaker.
    pub fn record_failure(&self) -> bool {
        // Count and state change under one lock so a concurrent success
        // cannot reset the count between the increment and the trip.
        let mut state = self.state.write();
        let failure_count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "Circuit breaker '{}' failure count: {}/{}",
            self.name, failure_count, self.failure_threshold
        );

        if failure_count < self.failure_threshold {
            return false;
        }

        match *state {
            CircuitState::Closed => {
                *state = CircuitState::Open { opened_at: Instant::now() };
                warn!(
                    "Circuit breaker '{}' opened due to {} consecutive failures",
                    self.name, failure_count
                );
                true
            }
            // Already open: the cooldown keeps counting from the original trip.
            CircuitState::Open { .. } => false,
        }
    }

    pub fn get_state(&self) -> CircuitState {
        *self.state.read()
    }

    pub fn get_failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn force_open(&self) {
        let mut state = self.state.write();
        *state = CircuitState::Open { opened_at: Instant::now() };
        warn!("Circuit breaker '{}' manually opened", self.name);
    }
}
