use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Requests allowed per window for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateBudget {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

#[derive(Debug)]
struct WindowState {
    started_at: Instant,
    count: u32,
}

/// Fixed-window request counter.
///
/// Admits up to `max_requests` bursts at the start of each window and
/// resets on the first check that sees the window has aged out, so it can
/// under-admit near boundaries. Callers must not expect smooth pacing.
#[derive(Debug)]
pub struct FixedWindow {
    provider_name: String,
    budget: RateBudget,
    state: Mutex<WindowState>,
}

impl FixedWindow {
    pub fn new(provider_name: impl Into<String>, budget: RateBudget) -> Self {
        Self {
            provider_name: provider_name.into(),
            budget,
            state: Mutex::new(WindowState {
                started_at: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();

        if now.duration_since(state.started_at) >= self.budget.window {
            state.started_at = now;
            state.count = 0;
        }

        if state.count < self.budget.max_requests {
            state.count += 1;
            debug!(
                "Reserved request slot for {} ({}/{})",
                self.provider_name, state.count, self.budget.max_requests
            );
            true
        } else {
            debug!(
                "Rate window exhausted for {} ({}/{})",
                self.provider_name, state.count, self.budget.max_requests
            );
            false
        }
    }

    /// Requests counted in the window that is still current, zero if it has aged out.
    pub fn requests_in_window(&self) -> u32 {
        let state = self.state.lock();
        if state.started_at.elapsed() >= self.budget.window {
            0
        } else {
            state.count
        }
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }
}
