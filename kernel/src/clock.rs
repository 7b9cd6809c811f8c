//! Time source and idle policy shared by the namespace, registry and
//! lifecycle sweep.

use std::sync::Mutex;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let Ok(by) = chrono::Duration::from_std(by) else {
            return;
        };
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

/// Decides whether a last-access timestamp is stale.
#[derive(Clone, Copy, Debug)]
pub struct IdlePolicy {
    idle_timeout: Duration,
}

impl IdlePolicy {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Stale once strictly more than the timeout has elapsed.
    pub fn is_stale(&self, last_access: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Ok(elapsed) = (now - last_access).to_std() else {
            // last_access lies in the future
            return false;
        };
        elapsed > self.idle_timeout
    }
}
