//! Per-action cooldown tracking for the gateway's write paths.
//!
//! Each action name owns one cooldown window shared by every caller. Only
//! admitted calls move the window; rejected calls leave it untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Action name for record writes.
pub const WRITE_ACTION: &str = "write-storage";
/// Action name for blob uploads.
pub const UPLOAD_ACTION: &str = "save-cloud-file";

/// Default cooldown between admitted invocations of one action.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(10_000);

/// Millisecond time source for the tracker.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Monotonic milliseconds since the clock was created.
///
/// BUG-012: monotonic so NTP corrections or VM resume cannot reopen or
/// extend a window.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cooldown tracker keyed by action name.
///
/// Constructed once per process and handed to the gateway. State lives for
/// the process lifetime and is never persisted.
pub struct CooldownTracker {
    clock: Arc<dyn Clock>,
    window_ms: u64,
    last_admitted: Mutex<HashMap<String, u64>>,
}

impl CooldownTracker {
    /// Tracker on the monotonic system clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window_ms: window.as_millis() as u64,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when `action` must be rejected.
    ///
    /// Rejects if less than the window has elapsed since the last admitted
    /// call, without touching the stored timestamp. Otherwise records now and
    /// admits. An action never seen before is always admitted.
    ///
    /// The read and the write happen under one lock, so two concurrent calls
    /// for the same action cannot both be admitted inside one window.
    pub fn is_rate_limited(&self, action: &str) -> bool {
        let now = self.clock.now_ms();
        let mut last_admitted = self
            .last_admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(&last) = last_admitted.get(action) {
            if now.saturating_sub(last) < self.window_ms {
                return true;
            }
        }

        last_admitted.insert(action.to_owned(), now);
        false
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl std::fmt::Debug for CooldownTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownTracker")
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}
