use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-key request class with its per-second budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    Ingest,
    Query,
    WsConnect,
}

impl RateClass {
    fn limit(&self) -> u32 {
        match self {
            RateClass::Ingest => 100,
            RateClass::Query => 30,
            RateClass::WsConnect => 5,
        }
    }
}

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed one-second windows per (key, class). Plenty at this scale; the
/// state is just a counter pair per active key.
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, RateClass), Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request; Err carries the retry hint in seconds.
    pub fn check(&self, key_id: &str, class: RateClass) -> Result<(), u64> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry((key_id.to_string(), class))
            .or_insert_with(|| Window {
                started: Instant::now(),
                count: 0,
            });

        if window.started.elapsed() >= Duration::from_secs(1) {
            window.started = Instant::now();
            window.count = 0;
        }

        window.count += 1;
        if window.count > class.limit() {
            Err(1)
        } else {
            Ok(())
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
