//! Log throttling
//!
//! Per-key rate limit for log statements, so per-frame or per-packet warning
//! paths (policy drops, disconnected writes) cannot flood the log.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits how often the same keyed message is logged.
pub struct LogThrottler {
    last_logged: RwLock<HashMap<&'static str, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` when the keyed message should be logged now, updating
    /// the key's timestamp; `false` while the key is throttled.
    pub fn should_log(&self, key: &'static str) -> bool {
        let now = Instant::now();
        {
            let map = self.last_logged.read();
            if let Some(last) = map.get(key) {
                if now.duration_since(*last) < self.interval {
                    return false;
                }
            }
        }
        let mut map = self.last_logged.write();
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key, now);
        true
    }

    /// Forget a key so its next occurrence logs immediately. Call when the
    /// condition behind the key recovers.
    pub fn clear(&self, key: &str) {
        self.last_logged.write().remove(key);
    }
}

impl Default for LogThrottler {
    fn default() -> Self {
        Self::with_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_call_logs() {
        let throttler = LogThrottler::with_secs(1);
        assert!(throttler.should_log("key"));
    }

    #[test]
    fn test_throttles_within_interval() {
        let throttler = LogThrottler::new(Duration::from_millis(80));
        assert!(throttler.should_log("key"));
        assert!(!throttler.should_log("key"));

        thread::sleep(Duration::from_millis(120));
        assert!(throttler.should_log("key"));
    }

    #[test]
    fn test_keys_are_independent() {
        let throttler = LogThrottler::with_secs(10);
        assert!(throttler.should_log("a"));
        assert!(throttler.should_log("b"));
        assert!(!throttler.should_log("a"));
    }

    #[test]
    fn test_clear_resets_key() {
        let throttler = LogThrottler::with_secs(10);
        assert!(throttler.should_log("key"));
        throttler.clear("key");
        assert!(throttler.should_log("key"));
    }
}
