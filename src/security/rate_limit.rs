// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-window attempt counters keyed by arbitrary strings.
//!
//! A [`LimiterCache`] counts attempts per key inside a window of fixed
//! duration. The window starts at the first attempt and is only replaced on
//! the first attempt after it has expired, so a rejecting window keeps
//! rejecting until its lifetime has fully elapsed.
//!
//! Idle entries are evicted by [`LimiterCache::house_keep`], which is meant to
//! be driven by a periodic task (see [`crate::server::maintenance`]).
//!
//! # Example
//!
//! ```
//! use gatekeeper::security::{LimiterCache, LimiterConfig};
//! use std::time::Duration;
//!
//! let cache = LimiterCache::new(LimiterConfig::new(
//!     2,
//!     Duration::from_secs(60),
//!     Duration::from_secs(120),
//! ));
//!
//! assert!(cache.check("alice"));
//! assert!(cache.check("alice"));
//! assert!(!cache.check("alice"));
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Configuration for a single rate limiter cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum attempts allowed per window. The attempt that pushes the
    /// counter above this value is the first one rejected.
    pub threshold: u32,
    /// Duration of one counting window.
    pub lifetime: Duration,
    /// Entries whose window started longer ago than this are evicted by
    /// housekeeping.
    pub housekeeping_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            lifetime: Duration::from_secs(60),
            housekeeping_interval: Duration::from_secs(120),
        }
    }
}

impl LimiterConfig {
    /// Create a new limiter configuration.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Maximum attempts per window
    /// * `lifetime` - Window duration
    /// * `housekeeping_interval` - Idle time after which an entry is evicted
    pub fn new(threshold: u32, lifetime: Duration, housekeeping_interval: Duration) -> Self {
        Self {
            threshold,
            lifetime,
            housekeeping_interval,
        }
    }
}

/// Attempt counter for one key.
#[derive(Debug, Clone, Copy)]
struct LimiterEntry {
    /// Attempts recorded since `window_start`. Never zero.
    counter: u32,
    /// First attempt of the current window.
    window_start: Instant,
}

impl LimiterEntry {
    fn new(now: Instant) -> Self {
        Self {
            counter: 1,
            window_start: now,
        }
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }
}

/// Point-in-time view of one key's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    /// Attempts recorded in the current window.
    pub counter: u32,
    /// When the current window started.
    pub window_start: Instant,
}

/// Thread-safe map from key to fixed-window attempt counter.
///
/// All counter transitions for every key happen under one exclusive lock, so
/// `check` and `reset` on the same key are linearizable. Housekeeping scans
/// under the shared lock and only takes the exclusive lock to delete.
#[derive(Debug)]
pub struct LimiterCache {
    config: LimiterConfig,
    entries: RwLock<HashMap<String, LimiterEntry>>,
}

impl LimiterCache {
    /// Create an empty cache with the given configuration.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record an attempt for `key`.
    ///
    /// Returns `true` if the attempt is within the threshold for the current
    /// window, `false` if it is rejected.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Record an attempt for `key` as if it happened at `now`.
    ///
    /// `now` must not go backwards between calls for the same key.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(key) {
            if entry.age(now) > self.config.lifetime {
                *entry = LimiterEntry::new(now);
                return true;
            }

            // window_start stays put even when rejecting
            entry.counter = entry.counter.saturating_add(1);
            return entry.counter <= self.config.threshold;
        }

        entries.insert(key.to_owned(), LimiterEntry::new(now));
        true
    }

    /// Forget `key`. The next attempt starts a fresh window.
    pub fn reset(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Evict entries that have been idle for longer than the housekeeping
    /// interval. Returns the number of evicted entries.
    pub fn house_keep(&self) -> usize {
        let stale = self.mark(Instant::now());
        if stale.is_empty() {
            return 0;
        }
        self.sweep(&stale, Instant::now())
    }

    /// Same as [`house_keep`](Self::house_keep) with an explicit clock.
    pub fn house_keep_at(&self, now: Instant) -> usize {
        let stale = self.mark(now);
        if stale.is_empty() {
            return 0;
        }
        self.sweep(&stale, now)
    }

    /// Collect stale keys under the shared lock.
    fn mark(&self, now: Instant) -> Vec<String> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|(_, entry)| entry.age(now) > self.config.housekeeping_interval)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Delete marked keys that are still stale under the exclusive lock.
    ///
    /// A key may have started a new window between mark and sweep.
    fn sweep(&self, stale: &[String], now: Instant) -> usize {
        let mut entries = self.entries.write();
        let mut removed = 0;
        for key in stale {
            let still_stale = entries
                .get(key)
                .is_some_and(|entry| entry.age(now) > self.config.housekeeping_interval);
            if still_stale {
                entries.remove(key);
                removed += 1;
            }
        }
        removed
    }

    /// Current counter state for `key`, if tracked.
    pub fn snapshot(&self, key: &str) -> Option<LimiterSnapshot> {
        self.entries.read().get(key).map(|entry| LimiterSnapshot {
            counter: entry.counter,
            window_start: entry.window_start,
        })
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
