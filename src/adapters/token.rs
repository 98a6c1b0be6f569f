//! Short-lived access-token cache.
//!
//! Explicit, injected component: constructed once per process and handed
//! to the adapters that need it. Entries expire after a fixed TTL and the
//! next reader re-fetches.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL cache for provider access tokens, keyed by credential name
pub struct TokenCache {
    entries: Mutex<HashMap<String, CachedToken>>,
    ttl: Duration,
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a cached token if one is present and unexpired
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().expect("token cache poisoned");
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.token.clone())
    }

    /// Store a freshly fetched token
    pub fn put(&self, key: impl Into<String>, token: impl Into<String>) {
        let mut entries = self.entries.lock().expect("token cache poisoned");
        entries.insert(
            key.into(),
            CachedToken {
                token: token.into(),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop a token early (e.g. after a 401)
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().expect("token cache poisoned");
        entries.remove(key);
    }
}
