use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// Fixed one-minute window counter per key
pub struct RateLimiter<K: Eq + Hash> {
    requests: DashMap<K, (AtomicU32, AtomicI64)>,
    max_requests_per_minute: u32,
}

impl<K: Eq + Hash> RateLimiter<K> {
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            requests: DashMap::new(),
            max_requests_per_minute,
        }
    }

    pub fn check_and_increment(&self, key: K, current_time: i64) -> bool {
        let entry = self.requests.entry(key).or_insert_with(|| {
            (AtomicU32::new(0), AtomicI64::new(current_time))
        });

        let (count, window_start) = entry.value();
        let window_start_time = window_start.load(Ordering::Relaxed);

        if current_time - window_start_time >= 60 {
            window_start.store(current_time, Ordering::Relaxed);
            count.store(1, Ordering::Relaxed);
            return true;
        }

        let current_count = count.fetch_add(1, Ordering::Relaxed) + 1;

        current_count <= self.max_requests_per_minute
    }

    pub fn cleanup_old_entries(&self, current_time: i64) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, (_, window_start)| {
            current_time - window_start.load(Ordering::Relaxed) < 60
        });
        before.saturating_sub(self.requests.len())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
