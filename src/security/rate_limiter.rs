//! Per-user sliding-window rate limiting
//!
//! One mutex guards the bucket map; `allow`, `wait_seconds` and `count` are
//! each atomic. Eviction is lazy at the start of every public call and
//! empty buckets are reclaimed to bound memory.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::domain::session::UserId;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    buckets: Mutex<HashMap<UserId, Vec<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or deny a request for `user`, recording it when admitted.
    pub fn allow(&self, user: &UserId) -> bool {
        self.allow_at(user, Utc::now())
    }

    /// Seconds until `user` may make another request; 0 when under the limit.
    pub fn wait_seconds(&self, user: &UserId) -> u64 {
        self.wait_seconds_at(user, Utc::now())
    }

    /// Requests currently inside the window for `user`.
    pub fn count(&self, user: &UserId) -> usize {
        self.count_at(user, Utc::now())
    }

    pub(crate) fn allow_at(&self, user: &UserId, now: DateTime<Utc>) -> bool {
        let mut buckets = self.buckets.lock();
        Self::evict(&mut buckets, self.window, now);
        let bucket = buckets.entry(user.clone()).or_default();
        if bucket.len() >= self.max_requests {
            tracing::warn!(user = %user, requests = bucket.len(), "rate limit exceeded");
            return false;
        }
        bucket.push(now);
        true
    }

    pub(crate) fn wait_seconds_at(&self, user: &UserId, now: DateTime<Utc>) -> u64 {
        let mut buckets = self.buckets.lock();
        Self::evict(&mut buckets, self.window, now);
        match buckets.get(user) {
            Some(bucket) if bucket.len() >= self.max_requests => {
                let oldest = bucket.iter().min().copied().unwrap_or(now);
                (oldest + self.window - now).num_seconds().max(0) as u64
            }
            _ => 0,
        }
    }

    pub(crate) fn count_at(&self, user: &UserId, now: DateTime<Utc>) -> usize {
        let mut buckets = self.buckets.lock();
        Self::evict(&mut buckets, self.window, now);
        buckets.get(user).map_or(0, Vec::len)
    }

    fn evict(
        buckets: &mut HashMap<UserId, Vec<DateTime<Utc>>>,
        window: Duration,
        now: DateTime<Utc>,
    ) {
        for bucket in buckets.values_mut() {
            bucket.retain(|stamp| now - *stamp < window);
        }
        buckets.retain(|_, bucket| !bucket.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{ProcessSecret, Session};

    fn user() -> UserId {
        Session::create(&ProcessSecret::generate(), Utc::now()).user_id
    }

    #[test]
    fn test_admits_up_to_max_within_window() {
        let limiter = RateLimiter::new(20, Duration::seconds(60));
        let user = user();
        let t0 = Utc::now();

        for _ in 0..20 {
            assert!(limiter.allow_at(&user, t0));
        }
        assert!(!limiter.allow_at(&user, t0));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(20, Duration::seconds(60));
        let user = user();
        let t0 = Utc::now();

        for _ in 0..20 {
            assert!(limiter.allow_at(&user, t0));
        }
        assert!(!limiter.allow_at(&user, t0));
        // 61 seconds later the window has passed
        assert!(limiter.allow_at(&user, t0 + Duration::seconds(61)));
    }

    #[test]
    fn test_wait_seconds() {
        let limiter = RateLimiter::new(2, Duration::seconds(60));
        let user = user();
        let t0 = Utc::now();

        assert_eq!(limiter.wait_seconds_at(&user, t0), 0);
        limiter.allow_at(&user, t0);
        limiter.allow_at(&user, t0 + Duration::seconds(10));
        assert_eq!(limiter.wait_seconds_at(&user, t0 + Duration::seconds(15)), 45);
    }

    #[test]
    fn test_count_reflects_eviction() {
        let limiter = RateLimiter::new(5, Duration::seconds(60));
        let user = user();
        let t0 = Utc::now();

        limiter.allow_at(&user, t0);
        limiter.allow_at(&user, t0 + Duration::seconds(30));
        assert_eq!(limiter.count_at(&user, t0 + Duration::seconds(30)), 2);
        assert_eq!(limiter.count_at(&user, t0 + Duration::seconds(75)), 1);
        assert_eq!(limiter.count_at(&user, t0 + Duration::seconds(120)), 0);
    }

    #[test]
    fn test_users_are_isolated() {
        let limiter = RateLimiter::new(1, Duration::seconds(60));
        let (a, b) = (user(), user());
        let t0 = Utc::now();

        assert!(limiter.allow_at(&a, t0));
        assert!(!limiter.allow_at(&a, t0));
        assert!(limiter.allow_at(&b, t0));
    }
}
