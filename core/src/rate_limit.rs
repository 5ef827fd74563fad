use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window request counter keyed by caller-supplied strings.
///
/// Callers compose keys as `action:client` (e.g.
/// `artifacts:comments:post:203.0.113.10`). The first observation of a key,
/// or any observation at/after the bucket's reset time, starts a fresh
/// window with count 1. Expiry is lazy — buckets are only examined on the
/// next access, never on a background timer.
///
/// Each process instance enforces its own limit; there is no cross-process
/// coordination. That is acceptable for abuse mitigation but not for hard
/// quotas.
///
/// An injectable component instance rather than a module-level map, so tests
/// construct isolated limiters instead of sharing global state.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and count one request against `key`, allowing at most `max`
    /// requests per `window`.
    pub fn check(&self, key: &str, window: Duration, max: u32) -> RateDecision {
        self.check_at(key, window, max, Utc::now())
    }

    fn check_at(&self, key: &str, window: Duration, max: u32, now: DateTime<Utc>) -> RateDecision {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");

        let bucket = buckets.get(key).copied();
        match bucket {
            Some(mut bucket) if now < bucket.reset_at => {
                bucket.count += 1;
                buckets.insert(key.to_string(), bucket);
                if bucket.count > max {
                    let millis = (bucket.reset_at - now).num_milliseconds().max(0) as u64;
                    RateDecision::Limited {
                        retry_after_secs: millis.div_ceil(1000),
                    }
                } else {
                    RateDecision::Allowed
                }
            }
            _ => {
                // First observation, or the window has elapsed.
                buckets.insert(
                    key.to_string(),
                    Bucket {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                RateDecision::Allowed
            }
        }
    }

    /// Clear all buckets. Test support only.
    pub fn reset(&self) {
        self.buckets
            .lock()
            .expect("rate limiter mutex poisoned")
            .clear();
    }
}

/// Derive the client identifier for rate-limit keys from `X-Forwarded-For`.
///
/// Only the first hop is trusted — anything after it is attacker-appendable.
/// Absent or empty headers map to the `"unknown"` sentinel.
pub fn client_identifier(forwarded_for: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_limits_with_retry_hint() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        let window = Duration::milliseconds(1000);

        for _ in 0..3 {
            assert_eq!(
                limiter.check_at("comments:post:1.2.3.4", window, 3, now),
                RateDecision::Allowed
            );
        }
        match limiter.check_at("comments:post:1.2.3.4", window, 3, now) {
            RateDecision::Limited { retry_after_secs } => assert!(retry_after_secs >= 1),
            RateDecision::Allowed => panic!("fourth call within the window must be limited"),
        }
    }

    #[test]
    fn window_elapse_resets_the_counter_to_one() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        let window = Duration::milliseconds(1000);

        for _ in 0..4 {
            limiter.check_at("k", window, 3, now);
        }
        let later = now + Duration::milliseconds(1001);
        assert_eq!(limiter.check_at("k", window, 3, later), RateDecision::Allowed);
        // Counter restarted at 1: two more calls still fit in the new window.
        assert_eq!(limiter.check_at("k", window, 3, later), RateDecision::Allowed);
        assert_eq!(limiter.check_at("k", window, 3, later), RateDecision::Allowed);
        assert!(!limiter.check_at("k", window, 3, later).is_allowed());
    }

    #[test]
    fn retry_hint_rounds_partial_seconds_up() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        let window = Duration::milliseconds(1500);

        assert!(limiter.check_at("k", window, 1, now).is_allowed());
        match limiter.check_at("k", window, 1, now) {
            RateDecision::Limited { retry_after_secs } => assert_eq!(retry_after_secs, 2),
            RateDecision::Allowed => panic!("second call within the window must be limited"),
        }
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        assert!(limiter.check_at("a:1.1.1.1", window, 1, now).is_allowed());
        assert!(!limiter.check_at("a:1.1.1.1", window, 1, now).is_allowed());
        assert!(limiter.check_at("a:2.2.2.2", window, 1, now).is_allowed());
        assert!(limiter.check_at("b:1.1.1.1", window, 1, now).is_allowed());
    }

    #[test]
    fn reset_clears_all_buckets() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        limiter.check_at("k", window, 1, now);
        assert!(!limiter.check_at("k", window, 1, now).is_allowed());
        limiter.reset();
        assert!(limiter.check_at("k", window, 1, now).is_allowed());
    }

    #[test]
    fn client_identifier_takes_first_hop_only() {
        assert_eq!(
            client_identifier(Some("203.0.113.10, 10.0.0.1")),
            "203.0.113.10"
        );
        assert_eq!(client_identifier(Some(" 198.51.100.7 ")), "198.51.100.7");
        assert_eq!(client_identifier(Some("")), "unknown");
        assert_eq!(client_identifier(None), "unknown");
    }
}
