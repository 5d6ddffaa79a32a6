//! Per-user sliding-window admission control.
//!
//! Each user gets its own window slot behind a dedicated mutex, so admission
//! checks for different users never contend on the same lock. The outer map
//! lock is only taken for writing when a new user shows up.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics;

/// Maximum number of users to track before idle windows are swept.
const MAX_TRACKED_USERS: usize = 10_000;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Seconds until the oldest request leaves the window. Zero when allowed.
    pub retry_after_secs: u64,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    fn rejected(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs,
        }
    }
}

#[derive(Debug, Default)]
struct UserWindow {
    request_timestamps: VecDeque<Instant>,
}

impl UserWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.request_timestamps.front() {
            if now.duration_since(*oldest) >= window {
                self.request_timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window throttle keyed by user id.
pub struct UserThrottle {
    windows: RwLock<HashMap<String, Arc<Mutex<UserWindow>>>>,
    max_requests: usize,
    window: Duration,
}

impl UserThrottle {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<UserWindow>> {
        {
            let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = windows.get(user_id) {
                return Arc::clone(slot);
            }
        }

        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        // Double-check after acquiring write lock
        if let Some(slot) = windows.get(user_id) {
            return Arc::clone(slot);
        }

        if windows.len() >= MAX_TRACKED_USERS {
            self.sweep_idle(&mut windows);
        }

        let slot = Arc::new(Mutex::new(UserWindow::default()));
        windows.insert(user_id.to_string(), Arc::clone(&slot));
        slot
    }

    fn sweep_idle(&self, windows: &mut HashMap<String, Arc<Mutex<UserWindow>>>) {
        let now = Instant::now();
        let before = windows.len();
        windows.retain(|_, slot| {
            let mut window = slot.lock().unwrap_or_else(PoisonError::into_inner);
            window.prune(now, self.window);
            !window.request_timestamps.is_empty()
        });
        warn!(
            removed = before - windows.len(),
            "User throttle exceeded capacity, swept idle windows"
        );
    }

    /// Check and record one request for `user_id`.
    pub fn admit(&self, user_id: &str) -> Admission {
        let slot = self.slot(user_id);
        let mut window = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        window.prune(now, self.window);

        if window.request_timestamps.len() >= self.max_requests {
            let retry_after_secs = window
                .request_timestamps
                .front()
                .map(|oldest| {
                    let elapsed = now.duration_since(*oldest);
                    ceil_secs(self.window.saturating_sub(elapsed))
                })
                .unwrap_or(1)
                .max(1);
            debug!(user_id = %user_id, retry_after_secs, "User throttled");
            metrics::record_throttle_rejection();
            return Admission::rejected(retry_after_secs);
        }

        window.request_timestamps.push_back(now);
        Admission::allowed()
    }

    /// Admits left in the current window, without recording anything.
    pub fn remaining(&self, user_id: &str) -> usize {
        let slot = {
            let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
            match windows.get(user_id) {
                Some(slot) => Arc::clone(slot),
                None => return self.max_requests,
            }
        };
        let mut window = slot.lock().unwrap_or_else(PoisonError::into_inner);
        window.prune(Instant::now(), self.window);
        self.max_requests.saturating_sub(window.request_timestamps.len())
    }

    /// Number of users with a tracked window.
    pub fn tracked_users(&self) -> usize {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit_then_rejects() {
        let throttle = UserThrottle::new(10, Duration::from_secs(60));
        for _ in 0..10 {
            assert!(throttle.admit("alice").allowed);
        }
        let rejected = throttle.admit("alice");
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after_secs, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_tracks_oldest_request() {
        let throttle = UserThrottle::new(2, Duration::from_secs(60));
        assert!(throttle.admit("bob").allowed);
        tokio::time::advance(Duration::from_millis(20_500)).await;
        assert!(throttle.admit("bob").allowed);

        let rejected = throttle.admit("bob");
        assert!(!rejected.allowed);
        // 60 - 20.5 = 39.5, rounded up
        assert_eq!(rejected.retry_after_secs, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let throttle = UserThrottle::new(1, Duration::from_secs(60));
        assert!(throttle.admit("carol").allowed);
        assert!(!throttle.admit("carol").allowed);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(throttle.admit("carol").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let throttle = UserThrottle::new(1, Duration::from_secs(60));
        assert!(throttle.admit("a").allowed);
        assert!(throttle.admit("b").allowed);
        assert!(!throttle.admit("a").allowed);
        assert_eq!(throttle.tracked_users(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_grow_window() {
        let throttle = UserThrottle::new(2, Duration::from_secs(60));
        throttle.admit("dave");
        throttle.admit("dave");
        for _ in 0..5 {
            assert!(!throttle.admit("dave").allowed);
        }
        assert_eq!(throttle.remaining("dave"), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(throttle.remaining("dave"), 2);
    }

    #[test]
    fn test_remaining_for_unknown_user() {
        let throttle = UserThrottle::new(3, Duration::from_secs(60));
        assert_eq!(throttle.remaining("nobody"), 3);
        assert_eq!(throttle.tracked_users(), 0);
    }
}
