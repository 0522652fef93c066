//! Sliding-window admission control for outbound sends.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Admits at most `max_requests` sends in any trailing `window`.
///
/// [`acquire`](Self::acquire) never waits; callers that are denied sleep for
/// [`retry_after`](Self::retry_after) and try again.
///
/// # Examples
///
/// ```
/// use chunk_relay::bridge::SlidingWindowLimiter;
/// use std::time::Duration;
///
/// let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
/// assert!(limiter.acquire());
/// assert!(limiter.acquire());
/// assert!(!limiter.acquire());
/// assert!(limiter.retry_after() > Duration::ZERO);
/// ```
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Returns the admission ceiling per window.
    #[must_use]
    pub const fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Returns the window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Tries to admit one send now.
    ///
    /// Prunes timestamps that left the window, then admits and records the
    /// send if fewer than `max_requests` remain.
    pub fn acquire(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.admitted.lock();
        self.prune(&mut admitted, now);
        if admitted.len() < self.max_requests {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Returns the time until the oldest admitted send leaves the window,
    /// or zero when nothing is tracked.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        let now = Instant::now();
        let mut admitted = self.admitted.lock();
        self.prune(&mut admitted, now);
        admitted.front().map_or(Duration::ZERO, |&oldest| {
            oldest
                .checked_add(self.window)
                .map_or(Duration::MAX, |end| end.saturating_duration_since(now))
        })
    }

    /// Waits until a send is admitted.
    pub async fn acquire_wait(&self) {
        while !self.acquire() {
            let wait = self.retry_after().max(Duration::from_millis(1));
            tracing::debug!(wait_ms = wait.as_millis(), "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Returns the number of sends currently inside the window.
    #[must_use]
    pub fn in_window(&self) -> usize {
        let mut admitted = self.admitted.lock();
        self.prune(&mut admitted, Instant::now());
        admitted.len()
    }

    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test(start_paused = true)]
    async fn test_thirty_first_call_is_denied() {
        let limiter = SlidingWindowLimiter::new(30, Duration::from_secs(60));
        for _ in 0..30 {
            assert!(limiter.acquire());
            tokio::time::advance(Duration::from_millis(300)).await;
        }
        assert!(!limiter.acquire());

        let retry = limiter.retry_after();
        assert!(retry > Duration::ZERO);
        assert!(retry <= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.acquire());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.acquire());
        assert!(!limiter.acquire());
        assert_eq!(limiter.retry_after(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.in_window(), 1);
        assert!(limiter.acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_window_saturates() {
        let limiter = SlidingWindowLimiter::new(1, Duration::MAX);
        assert!(limiter.acquire());
        assert!(!limiter.acquire());
        assert_eq!(limiter.retry_after(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_empty_is_zero() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(1));
        assert_eq!(limiter.retry_after(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_wait_sleeps_until_admitted() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire_wait().await;
        limiter.acquire_wait().await;
        assert!(Instant::now().duration_since(start) >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_ceiling() {
        let limiter = std::sync::Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire() }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_ceiling(
            max in 1usize..10,
            gaps in prop::collection::vec(0u64..3_000, 1..80),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let window = Duration::from_secs(10);
                let limiter = SlidingWindowLimiter::new(max, window);
                let mut admitted: Vec<Instant> = Vec::new();
                for gap in gaps {
                    tokio::time::advance(Duration::from_millis(gap)).await;
                    if limiter.acquire() {
                        admitted.push(Instant::now());
                    }
                    let now = Instant::now();
                    let recent = admitted
                        .iter()
                        .filter(|&&t| now.duration_since(t) < window)
                        .count();
                    assert!(recent <= max);
                }
            });
        }
    }
}
