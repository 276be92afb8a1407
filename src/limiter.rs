//! Request/token rate limiter shared by all page workers of a session.
//!
//! ## Algorithm
//!
//! Quota is measured over a one-minute window. Instead of handing out the
//! whole cap the moment a window opens (and inviting a burst right at every
//! window boundary), quota is *released linearly* as the window ages:
//!
//! ```text
//! released(t) = cap × min(elapsed, 60 s) / 60 s
//! admit(cost) ⇔ consumed + cost ≤ released(t)
//! ```
//!
//! Once more than 60 s have passed since the window opened, the window
//! restarts at the current instant with nothing consumed. The full cap is
//! therefore only available at the very end of a window, and a freshly
//! opened window admits nothing until enough time has passed to cover the
//! requested cost.
//!
//! Two caps are enforced side by side: estimated tokens per minute (each
//! admission charges `cost`) and requests per minute (each admission charges
//! one request). A caller is admitted only if both caps allow it, and both
//! counters are charged in the same critical section.
//!
//! ## Concurrency
//!
//! The check-and-charge is one `Mutex` critical section, so two workers can
//! never both take the last unit of quota. The lock is never held while a
//! caller waits: [`RateLimiter::acquire`] sleeps between attempts with the
//! lock released.
//!
//! There is no starvation bound: a cost above the token cap can never be
//! admitted. [`crate::config::ProcessingConfigBuilder::build`] rejects such
//! configurations up front.

use crate::config::QuotaConfig;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Length of the quota window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Delay between admission attempts while waiting for quota.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Waits at least this long are logged at `warn`.
const SLOW_ADMISSION: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct WindowState {
    start: Instant,
    tokens: u64,
    requests: u64,
}

impl WindowState {
    /// Restart the window if more than [`WINDOW`] has passed.
    fn roll(&mut self, now: Instant) {
        if now.saturating_duration_since(self.start) > WINDOW {
            self.start = now;
            self.tokens = 0;
            self.requests = 0;
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start).min(WINDOW)
    }
}

/// Quota released after `elapsed` of a window with the given cap.
fn released(cap: u64, elapsed: Duration) -> u128 {
    u128::from(cap) * elapsed.as_nanos() / WINDOW.as_nanos()
}

/// Point-in-time view of the limiter, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    /// Estimated tokens charged in the current window.
    pub tokens_consumed: u64,
    /// Requests charged in the current window.
    pub requests_consumed: u64,
    /// Age of the current window (capped at [`WINDOW`]).
    pub window_elapsed: Duration,
}

/// Linear-release rate limiter over a one-minute window.
///
/// One instance per provider session; share it between workers with `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    rpm: u64,
    tpm: u64,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Create a limiter whose first window opens now.
    pub fn new(rpm: u64, tpm: u64) -> Self {
        Self::starting_at(rpm, tpm, Instant::now())
    }

    /// Create a limiter whose first window opens at `start`.
    pub fn starting_at(rpm: u64, tpm: u64, start: Instant) -> Self {
        Self {
            rpm,
            tpm,
            state: Mutex::new(WindowState {
                start,
                tokens: 0,
                requests: 0,
            }),
        }
    }

    /// Create a limiter from a session's quota.
    pub fn from_quota(quota: &QuotaConfig) -> Self {
        Self::new(quota.rpm, quota.tpm)
    }

    pub fn rpm(&self) -> u64 {
        self.rpm
    }

    pub fn tpm(&self) -> u64 {
        self.tpm
    }

    /// Try to admit one request of `estimated_cost` tokens right now.
    ///
    /// Returns `false` when the quota released so far does not cover the
    /// request; nothing is charged in that case.
    pub fn try_acquire(&self, estimated_cost: u64) -> bool {
        self.try_acquire_at(estimated_cost, Instant::now())
    }

    /// [`try_acquire`](Self::try_acquire) against an explicit clock reading.
    pub fn try_acquire_at(&self, estimated_cost: u64, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.roll(now);

        let elapsed = state.elapsed(now);
        let tokens_ok =
            u128::from(state.tokens) + u128::from(estimated_cost) <= released(self.tpm, elapsed);
        let requests_ok = u128::from(state.requests) + 1 <= released(self.rpm, elapsed);

        if !(tokens_ok && requests_ok) {
            return false;
        }

        state.tokens = state.tokens.saturating_add(estimated_cost);
        state.requests = state.requests.saturating_add(1);
        trace!(
            tokens = state.tokens,
            requests = state.requests,
            "Admitted request of {} tokens",
            estimated_cost
        );
        true
    }

    /// Wait until a request of `estimated_cost` tokens is admitted.
    ///
    /// Polls every [`POLL_INTERVAL`]; waits indefinitely. Use
    /// [`acquire_until`](Self::acquire_until) for a bounded wait.
    pub async fn acquire(&self, estimated_cost: u64) {
        let start = Instant::now();
        let mut attempts: u64 = 0;
        while !self.try_acquire(estimated_cost) {
            attempts += 1;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let waited = start.elapsed();
        if waited >= SLOW_ADMISSION {
            warn!("Waited {:?} for quota ({} attempts)", waited, attempts + 1);
        } else if attempts > 0 {
            debug!("Admitted after {} attempts ({:?} waiting for quota)", attempts + 1, waited);
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up at `deadline`.
    ///
    /// Returns `true` if admitted, `false` if the deadline passed first.
    pub async fn acquire_until(&self, estimated_cost: u64, deadline: Instant) -> bool {
        loop {
            if self.try_acquire(estimated_cost) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Thread-blocking form of [`acquire`](Self::acquire) for callers outside
    /// an async runtime. Never call this from an async task.
    pub fn acquire_blocking(&self, estimated_cost: u64) {
        while !self.try_acquire(estimated_cost) {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Current window counters.
    pub fn snapshot(&self) -> LimiterSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Window counters as seen at `now` (rolls the window if it expired).
    pub fn snapshot_at(&self, now: Instant) -> LimiterSnapshot {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.roll(now);
        LimiterSnapshot {
            tokens_consumed: state.tokens,
            requests_consumed: state.requests,
            window_elapsed: state.elapsed(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn fresh_window_admits_nothing() {
        let t0 = Instant::now();
        let limiter = RateLimiter::starting_at(1000, 600, t0);
        assert!(!limiter.try_acquire_at(1, t0));
    }

    #[test]
    fn full_cap_is_admitted_then_exhausted_then_restored() {
        let t0 = Instant::now();
        let limiter = RateLimiter::starting_at(1000, 600, t0);

        // End of the first window: the whole cap has been released.
        let end = t0 + WINDOW;
        assert!(limiter.try_acquire_at(200, end));
        assert!(limiter.try_acquire_at(250, end));
        assert!(limiter.try_acquire_at(150, end));
        assert!(!limiter.try_acquire_at(1, end), "cap is spent");

        // Past the boundary the window restarts empty at that instant.
        let restart = t0 + secs(61);
        assert!(!limiter.try_acquire_at(200, restart));
        assert_eq!(limiter.snapshot_at(restart).tokens_consumed, 0);

        // The same cost fits again once the new window has released it.
        assert!(limiter.try_acquire_at(200, restart + secs(20)));
    }

    #[test]
    fn quota_is_released_linearly() {
        let t0 = Instant::now();
        let limiter = RateLimiter::starting_at(1000, 600, t0);

        let half = t0 + secs(30);
        assert!(limiter.try_acquire_at(300, half));
        assert!(!limiter.try_acquire_at(1, half));

        let three_quarters = t0 + secs(45);
        assert!(limiter.try_acquire_at(150, three_quarters));
        assert!(!limiter.try_acquire_at(1, three_quarters));
    }

    #[test]
    fn request_cap_is_enforced_independently() {
        let t0 = Instant::now();
        let limiter = RateLimiter::starting_at(2, 1_000_000, t0);
        let end = t0 + WINDOW;
        assert!(limiter.try_acquire_at(1, end));
        assert!(limiter.try_acquire_at(1, end));
        assert!(!limiter.try_acquire_at(1, end), "third request exceeds RPM");
        assert_eq!(limiter.snapshot_at(end).requests_consumed, 2);
    }

    #[test]
    fn rejected_attempt_charges_nothing() {
        let t0 = Instant::now();
        let limiter = RateLimiter::starting_at(1000, 600, t0);
        let at = t0 + secs(10);
        assert!(!limiter.try_acquire_at(500, at));
        let snap = limiter.snapshot_at(at);
        assert_eq!(snap.tokens_consumed, 0);
        assert_eq!(snap.requests_consumed, 0);
    }

    #[test]
    fn concurrent_callers_never_overshoot() {
        let t0 = Instant::now();
        let limiter = Arc::new(RateLimiter::starting_at(10_000, 100, t0));
        let admitted = Arc::new(AtomicU64::new(0));
        let end = t0 + WINDOW;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if limiter.try_acquire_at(1, end) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_released_quota() {
        let limiter = RateLimiter::new(1000, 80_000);
        let start = Instant::now();
        limiter.acquire(2000).await;
        let waited = start.elapsed();
        // 2000 / 80000 of a minute = 1.5 s, observed at 100 ms granularity.
        assert!(waited >= Duration::from_millis(1500), "waited {waited:?}");
        assert!(waited < Duration::from_millis(1700), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_until_gives_up_at_deadline() {
        let limiter = RateLimiter::new(1000, 600);
        let deadline = Instant::now() + secs(1);
        assert!(!limiter.acquire_until(600, deadline).await);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn acquire_blocking_returns_when_quota_is_available() {
        let start = Instant::now().checked_sub(secs(30)).unwrap();
        let limiter = RateLimiter::starting_at(1000, 600, start);
        limiter.acquire_blocking(100);
        assert_eq!(limiter.snapshot().tokens_consumed, 100);
    }

    #[test]
    fn acquire_future_completes_outside_tokio_test() {
        let start = Instant::now().checked_sub(secs(30)).unwrap();
        let limiter = RateLimiter::starting_at(1000, 600, start);
        tokio_test::block_on(limiter.acquire(250));
        assert_eq!(limiter.snapshot().tokens_consumed, 250);
    }
}
