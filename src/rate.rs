//! A fixed-rate barrier (C6): throttles a sequence of async operations to at most `n`
//! permits per time window, used by the entry-source streaming iterator and by the
//! server's per-connection reader loop to bound how fast either side can make progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// A token-bucket-like pacing primitive: `acquire()` blocks until a permit is
/// available, replenishing `rate` permits every `interval`.
///
/// Unlike a plain `tokio::time::interval`, replenishment is lazy: a `RateBarrier` that
/// nobody calls `acquire()` on for a long time does not accumulate unbounded credit —
/// at most `rate` permits are ever outstanding at once, matching a token bucket with
/// burst size `rate`.
pub struct RateBarrier {
    inner: Mutex<State>,
    shutdown: AtomicBool,
}

struct State {
    tokens: u32,
    rate: u32,
    interval: Duration,
    last_refill: Instant,
}

impl RateBarrier {
    /// A barrier permitting up to `rate` acquisitions per `interval`, starting full.
    pub fn new(rate: u32, interval: Duration) -> Arc<RateBarrier> {
        let rate = rate.max(1);
        Arc::new(RateBarrier {
            inner: Mutex::new(State { tokens: rate, rate, interval, last_refill: Instant::now() }),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Wait until a permit is available, then consume it. Returns immediately once the
    /// barrier has been [`shutdown`](Self::shutdown).
    pub async fn acquire(&self) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let wait = {
                let mut state = self.inner.lock().await;
                self.refill(&mut state);
                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }
                state.interval / state.rate.max(1)
            };
            tokio::time::sleep(wait.min(Duration::from_millis(10))).await;
        }
    }

    /// Non-blocking variant: consume a permit if one is immediately available. Always
    /// succeeds once the barrier has been [`shutdown`](Self::shutdown).
    pub async fn try_acquire(&self) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return true;
        }
        let mut state = self.inner.lock().await;
        self.refill(&mut state);
        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Change the permitted rate, effective on the next refill. Outstanding tokens are
    /// capped to the new rate so a lowered rate takes effect immediately rather than
    /// after the old burst is drained.
    pub async fn set_rate(&self, rate: u32, interval: Duration) {
        let rate = rate.max(1);
        let mut state = self.inner.lock().await;
        state.rate = rate;
        state.interval = interval;
        state.tokens = state.tokens.min(rate);
    }

    /// Disable throttling: every outstanding and future `acquire`/`try_acquire` call
    /// returns immediately. Used when tearing down a server so in-flight operations can
    /// drain without waiting on a barrier nobody will refill again.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn refill(&self, state: &mut State) {
        let elapsed = state.last_refill.elapsed();
        if elapsed >= state.interval {
            let windows = (elapsed.as_nanos() / state.interval.as_nanos().max(1)) as u32;
            state.tokens = state.rate.min(state.tokens.saturating_add(windows * state.rate));
            state.last_refill += state.interval * windows;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn burst_up_to_rate_is_immediate() {
        let barrier = RateBarrier::new(3, Duration::from_millis(200));
        for _ in 0..3 {
            assert!(barrier.try_acquire().await);
        }
        assert!(!barrier.try_acquire().await);
    }

    #[tokio::test]
    async fn acquire_eventually_unblocks_after_refill() {
        let barrier = RateBarrier::new(1, Duration::from_millis(20));
        barrier.acquire().await;
        let start = Instant::now();
        barrier.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn set_rate_caps_outstanding_tokens() {
        let barrier = RateBarrier::new(5, Duration::from_millis(200));
        barrier.set_rate(2, Duration::from_millis(200)).await;
        assert!(barrier.try_acquire().await);
        assert!(barrier.try_acquire().await);
        assert!(!barrier.try_acquire().await);
    }

    #[tokio::test]
    async fn shutdown_unblocks_immediately() {
        let barrier = RateBarrier::new(1, Duration::from_millis(500));
        assert!(barrier.try_acquire().await);
        barrier.shutdown();
        let start = Instant::now();
        barrier.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(barrier.try_acquire().await);
    }
}
