use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, WallfetchError};

/// Spaces out requests to one service.
///
/// Every call waits until `min_interval` has passed since the previous one.
/// With window caps set, a call that would exceed any cap fails with
/// `RateLimited` instead of waiting.
pub struct RateLimiter {
    name: String,
    min_interval: Duration,
    windows: Vec<(Duration, usize)>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last: Option<Instant>,
    recent: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            name: name.into(),
            min_interval,
            windows: Vec::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// At most `cap` calls in any `window`.
    pub fn with_window(mut self, window: Duration, cap: usize) -> Self {
        self.windows.push((window, cap));
        self
    }

    /// Requests per minute, e.g. 45 for Wallhaven.
    pub fn per_minute(name: impl Into<String>, requests: u32) -> Self {
        let requests = requests.max(1);
        Self::new(name, Duration::from_secs(60) / requests)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Calls left in the tightest window, or `None` without caps.
    pub async fn remaining(&self) -> Option<usize> {
        let state = self.state.lock().await;
        let now = Instant::now();
        self.windows
            .iter()
            .map(|(window, cap)| cap.saturating_sub(in_window(&state.recent, now, *window)))
            .min()
    }

    pub async fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(longest) = self.windows.iter().map(|(w, _)| *w).max() {
            let now = Instant::now();
            while state
                .recent
                .front()
                .is_some_and(|t| now.duration_since(*t) >= longest)
            {
                state.recent.pop_front();
            }
            for (window, cap) in &self.windows {
                if in_window(&state.recent, now, *window) >= *cap {
                    return Err(WallfetchError::RateLimited(format!(
                        "{}: {cap} requests per {}s",
                        self.name,
                        window.as_secs()
                    )));
                }
            }
        }

        if let Some(last) = state.last {
            let ready = last + self.min_interval;
            if ready > Instant::now() {
                tracing::debug!(source = %self.name, "waiting for rate limit");
                tokio::time::sleep_until(ready).await;
            }
        }

        let now = Instant::now();
        state.last = Some(now);
        if !self.windows.is_empty() {
            state.recent.push_back(now);
        }
        Ok(())
    }
}

fn in_window(recent: &VecDeque<Instant>, now: Instant, window: Duration) -> usize {
    recent
        .iter()
        .filter(|t| now.duration_since(**t) < window)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spacing_between_calls() {
        let limiter = RateLimiter::new("test", Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(1));
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_passed() {
        let limiter = RateLimiter::new("test", Duration::from_secs(2));
        limiter.acquire().await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        let before = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(before.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_cap() {
        let limiter =
            RateLimiter::new("craiyon", Duration::ZERO).with_window(Duration::from_secs(3600), 2);
        assert_eq!(limiter.remaining().await, Some(2));
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert_eq!(limiter.remaining().await, Some(0));
        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, WallfetchError::RateLimited(_)));

        tokio::time::advance(Duration::from_secs(3600)).await;
        limiter.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tightest_window_wins() {
        let limiter = RateLimiter::new("multi", Duration::ZERO)
            .with_window(Duration::from_secs(60), 1)
            .with_window(Duration::from_secs(3600), 3);
        limiter.acquire().await.unwrap();
        assert!(limiter.acquire().await.is_err());
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.acquire().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.acquire().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        // minute window is free again, hour window is full
        assert!(limiter.acquire().await.is_err());
        assert_eq!(limiter.remaining().await, Some(0));
    }

    #[test]
    fn test_per_minute() {
        let limiter = RateLimiter::per_minute("wallhaven", 45);
        assert_eq!(limiter.min_interval(), Duration::from_secs(60) / 45);
        assert!(limiter.windows.is_empty());
    }
}
