//! FIFO concurrency limiter for tool executions and metadata fetches.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Ceiling used when the configured limit is zero.
pub const DEFAULT_CONCURRENT_LIMIT: usize = 5;

/// Bounds the number of in-flight operations.
///
/// Admission is first-come first-served (tokio's semaphore is fair). The
/// limiter never times out or cancels work; results and errors of the
/// wrapped future are returned unchanged. Cloning shares the same permits.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `limit` operations at once.
    pub fn new(limit: usize) -> Self {
        let limit = if limit == 0 {
            DEFAULT_CONCURRENT_LIMIT
        } else {
            limit
        };
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// The effective ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Operations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Run `op` once a slot is free.
    pub async fn run<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is owned by this struct and never closed.
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => None,
        };
        op.await
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_falls_back_to_default() {
        assert_eq!(ConcurrencyLimiter::new(0).limit(), DEFAULT_CONCURRENT_LIMIT);
        assert_eq!(ConcurrencyLimiter::new(3).limit(), 3);
    }

    #[tokio::test]
    async fn test_never_exceeds_ceiling() {
        let n = 3;
        let limiter = ConcurrencyLimiter::new(n);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..n + 5 {
            let limiter = limiter.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        i * 2
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert!(peak.load(Ordering::SeqCst) <= n);
        assert_eq!(results, (0..n + 5).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_propagate_unchanged() {
        let limiter = ConcurrencyLimiter::new(1);
        let result: Result<u8, String> = limiter.run(async { Err("boom".to_string()) }).await;
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(limiter.in_flight(), 0);
    }
}
