//! Production implementation of RuntimeContext using Tokio.

use crate::RuntimeContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Context backed by the Tokio runtime.
///
/// The monotonic clock is `tokio::time::Instant`, so a paused test runtime
/// controls it along with every sleep.
#[derive(Debug, Clone)]
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext anchored at the current instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, deadline: Duration) {
        tokio::time::sleep_until(self.start + deadline).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, "spawn");
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_is_anchored() {
        let ctx = TokioContext::new();
        ctx.sleep(Duration::from_millis(300)).await;
        ctx.sleep_until(Duration::from_secs(1)).await;
        assert_eq!(ctx.now(), Duration::from_secs(1));

        // A past deadline does not wait
        ctx.sleep_until(Duration::from_millis(500)).await;
        assert_eq!(ctx.now(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_tasks_finish_in_deadline_order() {
        let ctx = TokioContext::shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Arc::new(AtomicUsize::new(0));

        for (label, ms) in [("slow", 300u64), ("fast", 100), ("mid", 200)] {
            let tx = tx.clone();
            let inner = Arc::clone(&ctx);
            let started = Arc::clone(&started);
            ctx.spawn(label, async move {
                started.fetch_add(1, Ordering::SeqCst);
                inner.sleep_until(Duration::from_millis(ms)).await;
                let _ = tx.send(label);
            });
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(label) = rx.recv().await {
            order.push(label);
        }
        assert_eq!(order, vec!["fast", "mid", "slow"]);
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }
}
