//! Runtime context trait for the real-time scheduler.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The scheduler's interface to time and task execution.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Tests**: the same `TokioContext` under a paused tokio clock
///   (`#[tokio::test(start_paused = true)]`), which auto-advances to the
///   next pending timer
#[async_trait]
pub trait RuntimeContext: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since context creation.
    ///
    /// Deadlines handed to [`RuntimeContext::sleep_until`] are on this clock.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time, used to resolve a `now` start time.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Suspends execution until `deadline` (on the [`RuntimeContext::now`] clock).
    ///
    /// Returns immediately when the deadline has already passed.
    async fn sleep_until(&self, deadline: Duration);

    /// Spawns a background task.
    ///
    /// `name` labels the task in logs.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
