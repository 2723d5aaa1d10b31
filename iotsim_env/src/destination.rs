//! Destination sink abstraction.

use crate::error::EnvError;
use async_trait::async_trait;

/// An external consumer of simulated messages (console, file, queue client).
///
/// One instance is shared by every concurrent delivery task routed to it,
/// so implementations synchronize internally.
///
/// # Message Flow
///
/// ```text
/// Scheduler                 delivery task                 Destination
///   |-- spawn(deadline) ------->|                              |
///   |                           |-- sleep_until(deadline)      |
///   |                           |-- send(message) ------------>|
///   |-- (after last tick) ------------------- shutdown() ----->|
/// ```
#[async_trait]
pub trait Destination: Send + Sync + 'static {
    /// Delivers one message.
    async fn send(&self, message: &str) -> Result<(), EnvError>;

    /// Flushes and releases the sink. Called once, after the last delivery.
    async fn shutdown(&self) -> Result<(), EnvError>;
}
