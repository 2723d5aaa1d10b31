//! iotsim Environment Abstraction Layer
//!
//! This crate is the seam between the real-time scheduler and the outside
//! world, so the scheduler can run against the real clock in production
//! and against tokio's paused clock in tests.
//!
//! # Core Concept
//!
//! Everything the scheduler does that is not pure computation goes
//! through one of two traits:
//! - Time and tasks (`now()`, `sleep_until()`, `spawn()`) via [`RuntimeContext`]
//! - Output (`send()`, `shutdown()`) via [`Destination`]
//!
//! # Example
//!
//! ```ignore
//! use iotsim_env::{Destination, RuntimeContext};
//!
//! async fn deliver<Ctx: RuntimeContext>(
//!     ctx: &Ctx,
//!     sink: Arc<dyn Destination>,
//!     deadline: Duration,
//!     message: String,
//! ) {
//!     ctx.spawn("delivery", async move {
//!         ctx.sleep_until(deadline).await;
//!         let _ = sink.send(&message).await;
//!     });
//! }
//! ```

mod context;
mod destination;
mod error;
mod tokio_impl;
mod types;

pub use context::RuntimeContext;
pub use destination::Destination;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use types::DataView;
