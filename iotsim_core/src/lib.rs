//! iotsim core - signal simulation engine
//!
//! Simulates sensor and actuator time series as swappable behavior state
//! machines, then layers sampling and network effects on top of them:
//! 1. **State**: a shared, name-scoped [`ContextStore`] of parameters,
//!    counters and bounded history
//! 2. **Truth**: [`Feature`] state machines switching between [`Behavior`]s
//!    under trigger-gated, priority-ordered [`Control`]s
//! 3. **Observation**: [`Reader`]s (sub-sampling, noise) and [`Network`]s
//!    (loss, delay, jitter) turning truths into readings
//!
//! ```text
//!                 ┌──────────────── ContextStore ────────────────┐
//!                 │ parameters │ counters │ history (lag 0..d-1) │
//!                 └──────▲──────────▲───────────▲────────────────┘
//!                        │          │           │
//! Assembly ─ tick ─▶ Signal: Feature ─▶ Reader ─▶ Network ─▶ Snapshot
//!                            (Behaviors + Controls)
//! ```

pub mod assembly;
pub mod behavior;
pub mod context;
pub mod control;
pub mod error;
pub mod feature;
pub mod naming;
pub mod network;
pub mod params;
pub mod reader;
pub mod signal;
pub mod trigger;
pub mod value;

// Re-export key types for convenience
pub use assembly::{Assembly, AssemblyTicker, Snapshot};
pub use behavior::{Behavior, BehaviorStream, Flatline, Linear};
pub use context::ContextStore;
pub use control::{Control, ParameterUpdate, Phase, Retrieval};
pub use error::{SimError, SimResult};
pub use feature::{pulser, Feature, RUNNING_BEHAVIOR};
pub use naming::Named;
pub use network::{Delivery, Ideal, Network, Normal};
pub use reader::{EveryNth, NoiseMode, OnChange, Passthrough, Reader};
pub use signal::{Character, Reading, Signal, Truth};
pub use trigger::Trigger;
pub use value::Value;
