//! iotsim runner - real-time execution of signal assemblies
//!
//! Turns YAML definitions into running simulations:
//! - **Assembly**: [`assembler`] builds an [`iotsim_core::Assembly`] from a
//!   document naming a ready-made [`constructors`] template plus labelled
//!   readers and networks
//! - **Runner**: [`RunnerConfig`] sets ticks, pace, start time, routing
//!   and overrun handling
//! - **Scheduler**: [`Scheduler`] steps the assembly once per tick and
//!   delivers every message to its [`Routes`] at its due wall-clock time
//!
//! ```text
//! assembly.yaml ─▶ assembler ─▶ Assembly ─┐
//!                                          ├─▶ Scheduler ─▶ Routes ─▶ stdout / file / ...
//! runner.yaml ───▶ RunnerConfig ──────────┘     (TokioContext)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use iotsim_sim::{assembler, Routes, RunnerConfig, Scheduler};
//! use iotsim_env::TokioContext;
//!
//! let assembly = assembler::from_config(yaml)?;
//! let config = RunnerConfig::default().with_ticks(Some(10));
//! let routes = Routes::from_config(&config)?;
//! let report = Scheduler::new(TokioContext::shared(), config, routes)?
//!     .run(assembly)
//!     .await?;
//! ```

pub mod assembler;
pub mod config;
pub mod constructors;
pub mod destinations;
pub mod error;
pub mod message;
pub mod runner;

pub use assembler::{AssemblyDocument, AssemblyKind, NetworkKind, ReaderKind};
pub use config::{OverrunPolicy, RunnerConfig};
pub use constructors::{AssemblyTemplate, TemplateOptions};
pub use destinations::{build_destination, MemoryDestination, Routes};
pub use error::{RunError, RunResult};
pub use message::{Message, MessageFormat};
pub use runner::{Progress, RunReport, Scheduler, StopHandle};
