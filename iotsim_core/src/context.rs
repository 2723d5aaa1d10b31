//! The shared, name-scoped state of one assembly run.
//!
//! For every component in the assembly's namespace the store keeps
//! parameters, counters and a bounded history of past true values
//! (most recent first). Behaviors, triggers and controls all read and
//! mutate the run through this store.
//!
//! The store also owns the run's random number generator so that a run
//! seeded with the same value replays identically.

use crate::error::{SimError, SimResult};
use crate::value::Value;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, VecDeque};

/// Per-name state held by the store.
#[derive(Debug, Clone, Default)]
struct Slot {
    parameters: HashMap<String, Value>,
    counters: HashMap<String, i64>,
    history: VecDeque<Value>,
}

/// Shared parameter/counter/history store for one assembly run.
#[derive(Debug, Clone)]
pub struct ContextStore {
    /// Maximum number of history entries retained per name
    depth: usize,

    /// State keyed by component name
    slots: HashMap<String, Slot>,

    /// Seed the RNG was created with (for logging/replay)
    seed: u64,

    /// Source of every stochastic draw in the run
    rng: ChaCha8Rng,
}

impl ContextStore {
    /// Creates a store for `namespace` with an entropy-derived seed.
    pub fn new<I, S>(namespace: I, history_depth: usize) -> SimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_seed(namespace, history_depth, rand::random())
    }

    /// Creates a store for `namespace` with a fixed seed.
    pub fn with_seed<I, S>(namespace: I, history_depth: usize, seed: u64) -> SimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if history_depth < 1 {
            return Err(SimError::invalid(
                "context",
                "history_depth",
                format!("must be at least one, got {}", history_depth),
            ));
        }

        let slots = namespace
            .into_iter()
            .map(|name| (name.into(), Slot::default()))
            .collect();

        Ok(Self {
            depth: history_depth,
            slots,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Re-seeds the RNG.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn history_depth(&self) -> usize {
        self.depth
    }

    /// Returns true if `name` belongs to the store's namespace.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// The RNG shared by all stochastic components of the run.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    fn slot(&self, name: &str) -> SimResult<&Slot> {
        self.slots
            .get(name)
            .ok_or_else(|| SimError::UnknownName(name.to_string()))
    }

    fn slot_mut(&mut self, name: &str) -> SimResult<&mut Slot> {
        self.slots
            .get_mut(name)
            .ok_or_else(|| SimError::UnknownName(name.to_string()))
    }

    /// Returns the stored value of `parameter` for `name`, if any.
    pub fn get_parameter(&self, name: &str, parameter: &str) -> SimResult<Option<&Value>> {
        Ok(self.slot(name)?.parameters.get(parameter))
    }

    /// Returns the stored value of `parameter`, or `default` when it was never set.
    pub fn parameter_or(
        &self,
        name: &str,
        parameter: &str,
        default: Option<Value>,
    ) -> SimResult<Option<Value>> {
        Ok(self.get_parameter(name, parameter)?.cloned().or(default))
    }

    pub fn set_parameter(
        &mut self,
        name: &str,
        parameter: &str,
        value: impl Into<Value>,
    ) -> SimResult<()> {
        self.slot_mut(name)?
            .parameters
            .insert(parameter.to_string(), value.into());
        Ok(())
    }

    /// Sets `counter` to zero, creating it if needed.
    pub fn reset_counter(&mut self, name: &str, counter: &str) -> SimResult<()> {
        self.slot_mut(name)?.counters.insert(counter.to_string(), 0);
        Ok(())
    }

    /// Adds `increment` to a counter that has been reset at least once.
    pub fn increment_counter(&mut self, name: &str, counter: &str, increment: i64) -> SimResult<()> {
        let slot = self.slot_mut(name)?;
        match slot.counters.get_mut(counter) {
            Some(count) => {
                *count += increment;
                Ok(())
            }
            None => Err(SimError::UnknownCounter {
                component: name.to_string(),
                counter: counter.to_string(),
            }),
        }
    }

    /// Current counter value, or `None` if it was never set.
    pub fn read_counter(&self, name: &str, counter: &str) -> SimResult<Option<i64>> {
        Ok(self.slot(name)?.counters.get(counter).copied())
    }

    /// The value recorded `lag` ticks ago, or `None` past the recorded depth.
    pub fn query(&self, name: &str, lag: usize) -> SimResult<Option<&Value>> {
        Ok(self.slot(name)?.history.get(lag))
    }

    /// Pushes `value` as the most recent history entry, evicting the oldest beyond depth.
    pub fn record(&mut self, name: &str, value: Value) -> SimResult<()> {
        let depth = self.depth;
        let history = &mut self.slot_mut(name)?.history;
        history.push_front(value);
        history.truncate(depth);
        Ok(())
    }
}
