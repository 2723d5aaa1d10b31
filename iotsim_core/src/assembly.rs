//! Assemblies - signals advanced in lockstep over one shared context store.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::naming::{build_namespace, require_name, Named};
use crate::signal::{Reading, Signal, SignalRunner, Truth};
use std::fmt;
use tracing::debug;

/// A named set of signals sharing one context store.
#[derive(Debug)]
pub struct Assembly {
    name: String,
    signals: Vec<Signal>,
    /// Seconds per tick
    tick: f64,
    context: ContextStore,
}

impl Assembly {
    /// Builds the assembly and its context store (seeded from entropy).
    pub fn new(
        name: impl Into<String>,
        signals: Vec<Signal>,
        tick: f64,
        history_depth: usize,
    ) -> SimResult<Self> {
        let name = require_name(name, "Assembly")?;
        if !(tick > 0.0 && tick.is_finite()) {
            return Err(SimError::invalid(&name, "tick", format!("must be positive, got {}", tick)));
        }
        let namespace = build_namespace(
            "Assembly",
            &name,
            signals.iter().map(|s| s.namespace()).collect(),
            false,
        )?;
        let context = ContextStore::new(namespace, history_depth)?;
        Ok(Self {
            name,
            signals,
            tick,
            context,
        })
    }

    /// Makes every stochastic draw of the run reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.context.reseed(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick(&self) -> f64 {
        self.tick
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Activates every signal and returns the (unbounded) tick producer.
    pub fn launch(&mut self) -> SimResult<AssemblyTicker<'_>> {
        let Assembly {
            name,
            signals,
            context,
            ..
        } = self;

        let runners = signals
            .iter()
            .map(|s| s.activate(context))
            .collect::<SimResult<Vec<_>>>()?;
        debug!(assembly = %name, signals = runners.len(), seed = context.seed(), "assembly launched");

        Ok(AssemblyTicker {
            name: name.as_str(),
            runners,
            context,
            tick: 0,
            failed: false,
        })
    }
}

/// Produces one [`Snapshot`] per tick.
///
/// Stops after the first error; the context store is left as the failed
/// tick found it.
pub struct AssemblyTicker<'a> {
    name: &'a str,
    runners: Vec<SignalRunner<'a>>,
    context: &'a mut ContextStore,
    tick: u64,
    failed: bool,
}

impl<'a> AssemblyTicker<'a> {
    /// Number of snapshots produced so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn context(&self) -> &ContextStore {
        self.context
    }

    /// Advances every signal by one tick.
    pub fn step(&mut self) -> SimResult<Snapshot> {
        // Parameters first, so a value written by one signal's controls is
        // seen by every signal on the next tick regardless of order
        for runner in &mut self.runners {
            runner.update_parameters(self.context)?;
        }

        let mut rows = Vec::with_capacity(self.runners.len());
        for runner in &mut self.runners {
            rows.push(runner.next_pair(self.context)?);
        }
        self.tick += 1;

        let (truths, readings) = rows.into_iter().unzip();
        Ok(Snapshot {
            assembly: self.name.to_string(),
            tick: self.tick,
            truths,
            readings,
        })
    }
}

impl<'a> Iterator for AssemblyTicker<'a> {
    type Item = SimResult<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let snapshot = self.step();
        self.failed = snapshot.is_err();
        Some(snapshot)
    }
}

/// Truths and readings of every signal at one tick, in signal order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    assembly: String,
    /// 1-based
    tick: u64,
    truths: Vec<Truth>,
    readings: Vec<Reading>,
}

impl Snapshot {
    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn truths(&self) -> &[Truth] {
        &self.truths
    }

    /// One reading per signal, including absent and lost ones.
    pub fn all_readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Readings with a value that made it through the network.
    pub fn delivered_readings(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter().filter(|r| r.is_delivered())
    }

    /// Truth and reading of one signal.
    pub fn signal(&self, name: &str) -> SimResult<(&Truth, &Reading)> {
        let index = self
            .truths
            .iter()
            .position(|t| t.signal == name)
            .ok_or_else(|| SimError::UnknownName(name.to_string()))?;
        Ok((&self.truths[index], &self.readings[index]))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Snapshot {} of {:?}:", self.tick, self.assembly)?;
        writeln!(f, "{:14} {:>14} {:>14} {:>14}", "Signal", "True value", "Reading", "Delay")?;
        for (truth, reading) in self.truths.iter().zip(&self.readings) {
            let value = reading
                .value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "None".to_string());
            let delay = if !reading.arrived {
                "lost".to_string()
            } else if reading.value.is_none() {
                String::new()
            } else {
                format!("{:.4}", reading.delay)
            };
            writeln!(
                f,
                "{:14} {:>14} {:>14} {:>14}",
                truth.signal,
                truth.value.to_string(),
                value,
                delay
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Flatline, Linear};
    use crate::control::{Control, ParameterUpdate, Phase, Retrieval};
    use crate::feature::{Feature, RUNNING_BEHAVIOR};
    use crate::network::{Ideal, Normal};
    use crate::reader::{EveryNth, NoiseMode, Passthrough};
    use crate::trigger::Trigger;
    use crate::value::Value;
    use std::sync::Arc;

    fn flat_signal(name: &str, feature: &str, level: i64) -> Signal {
        let feature = Feature::new(
            feature,
            vec![Box::new(Flatline::new(format!("{}.b", feature), Some(Value::Int(level))).unwrap())],
            vec![],
        )
        .unwrap();
        Signal::new(name, feature, Arc::new(Passthrough::new("")), Arc::new(Ideal::new(""))).unwrap()
    }

    #[test]
    fn test_single_flatline_ticks() {
        let mut assembly = Assembly::new("a", vec![flat_signal("s", "f", 5)], 1.0, 1).unwrap();
        let snapshots: Vec<Snapshot> = assembly
            .launch()
            .unwrap()
            .take(3)
            .collect::<SimResult<_>>()
            .unwrap();
        assert_eq!(snapshots.len(), 3);
        for (i, snap) in snapshots.iter().enumerate() {
            assert_eq!(snap.tick(), i as u64 + 1);
            assert_eq!(snap.truths().len(), 1);
            assert_eq!(snap.all_readings().len(), 1);
            let (truth, reading) = snap.signal("s").unwrap();
            assert_eq!(truth.value, Value::Int(5));
            assert_eq!(reading.value, Some(Value::Int(5)));
            assert!(reading.arrived);
            assert_eq!(reading.delay, 0.0);
        }
        assert!(snapshots[0].signal("nope").is_err());
    }

    #[test]
    fn test_rejects_bad_tick_and_duplicates() {
        assert!(matches!(
            Assembly::new("a", vec![flat_signal("s", "f", 1)], 0.0, 1).unwrap_err(),
            SimError::InvalidDomain { .. }
        ));
        assert!(matches!(
            Assembly::new("a", vec![flat_signal("s", "f", 1)], 1.0, 0).unwrap_err(),
            SimError::InvalidDomain { .. }
        ));
        let err = Assembly::new(
            "a",
            vec![flat_signal("s1", "f", 1), flat_signal("s2", "f", 2)],
            1.0,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::DuplicateName { .. }));
    }

    #[test]
    fn test_assembly_name_not_in_namespace() {
        // The assembly's own name may coincide with a component name
        assert!(Assembly::new("s", vec![flat_signal("s", "f", 1)], 1.0, 1).is_ok());
    }

    #[test]
    fn test_cross_signal_parameter_write() {
        // The leader counts up and copies its value into the follower's level
        let leader = Feature::new(
            "f.lead",
            vec![Box::new(Linear::new("b.lead", Some(Value::Int(0)), Some(Value::Int(1))).unwrap())],
            vec![Control::update(
                "",
                "b.lead",
                Phase::OnYield,
                Trigger::always(),
                vec![ParameterUpdate::new("b.follow", "level", Retrieval::history("f.lead", 0))],
            )],
        )
        .unwrap();
        let follower = Feature::new(
            "f.follow",
            vec![Box::new(Flatline::new("b.follow", Some(Value::Int(-1))).unwrap())],
            vec![],
        )
        .unwrap();
        let signals = vec![
            Signal::new("follow", follower, Arc::new(Passthrough::new("")), Arc::new(Ideal::new(""))).unwrap(),
            Signal::new("lead", leader, Arc::new(Passthrough::new("")), Arc::new(Ideal::new(""))).unwrap(),
        ];
        let mut assembly = Assembly::new("a", signals, 1.0, 1).unwrap();
        let mut ticker = assembly.launch().unwrap();

        // Flatline resolves its level once per activation
        let first = ticker.step().unwrap();
        assert_eq!(first.signal("follow").unwrap().0.value, Value::Int(-1));
        assert_eq!(first.signal("lead").unwrap().0.value, Value::Int(1));
        assert_eq!(
            ticker.context().get_parameter("b.follow", "level").unwrap(),
            Some(&Value::Int(1))
        );
    }

    #[test]
    fn test_readings_flagged_not_omitted() {
        let feature = Feature::new(
            "f",
            vec![Box::new(Flatline::new("b", Some(Value::Float(1.5))).unwrap())],
            vec![],
        )
        .unwrap();
        let signal = Signal::new(
            "s",
            feature,
            Arc::new(EveryNth::new("", Some(2), 0.0, NoiseMode::Relative)),
            Arc::new(Normal::new("", Some(0.0), Some(0.0), Some(0.0))),
        )
        .unwrap();
        let mut assembly = Assembly::new("a", vec![signal], 1.0, 1).unwrap().with_seed(9);
        let mut ticker = assembly.launch().unwrap();
        let first = ticker.step().unwrap();
        let second = ticker.step().unwrap();
        assert_eq!(first.delivered_readings().count(), 1);
        assert_eq!(second.all_readings().len(), 1);
        assert_eq!(second.delivered_readings().count(), 0);
    }

    #[test]
    fn test_switch_through_running_behavior_parameter() {
        // A control on one signal switches the other signal's behavior
        let switcher = Feature::new(
            "f.switch",
            vec![Box::new(Flatline::new("b.switch", Some(Value::Int(0))).unwrap())],
            vec![Control::update(
                "",
                "b.switch",
                Phase::OnYield,
                Trigger::always(),
                vec![ParameterUpdate::new("f.target", RUNNING_BEHAVIOR, "b.high")],
            )],
        )
        .unwrap();
        let target = Feature::new(
            "f.target",
            vec![
                Box::new(Flatline::new("b.low", Some(Value::Int(0))).unwrap()),
                Box::new(Flatline::new("b.high", Some(Value::Int(9))).unwrap()),
            ],
            vec![],
        )
        .unwrap();
        let signals = vec![
            Signal::new("target", target, Arc::new(Passthrough::new("")), Arc::new(Ideal::new(""))).unwrap(),
            Signal::new("switch", switcher, Arc::new(Passthrough::new("")), Arc::new(Ideal::new(""))).unwrap(),
        ];
        let mut assembly = Assembly::new("a", signals, 1.0, 1).unwrap();
        let values: Vec<Value> = assembly
            .launch()
            .unwrap()
            .take(3)
            .map(|s| s.unwrap().signal("target").unwrap().0.value.clone())
            .collect();
        assert_eq!(values, vec![Value::Int(0), Value::Int(9), Value::Int(9)]);
    }

    #[test]
    fn test_snapshot_display_lists_every_signal() {
        let mut assembly = Assembly::new(
            "a",
            vec![flat_signal("s1", "f1", 1), flat_signal("s2", "f2", 2)],
            1.0,
            1,
        )
        .unwrap();
        let snap = assembly.launch().unwrap().step().unwrap();
        let text = snap.to_string();
        assert!(text.contains("Signal"));
        assert!(text.lines().any(|l| l.starts_with("s1")));
        assert!(text.lines().any(|l| l.starts_with("s2")));
    }
}
