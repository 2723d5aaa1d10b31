//! Readers - the sampling layer between a true value and an observer.
//!
//! A reader is activated once per signal and returns a [`ReaderRunner`]
//! holding the activation's private counters. Parameters are re-resolved
//! every tick, so a control can retune `step`, `accuracy` or `noise`
//! while the simulation runs.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::naming::{to_name, Named};
use crate::params::{ParameterSet, Parameters};
use crate::value::Value;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;

/// How the `noise` amplitude is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseMode {
    /// `±noise × value`
    #[default]
    Relative,
    /// `±noise`
    Absolute,
}

impl FromStr for NoiseMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok(NoiseMode::Relative),
            "absolute" => Ok(NoiseMode::Absolute),
            other => Err(SimError::config(format!(
                "Unknown noise type '{}', expected 'relative' or 'absolute'",
                other
            ))),
        }
    }
}

/// Adds uniform noise in `±noise` (scaled by `value` in relative mode).
///
/// A zero amplitude leaves the value untouched, whatever its type, so an
/// integer stays an integer and text passes through. Any other amplitude
/// yields a float.
pub fn add_noise(
    value: &Value,
    noise: f64,
    mode: NoiseMode,
    rng: &mut dyn RngCore,
) -> SimResult<Value> {
    if noise == 0.0 {
        return Ok(value.clone());
    }
    let x = value.to_f64()?;
    let factor = match mode {
        NoiseMode::Relative => x,
        NoiseMode::Absolute => 1.0,
    };
    let u: f64 = rng.gen();
    Ok(Value::Float(x + noise * factor * 2.0 * (u - 0.5)))
}

/// Per-activation reading state.
pub trait ReaderRunner: Send {
    /// Re-resolves parameters from the store.
    fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()>;

    /// Observes one true value; `None` means nothing was reported.
    fn read(&mut self, truth: &Value, rng: &mut dyn RngCore) -> SimResult<Option<Value>>;
}

/// A named transform from true values to observed readings.
pub trait Reader: Named + Debug + Send + Sync {
    fn parameters(&self) -> &ParameterSet;

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn ReaderRunner>>;
}

/// Reports every true value unchanged.
#[derive(Debug, Clone, Default)]
pub struct Passthrough {
    name: Option<String>,
    parameters: ParameterSet,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: to_name(name),
            parameters: ParameterSet::new(),
        }
    }
}

impl Named for Passthrough {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Reader for Passthrough {
    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn activate(&self, _ctx: Option<&ContextStore>) -> SimResult<Box<dyn ReaderRunner>> {
        Ok(Box::new(PassthroughRunner))
    }
}

struct PassthroughRunner;

impl ReaderRunner for PassthroughRunner {
    fn update_parameters(&mut self, _ctx: &ContextStore) -> SimResult<()> {
        Ok(())
    }

    fn read(&mut self, truth: &Value, _rng: &mut dyn RngCore) -> SimResult<Option<Value>> {
        Ok(Some(truth.clone()))
    }
}

/// Shared parameter plumbing of the parameterized readers.
#[derive(Debug, Clone)]
struct Resolver {
    kind: &'static str,
    name: Option<String>,
    parameters: ParameterSet,
}

impl Resolver {
    fn resolve(&self, ctx: Option<&ContextStore>) -> SimResult<Parameters> {
        self.parameters.resolve(self.kind, self.name.as_deref(), ctx)
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    fn step(&self, params: &Parameters, min: i64) -> SimResult<i64> {
        let step = params.i64("step")?;
        if step < min {
            let expected = if min > 0 { "positive" } else { "non-negative" };
            return Err(SimError::invalid(
                self.label(),
                "step",
                format!("must be {}, got {}", expected, step),
            ));
        }
        Ok(step)
    }
}

/// Reports every `step`-th true value, starting with the first.
#[derive(Debug, Clone)]
pub struct EveryNth {
    resolver: Resolver,
    mode: NoiseMode,
}

impl EveryNth {
    pub fn new(name: impl Into<String>, step: Option<i64>, noise: f64, mode: NoiseMode) -> Self {
        Self {
            resolver: Resolver {
                kind: "EveryNth",
                name: to_name(name),
                parameters: ParameterSet::new()
                    .with("step", step.map(Value::Int))
                    .with("noise", Some(Value::Float(noise))),
            },
            mode,
        }
    }
}

impl Named for EveryNth {
    fn name(&self) -> Option<&str> {
        self.resolver.name.as_deref()
    }
}

impl Reader for EveryNth {
    fn parameters(&self) -> &ParameterSet {
        &self.resolver.parameters
    }

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn ReaderRunner>> {
        let mut runner = EveryNthRunner {
            resolver: self.resolver.clone(),
            mode: self.mode,
            step: 1,
            noise: 0.0,
            counter: 0,
        };
        runner.refresh(ctx)?;
        Ok(Box::new(runner))
    }
}

struct EveryNthRunner {
    resolver: Resolver,
    mode: NoiseMode,
    step: i64,
    noise: f64,
    counter: i64,
}

impl EveryNthRunner {
    fn refresh(&mut self, ctx: Option<&ContextStore>) -> SimResult<()> {
        let params = self.resolver.resolve(ctx)?;
        self.step = self.resolver.step(&params, 1)?;
        self.noise = params.f64("noise")?;
        Ok(())
    }
}

impl ReaderRunner for EveryNthRunner {
    fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()> {
        self.refresh(Some(ctx))
    }

    fn read(&mut self, truth: &Value, rng: &mut dyn RngCore) -> SimResult<Option<Value>> {
        let result = if self.counter == 0 {
            Some(add_noise(truth, self.noise, self.mode, rng)?)
        } else {
            None
        };
        self.counter += 1;
        if self.counter >= self.step {
            self.counter = 0;
        }
        Ok(result)
    }
}

/// Reports when the true value moves by more than `accuracy` since the
/// previous one, and at least every `step` values (`step = 0` disables the
/// forced report).
#[derive(Debug, Clone)]
pub struct OnChange {
    resolver: Resolver,
    mode: NoiseMode,
}

impl OnChange {
    pub fn new(
        name: impl Into<String>,
        accuracy: f64,
        step: i64,
        noise: f64,
        mode: NoiseMode,
    ) -> Self {
        Self {
            resolver: Resolver {
                kind: "OnChange",
                name: to_name(name),
                parameters: ParameterSet::new()
                    .with("accuracy", Some(Value::Float(accuracy)))
                    .with("step", Some(Value::Int(step)))
                    .with("noise", Some(Value::Float(noise))),
            },
            mode,
        }
    }
}

impl Named for OnChange {
    fn name(&self) -> Option<&str> {
        self.resolver.name.as_deref()
    }
}

impl Reader for OnChange {
    fn parameters(&self) -> &ParameterSet {
        &self.resolver.parameters
    }

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn ReaderRunner>> {
        let mut runner = OnChangeRunner {
            resolver: self.resolver.clone(),
            mode: self.mode,
            accuracy: 0.0,
            step: 0,
            noise: 0.0,
            counter: 0,
            previous: None,
        };
        runner.refresh(ctx)?;
        Ok(Box::new(runner))
    }
}

struct OnChangeRunner {
    resolver: Resolver,
    mode: NoiseMode,
    accuracy: f64,
    step: i64,
    noise: f64,
    counter: i64,
    previous: Option<Value>,
}

impl OnChangeRunner {
    fn refresh(&mut self, ctx: Option<&ContextStore>) -> SimResult<()> {
        let params = self.resolver.resolve(ctx)?;
        self.accuracy = params.f64("accuracy")?;
        self.step = self.resolver.step(&params, 0)?;
        self.noise = params.f64("noise")?;
        Ok(())
    }

    fn changed(&self, truth: &Value) -> bool {
        match &self.previous {
            None => true,
            Some(prev) => match (prev.as_f64(), truth.as_f64()) {
                (Some(a), Some(b)) => (b - a).abs() > self.accuracy,
                _ => prev != truth,
            },
        }
    }
}

impl ReaderRunner for OnChangeRunner {
    fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()> {
        self.refresh(Some(ctx))
    }

    fn read(&mut self, truth: &Value, rng: &mut dyn RngCore) -> SimResult<Option<Value>> {
        let forced = self.step > 0 && self.counter == 0;
        let result = if self.changed(truth) || forced {
            self.counter = 0;
            Some(add_noise(truth, self.noise, self.mode, rng)?)
        } else {
            None
        };

        self.previous = Some(truth.clone());
        if self.step > 0 {
            self.counter += 1;
            if self.counter >= self.step {
                self.counter = 0;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn read_all(reader: &dyn Reader, values: &[Value]) -> Vec<Option<Value>> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut runner = reader.activate(None).unwrap();
        values
            .iter()
            .map(|v| runner.read(v, &mut rng).unwrap())
            .collect()
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&v| Value::Int(v)).collect()
    }

    #[test]
    fn test_passthrough() {
        let values = vec![Value::Int(1), Value::from("on"), Value::Float(2.5)];
        let out = read_all(&Passthrough::new(""), &values);
        assert_eq!(out, values.into_iter().map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_nth_step_three() {
        let reader = EveryNth::new("", Some(3), 0.0, NoiseMode::Relative);
        let out = read_all(&reader, &ints(&[10, 11, 12, 13, 14, 15]));
        assert_eq!(
            out,
            vec![Some(Value::Int(10)), None, None, Some(Value::Int(13)), None, None]
        );
    }

    #[test]
    fn test_every_nth_step_one_reports_all() {
        let reader = EveryNth::new("", Some(1), 0.0, NoiseMode::Relative);
        let out = read_all(&reader, &ints(&[1, 2, 3]));
        assert!(out.iter().all(Option::is_some));
    }

    #[test]
    fn test_every_nth_rejects_bad_step() {
        for step in [0, -1] {
            let reader = EveryNth::new("", Some(step), 0.0, NoiseMode::Relative);
            assert!(matches!(
                reader.activate(None).err(),
                Some(SimError::InvalidDomain { .. })
            ));
        }
        let reader = EveryNth::new("", None, 0.0, NoiseMode::Relative);
        assert!(matches!(
            reader.activate(None).err(),
            Some(SimError::UndefinedParameter { .. })
        ));
    }

    #[test]
    fn test_every_nth_step_from_context() {
        let reader = EveryNth::new("r", Some(1), 0.0, NoiseMode::Relative);
        let mut ctx = ContextStore::with_seed(["r"], 1, 0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut runner = reader.activate(Some(&ctx)).unwrap();
        assert!(runner.read(&Value::Int(1), &mut rng).unwrap().is_some());
        assert!(runner.read(&Value::Int(1), &mut rng).unwrap().is_some());

        ctx.set_parameter("r", "step", 2).unwrap();
        runner.update_parameters(&ctx).unwrap();
        let out: Vec<bool> = (0..4)
            .map(|_| runner.read(&Value::Int(1), &mut rng).unwrap().is_some())
            .collect();
        assert_eq!(out, vec![true, false, true, false]);

        ctx.set_parameter("r", "step", 0).unwrap();
        assert!(runner.update_parameters(&ctx).is_err());
    }

    #[test]
    fn test_noise_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..1000 {
            let v = add_noise(&Value::Int(100), 0.1, NoiseMode::Relative, &mut rng)
                .unwrap()
                .as_f64()
                .unwrap();
            assert!((90.0..=110.0).contains(&v));

            let v = add_noise(&Value::Float(100.0), 0.5, NoiseMode::Absolute, &mut rng)
                .unwrap()
                .as_f64()
                .unwrap();
            assert!((99.5..=100.5).contains(&v));
        }
    }

    #[test]
    fn test_zero_noise_keeps_value() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let v = add_noise(&Value::from("open"), 0.0, NoiseMode::Relative, &mut rng).unwrap();
        assert_eq!(v, Value::from("open"));
        assert!(add_noise(&Value::from("open"), 0.1, NoiseMode::Relative, &mut rng).is_err());
        assert_eq!(
            add_noise(&Value::Int(7), 0.0, NoiseMode::Absolute, &mut rng).unwrap(),
            Value::Int(7)
        );
        assert!(matches!(
            add_noise(&Value::Int(7), 0.1, NoiseMode::Absolute, &mut rng).unwrap(),
            Value::Float(_)
        ));
        assert_relative_eq!(
            add_noise(&Value::Int(0), 0.3, NoiseMode::Relative, &mut rng)
                .unwrap()
                .as_f64()
                .unwrap(),
            0.0
        );
    }

    #[test]
    fn test_on_change_accuracy() {
        let reader = OnChange::new("", 0.5, 0, 0.0, NoiseMode::Relative);
        let values = vec![
            Value::Float(1.0),
            Value::Float(1.2),
            Value::Float(1.4),
            Value::Float(2.0),
            Value::Float(2.0),
        ];
        let present: Vec<bool> = read_all(&reader, &values).iter().map(Option::is_some).collect();
        // Compared with the previous true value, not the last reported one
        assert_eq!(present, vec![true, false, false, true, false]);
    }

    #[test]
    fn test_on_change_forced_period() {
        let reader = OnChange::new("", 0.0, 3, 0.0, NoiseMode::Relative);
        let present: Vec<bool> = read_all(&reader, &ints(&[5, 5, 5, 5, 6, 6, 6, 6]))
            .iter()
            .map(Option::is_some)
            .collect();
        // Forced at 0 and 3; the change at 4 resets the period
        assert_eq!(
            present,
            vec![true, false, false, true, true, false, false, true]
        );
    }

    #[test]
    fn test_on_change_text_values() {
        let reader = OnChange::new("", 0.0, 0, 0.0, NoiseMode::Relative);
        let values = vec![
            Value::from("off"),
            Value::from("off"),
            Value::from("on"),
            Value::from("on"),
        ];
        let present: Vec<bool> = read_all(&reader, &values).iter().map(Option::is_some).collect();
        assert_eq!(present, vec![true, false, true, false]);
    }

    #[test]
    fn test_on_change_rejects_negative_step() {
        let reader = OnChange::new("", 0.0, -1, 0.0, NoiseMode::Relative);
        assert!(reader.activate(None).is_err());
    }

    #[test]
    fn test_noise_mode_from_str() {
        assert_eq!("absolute".parse::<NoiseMode>().unwrap(), NoiseMode::Absolute);
        assert!("gaussian".parse::<NoiseMode>().is_err());
    }
}
