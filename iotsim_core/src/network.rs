//! Networks - delivery success and delay for each reading.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::naming::{to_name, Named};
use crate::params::ParameterSet;
use crate::value::Value;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal as NormalDist};
use std::fmt::Debug;

/// Outcome of sending one reading over the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delivery {
    pub arrived: bool,
    /// Seconds between taking the reading and its arrival
    pub delay: f64,
}

impl Delivery {
    pub const INSTANT: Delivery = Delivery {
        arrived: true,
        delay: 0.0,
    };
}

/// Per-activation delivery state.
pub trait NetworkRunner: Send {
    fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()>;

    fn next_delivery(&mut self, rng: &mut dyn RngCore) -> SimResult<Delivery>;
}

/// A named generator of deliveries.
pub trait Network: Named + Debug + Send + Sync {
    fn parameters(&self) -> &ParameterSet;

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn NetworkRunner>>;
}

/// Always delivers, instantly.
#[derive(Debug, Clone, Default)]
pub struct Ideal {
    name: Option<String>,
    parameters: ParameterSet,
}

impl Ideal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: to_name(name),
            parameters: ParameterSet::new(),
        }
    }
}

impl Named for Ideal {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Network for Ideal {
    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn activate(&self, _ctx: Option<&ContextStore>) -> SimResult<Box<dyn NetworkRunner>> {
        Ok(Box::new(IdealRunner))
    }
}

struct IdealRunner;

impl NetworkRunner for IdealRunner {
    fn update_parameters(&mut self, _ctx: &ContextStore) -> SimResult<()> {
        Ok(())
    }

    fn next_delivery(&mut self, _rng: &mut dyn RngCore) -> SimResult<Delivery> {
        Ok(Delivery::INSTANT)
    }
}

/// Drops a reading with probability `drop_rate`; otherwise delivers it
/// after a normally distributed delay (`delay` mean, `jitter` std dev)
/// clamped at zero.
#[derive(Debug, Clone)]
pub struct Normal {
    name: Option<String>,
    parameters: ParameterSet,
}

impl Normal {
    pub fn new(
        name: impl Into<String>,
        delay: Option<f64>,
        jitter: Option<f64>,
        drop_rate: Option<f64>,
    ) -> Self {
        Self {
            name: to_name(name),
            parameters: ParameterSet::new()
                .with("delay", delay.map(Value::Float))
                .with("jitter", jitter.map(Value::Float))
                .with("drop_rate", drop_rate.map(Value::Float)),
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    fn settings(&self, ctx: Option<&ContextStore>) -> SimResult<(NormalDist<f64>, f64)> {
        let params = self.parameters.resolve("Network", self.name.as_deref(), ctx)?;
        let delay = params.f64("delay")?;
        let jitter = params.f64("jitter")?;
        let drop_rate = params.f64("drop_rate")?;

        for (key, x) in [("delay", delay), ("jitter", jitter)] {
            if x < 0.0 || x.is_nan() {
                return Err(SimError::invalid(
                    self.label(),
                    key,
                    format!("must be non-negative, got {}", x),
                ));
            }
        }
        if !(0.0..1.0).contains(&drop_rate) {
            return Err(SimError::invalid(
                self.label(),
                "drop_rate",
                format!("must be in [0, 1), got {}", drop_rate),
            ));
        }

        let dist = NormalDist::new(delay, jitter)
            .map_err(|e| SimError::invalid(self.label(), "jitter", e.to_string()))?;
        Ok((dist, drop_rate))
    }
}

impl Named for Normal {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Network for Normal {
    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn activate(&self, ctx: Option<&ContextStore>) -> SimResult<Box<dyn NetworkRunner>> {
        let (dist, drop_rate) = self.settings(ctx)?;
        Ok(Box::new(NormalRunner {
            network: self.clone(),
            dist,
            drop_rate,
        }))
    }
}

struct NormalRunner {
    network: Normal,
    dist: NormalDist<f64>,
    drop_rate: f64,
}

impl NetworkRunner for NormalRunner {
    fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()> {
        let (dist, drop_rate) = self.network.settings(Some(ctx))?;
        self.dist = dist;
        self.drop_rate = drop_rate;
        Ok(())
    }

    fn next_delivery(&mut self, rng: &mut dyn RngCore) -> SimResult<Delivery> {
        let arrived = rng.gen::<f64>() >= self.drop_rate;
        let delay = self.dist.sample(rng).max(0.0);
        Ok(Delivery { arrived, delay })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_ideal_network() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut runner = Ideal::new("").activate(None).unwrap();
        for _ in 0..100 {
            assert_eq!(runner.next_delivery(&mut rng).unwrap(), Delivery::INSTANT);
        }
    }

    #[test]
    fn test_normal_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut runner = Normal::new("", Some(0.25), Some(0.0), Some(0.0))
            .activate(None)
            .unwrap();
        for _ in 0..100 {
            let d = runner.next_delivery(&mut rng).unwrap();
            assert!(d.arrived);
            assert_relative_eq!(d.delay, 0.25);
        }
    }

    #[test]
    fn test_normal_drop_rate() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut runner = Normal::new("", Some(1.0), Some(0.1), Some(0.1))
            .activate(None)
            .unwrap();
        let arrived = (0..1000)
            .filter(|_| runner.next_delivery(&mut rng).unwrap().arrived)
            .count();
        let rate = arrived as f64 / 1000.0;
        assert!((0.85..=0.95).contains(&rate), "arrival rate {}", rate);
    }

    #[test]
    fn test_normal_delay_never_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut runner = Normal::new("", Some(0.0), Some(1.0), Some(0.0))
            .activate(None)
            .unwrap();
        for _ in 0..500 {
            assert!(runner.next_delivery(&mut rng).unwrap().delay >= 0.0);
        }
    }

    #[test]
    fn test_normal_rejects_invalid_domain() {
        let cases = [
            (-0.1, 0.0, 0.0),
            (0.0, -0.1, 0.0),
            (0.0, 0.0, 1.0),
            (0.0, 0.0, -0.1),
        ];
        for (delay, jitter, drop_rate) in cases {
            let net = Normal::new("n", Some(delay), Some(jitter), Some(drop_rate));
            assert!(matches!(
                net.activate(None).err(),
                Some(SimError::InvalidDomain { .. })
            ));
        }
    }

    #[test]
    fn test_normal_parameters_from_context() {
        let net = Normal::new("n", None, Some(0.0), Some(0.0));
        assert!(net.activate(None).is_err());

        let mut ctx = ContextStore::with_seed(["n"], 1, 0).unwrap();
        ctx.set_parameter("n", "delay", 2.0).unwrap();
        let mut runner = net.activate(Some(&ctx)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_relative_eq!(runner.next_delivery(&mut rng).unwrap().delay, 2.0);

        ctx.set_parameter("n", "drop_rate", 1.5).unwrap();
        assert!(runner.update_parameters(&ctx).is_err());
    }
}
