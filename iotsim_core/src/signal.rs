//! Signals - one feature observed through one reader over one network.

use crate::context::ContextStore;
use crate::error::{SimError, SimResult};
use crate::feature::{Feature, FeatureRunner};
use crate::naming::{build_namespace, require_name, Named};
use crate::network::{Network, NetworkRunner};
use crate::reader::{Reader, ReaderRunner};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Informational tag describing the kind of quantity a signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Character {
    #[default]
    Continuous,
    Discrete,
}

impl FromStr for Character {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(Character::Continuous),
            "discrete" => Ok(Character::Discrete),
            other => Err(SimError::config(format!("Unknown signal character '{}'", other))),
        }
    }
}

/// The exact value of a signal at one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Truth {
    pub signal: String,
    pub value: Value,
}

/// What an observer gets for a signal at one tick.
///
/// `value` is `None` when the reader reported nothing; `arrived = false`
/// when the network dropped the reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub signal: String,
    pub value: Option<Value>,
    pub arrived: bool,
    /// Seconds
    pub delay: f64,
}

impl Reading {
    /// The reading reaches the observer.
    pub fn is_delivered(&self) -> bool {
        self.arrived && self.value.is_some()
    }
}

/// A named (feature, reader, network) triple.
pub struct Signal {
    name: String,
    feature: Feature,
    reader: Arc<dyn Reader>,
    network: Arc<dyn Network>,
    character: Character,
    namespace: Vec<String>,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("feature", &self.feature)
            .field("reader", &self.reader)
            .field("network", &self.network)
            .field("character", &self.character)
            .finish()
    }
}

impl Signal {
    pub fn new(
        name: impl Into<String>,
        feature: Feature,
        reader: Arc<dyn Reader>,
        network: Arc<dyn Network>,
    ) -> SimResult<Self> {
        let name = require_name(name, "Signal")?;
        let namespace = build_namespace(
            "Signal",
            &name,
            vec![feature.namespace(), reader.namespace(), network.namespace()],
            true,
        )?;
        Ok(Self {
            name,
            feature,
            reader,
            network,
            character: Character::default(),
            namespace,
        })
    }

    pub fn with_character(mut self, character: Character) -> Self {
        self.character = character;
        self
    }

    pub fn character(&self) -> Character {
        self.character
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    pub fn reader(&self) -> &Arc<dyn Reader> {
        &self.reader
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Wires the feature, reader and network for one run.
    pub fn activate(&self, ctx: &mut ContextStore) -> SimResult<SignalRunner<'_>> {
        let feature = self.feature.activate(ctx)?;
        let reader = self.reader.activate(Some(&*ctx))?;
        let network = self.network.activate(Some(&*ctx))?;
        Ok(SignalRunner {
            signal: self,
            feature,
            reader,
            network,
        })
    }
}

impl Named for Signal {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn namespace(&self) -> Vec<String> {
        self.namespace.clone()
    }
}

/// An activated signal.
pub struct SignalRunner<'a> {
    signal: &'a Signal,
    feature: FeatureRunner<'a>,
    reader: Box<dyn ReaderRunner>,
    network: Box<dyn NetworkRunner>,
}

impl<'a> SignalRunner<'a> {
    pub fn signal(&self) -> &'a Signal {
        self.signal
    }

    pub fn update_parameters(&mut self, ctx: &ContextStore) -> SimResult<()> {
        self.feature.update_parameters(ctx)?;
        self.reader.update_parameters(ctx)?;
        self.network.update_parameters(ctx)
    }

    /// Advances one tick. The network is consulted even when the reader
    /// reported nothing.
    pub fn next_pair(&mut self, ctx: &mut ContextStore) -> SimResult<(Truth, Reading)> {
        let value = self.feature.next_value(ctx)?;
        let reading = self.reader.read(&value, ctx.rng())?;
        let delivery = self.network.next_delivery(ctx.rng())?;
        let name = self.signal.name.clone();
        Ok((
            Truth {
                signal: name.clone(),
                value,
            },
            Reading {
                signal: name,
                value: reading,
                arrived: delivery.arrived,
                delay: delivery.delay,
            },
        ))
    }
}
