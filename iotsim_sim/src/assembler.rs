//! Assemblies from YAML documents.
//!
//! ```yaml
//! assembly:
//!   type: SimpleActuator
//!   parameters:
//!     name: plant
//!     sensor_reaction_delay: 2
//!   readers:
//!     sensor: coarse
//!   networks:
//!     default: lossy
//! readers:
//!   - type: EveryNth
//!     label: coarse
//!     parameters: {step: 3, noise: 0.01}
//! networks:
//!   - type: Normal
//!     label: lossy
//!     parameters: {delay: 0.2, jitter: 0.05, drop_rate: 0.1}
//! ```
//!
//! Component types are looked up in closed registries ([`AssemblyKind`],
//! [`ReaderKind`], [`NetworkKind`]); an unknown tag is a configuration error.

use crate::constructors::{
    flatline, pulse, seesaw, simple_actuator, ActuatorParams, AssemblyTemplate, PulserParams,
    SeesawParams, TemplateOptions,
};
use crate::error::{RunError, RunResult};
use iotsim_core::{
    Assembly, EveryNth, Ideal, Network, NoiseMode, Normal, OnChange, Passthrough, Reader,
    SimError, SimResult, Value,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Label binding readers or networks to signals that have none of their own.
pub const DEFAULT_BINDING: &str = "default";

/// Parsed assembly document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblyDocument {
    pub assembly: AssemblySection,
    #[serde(default)]
    pub readers: Vec<ComponentDef>,
    #[serde(default)]
    pub networks: Vec<ComponentDef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblySection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Signal name (or `default`) -> reader label
    #[serde(default)]
    pub readers: BTreeMap<String, String>,
    /// Signal name (or `default`) -> network label
    #[serde(default)]
    pub networks: BTreeMap<String, String>,
}

/// A labelled reader or network definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDef {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

fn not_listed(component: &str, tag: &str) -> SimError {
    SimError::config(format!("{} type `{}` is not listed in the inventory", component, tag))
}

/// Constructor parameters, consumed key by key.
///
/// Keys left over after construction are reported as unknown.
struct ParamMap {
    owner: String,
    values: BTreeMap<String, Value>,
}

impl ParamMap {
    fn new(owner: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            owner: owner.into(),
            values,
        }
    }

    fn value_or(&mut self, key: &str, default: Value) -> Value {
        self.values.remove(key).unwrap_or(default)
    }

    fn opt_f64(&mut self, key: &str) -> SimResult<Option<f64>> {
        self.values.remove(key).map(|v| v.to_f64()).transpose()
    }

    fn f64_or(&mut self, key: &str, default: f64) -> SimResult<f64> {
        Ok(self.opt_f64(key)?.unwrap_or(default))
    }

    fn opt_i64(&mut self, key: &str) -> SimResult<Option<i64>> {
        self.values.remove(key).map(|v| v.to_i64()).transpose()
    }

    fn i64_or(&mut self, key: &str, default: i64) -> SimResult<i64> {
        Ok(self.opt_i64(key)?.unwrap_or(default))
    }

    fn usize_or(&mut self, key: &str, default: usize) -> SimResult<usize> {
        match self.opt_i64(key)? {
            None => Ok(default),
            Some(n) => usize::try_from(n).map_err(|_| {
                SimError::invalid(&self.owner, key, format!("must be non-negative, got {}", n))
            }),
        }
    }

    fn opt_text(&mut self, key: &str) -> SimResult<Option<String>> {
        match self.values.remove(key) {
            None => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s)),
            Some(other) => Err(SimError::type_mismatch("text", other)),
        }
    }

    fn text_or(&mut self, key: &str, default: &str) -> SimResult<String> {
        Ok(self.opt_text(key)?.unwrap_or_else(|| default.to_string()))
    }

    fn finish(self) -> SimResult<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        let keys: Vec<&String> = self.values.keys().collect();
        Err(SimError::config(format!(
            "Unknown parameter(s) {:?} for {}",
            keys, self.owner
        )))
    }
}

/// Registered assembly constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyKind {
    Flatline,
    Seesaw,
    Pulser,
    SimpleActuator,
}

impl FromStr for AssemblyKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Flatline" => Ok(Self::Flatline),
            // "Seasaw" is the spelling found in older documents
            "Seesaw" | "Seasaw" => Ok(Self::Seesaw),
            "Pulser" => Ok(Self::Pulser),
            "SimpleActuator" => Ok(Self::SimpleActuator),
            other => Err(not_listed("assembly", other)),
        }
    }
}

impl AssemblyKind {
    fn construct(self, params: BTreeMap<String, Value>) -> SimResult<AssemblyTemplate> {
        let mut p = ParamMap::new(format!("{:?} assembly", self), params);
        let options = TemplateOptions {
            name: p.opt_text("name")?,
            tick: p.f64_or("tick", 1.0)?,
            history_depth: p.usize_or("history_depth", 1)?,
        };

        let template = match self {
            Self::Flatline => flatline(options, p.value_or("level", Value::Int(0)))?,
            Self::Seesaw => {
                let d = SeesawParams::default();
                let params = SeesawParams {
                    forward_start: p.value_or("forward_start", d.forward_start),
                    forward_increment: p.value_or("forward_increment", d.forward_increment),
                    forward_stop: p.value_or("forward_stop", d.forward_stop),
                    return_start: p.value_or("return_start", d.return_start),
                    return_increment: p.value_or("return_increment", d.return_increment),
                    return_stop: p.value_or("return_stop", d.return_stop),
                };
                seesaw(options, params)?
            }
            Self::Pulser => {
                let d = PulserParams::default();
                let params = PulserParams {
                    level1: p.value_or("level1", d.level1),
                    duration1: p.i64_or("duration1", d.duration1)?,
                    level2: p.value_or("level2", d.level2),
                    duration2: p.i64_or("duration2", d.duration2)?,
                };
                pulse(options, params)?
            }
            Self::SimpleActuator => {
                let d = ActuatorParams::default();
                let params = ActuatorParams {
                    control_name: p.text_or("control_name", &d.control_name)?,
                    control_off_duration: p.i64_or("control_off_duration", d.control_off_duration)?,
                    control_on_duration: p.i64_or("control_on_duration", d.control_on_duration)?,
                    sensor_name: p.text_or("sensor_name", &d.sensor_name)?,
                    sensor_init: p.value_or("sensor_init", d.sensor_init),
                    sensor_rise_rate: p.value_or("sensor_rise_rate", d.sensor_rise_rate),
                    sensor_fall_rate: p.value_or("sensor_fall_rate", d.sensor_fall_rate),
                    sensor_reaction_delay: p
                        .usize_or("sensor_reaction_delay", d.sensor_reaction_delay)?,
                };
                simple_actuator(options, params)?
            }
        };
        p.finish()?;
        Ok(template)
    }
}

/// Registered readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    Passthrough,
    EveryNth,
    OnChange,
}

impl FromStr for ReaderKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PassThrough" | "Passthrough" => Ok(Self::Passthrough),
            "EveryNth" => Ok(Self::EveryNth),
            "OnChange" => Ok(Self::OnChange),
            other => Err(not_listed("reader", other)),
        }
    }
}

impl ReaderKind {
    pub fn construct(self, params: BTreeMap<String, Value>) -> SimResult<Arc<dyn Reader>> {
        let mut p = ParamMap::new(format!("{:?} reader", self), params);
        let name = p.text_or("name", "")?;
        let reader: Arc<dyn Reader> = match self {
            Self::Passthrough => Arc::new(Passthrough::new(name)),
            Self::EveryNth => {
                let step = p.opt_i64("step")?;
                let noise = p.f64_or("noise", 0.0)?;
                let mode: NoiseMode = p.text_or("noise_type", "relative")?.parse()?;
                Arc::new(EveryNth::new(name, step, noise, mode))
            }
            Self::OnChange => {
                let accuracy = p.f64_or("accuracy", 0.0)?;
                let step = p.i64_or("step", 0)?;
                let noise = p.f64_or("noise", 0.0)?;
                let mode: NoiseMode = p.text_or("noise_type", "relative")?.parse()?;
                Arc::new(OnChange::new(name, accuracy, step, noise, mode))
            }
        };
        p.finish()?;
        Ok(reader)
    }
}

/// Registered networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Ideal,
    Normal,
}

impl FromStr for NetworkKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ideal" => Ok(Self::Ideal),
            "Normal" => Ok(Self::Normal),
            other => Err(not_listed("network", other)),
        }
    }
}

impl NetworkKind {
    pub fn construct(self, params: BTreeMap<String, Value>) -> SimResult<Arc<dyn Network>> {
        let mut p = ParamMap::new(format!("{:?} network", self), params);
        let name = p.text_or("name", "")?;
        let network: Arc<dyn Network> = match self {
            Self::Ideal => Arc::new(Ideal::new(name)),
            Self::Normal => Arc::new(Normal::new(
                name,
                p.opt_f64("delay")?,
                p.opt_f64("jitter")?,
                p.opt_f64("drop_rate")?,
            )),
        };
        p.finish()?;
        Ok(network)
    }
}

fn build_labelled<T: ?Sized>(
    component: &str,
    defs: Vec<ComponentDef>,
    construct: impl Fn(&str, BTreeMap<String, Value>) -> SimResult<Arc<T>>,
) -> SimResult<HashMap<String, Arc<T>>> {
    let mut built = HashMap::with_capacity(defs.len());
    for def in defs {
        if built.contains_key(&def.label) {
            return Err(SimError::config(format!(
                "Duplicate {} label '{}'",
                component, def.label
            )));
        }
        let item = construct(&def.kind, def.parameters)?;
        built.insert(def.label, item);
    }
    Ok(built)
}

fn binding_target(signal: &str) -> Option<&str> {
    if signal == DEFAULT_BINDING {
        None
    } else {
        Some(signal)
    }
}

/// Builds an assembly from a parsed document.
pub fn from_document(doc: AssemblyDocument) -> SimResult<Assembly> {
    let kind: AssemblyKind = doc.assembly.kind.parse()?;
    let mut template = kind.construct(doc.assembly.parameters)?;

    let readers = build_labelled("reader", doc.readers, |tag, params| {
        tag.parse::<ReaderKind>()?.construct(params)
    })?;
    for (signal, label) in &doc.assembly.readers {
        let reader = readers.get(label).ok_or_else(|| {
            SimError::config(format!("Undefined reader label '{}' in assembly definition", label))
        })?;
        template.attach_reader(Arc::clone(reader), binding_target(signal))?;
    }

    let networks = build_labelled("network", doc.networks, |tag, params| {
        tag.parse::<NetworkKind>()?.construct(params)
    })?;
    for (signal, label) in &doc.assembly.networks {
        let network = networks.get(label).ok_or_else(|| {
            SimError::config(format!("Undefined network label '{}' in assembly definition", label))
        })?;
        template.attach_network(Arc::clone(network), binding_target(signal))?;
    }

    debug!(assembly = template.name(), kind = ?kind, "assembly built from config");
    template.build()
}

/// Parses an assembly document from YAML.
pub fn parse(yaml: &str) -> RunResult<AssemblyDocument> {
    serde_yaml::from_str(yaml).map_err(|e| RunError::ParseError(e.to_string()))
}

/// Builds an assembly from a YAML string.
pub fn from_config(yaml: &str) -> RunResult<Assembly> {
    Ok(from_document(parse(yaml)?)?)
}

/// Builds an assembly from a YAML file.
pub fn from_path(path: &Path) -> RunResult<Assembly> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RunError::ReadError(format!("{}: {}", path.display(), e)))?;
    from_config(&content)
}
