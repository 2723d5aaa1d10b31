//! Ready-made assemblies.
//!
//! Each constructor returns an [`AssemblyTemplate`]: the signals are fixed,
//! while readers and networks can still be attached per signal (or as the
//! default) before [`AssemblyTemplate::build`]. Unattached signals read
//! through `Passthrough` over an `Ideal` network.

use iotsim_core::control::{Control, ParameterUpdate, Phase, Retrieval};
use iotsim_core::{
    pulser, Assembly, Behavior, Character, Feature, Flatline, Ideal, Linear, Network, Passthrough,
    Reader, Signal, SimError, SimResult, Trigger, Value, RUNNING_BEHAVIOR,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Settings shared by every constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOptions {
    /// Assembly name; each constructor has its own default
    pub name: Option<String>,
    /// Seconds per tick
    pub tick: f64,
    pub history_depth: usize,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            name: None,
            tick: 1.0,
            history_depth: 1,
        }
    }
}

struct SignalSpec {
    name: String,
    feature: Feature,
    character: Character,
}

/// Signals waiting for their readers and networks.
pub struct AssemblyTemplate {
    name: String,
    tick: f64,
    history_depth: usize,
    signals: Vec<SignalSpec>,
    default_reader: Arc<dyn Reader>,
    default_network: Arc<dyn Network>,
    readers: HashMap<String, Arc<dyn Reader>>,
    networks: HashMap<String, Arc<dyn Network>>,
}

impl AssemblyTemplate {
    fn new(options: TemplateOptions, default_name: &str, signals: Vec<SignalSpec>) -> Self {
        Self {
            name: options.name.unwrap_or_else(|| default_name.to_string()),
            tick: options.tick,
            history_depth: options.history_depth,
            signals,
            default_reader: Arc::new(Passthrough::new("")),
            default_network: Arc::new(Ideal::new("")),
            readers: HashMap::new(),
            networks: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal_names(&self) -> Vec<&str> {
        self.signals.iter().map(|s| s.name.as_str()).collect()
    }

    fn check_signal(&self, signal: &str) -> SimResult<()> {
        if self.signals.iter().any(|s| s.name == signal) {
            Ok(())
        } else {
            Err(SimError::config(format!(
                "Assembly '{}' has no signal '{}'; signals: {:?}",
                self.name,
                signal,
                self.signal_names()
            )))
        }
    }

    /// Binds `reader` to `signal`, or makes it the default when `signal` is `None`.
    pub fn attach_reader(&mut self, reader: Arc<dyn Reader>, signal: Option<&str>) -> SimResult<()> {
        match signal {
            None => self.default_reader = reader,
            Some(signal) => {
                self.check_signal(signal)?;
                self.readers.insert(signal.to_string(), reader);
            }
        }
        Ok(())
    }

    /// Binds `network` to `signal`, or makes it the default when `signal` is `None`.
    pub fn attach_network(
        &mut self,
        network: Arc<dyn Network>,
        signal: Option<&str>,
    ) -> SimResult<()> {
        match signal {
            None => self.default_network = network,
            Some(signal) => {
                self.check_signal(signal)?;
                self.networks.insert(signal.to_string(), network);
            }
        }
        Ok(())
    }

    pub fn build(self) -> SimResult<Assembly> {
        let mut signals = Vec::with_capacity(self.signals.len());
        for spec in self.signals {
            let reader = self
                .readers
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.default_reader));
            let network = self
                .networks
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.default_network));
            signals.push(
                Signal::new(spec.name, spec.feature, reader, network)?.with_character(spec.character),
            );
        }
        Assembly::new(self.name, signals, self.tick, self.history_depth)
    }
}

/// One signal `flatline` holding `level`.
pub fn flatline(options: TemplateOptions, level: Value) -> SimResult<AssemblyTemplate> {
    let feature = Feature::new("f", vec![Box::new(Flatline::new("b", Some(level))?)], vec![])?;
    Ok(AssemblyTemplate::new(
        options,
        "Flatline",
        vec![SignalSpec {
            name: "flatline".into(),
            feature,
            character: Character::Continuous,
        }],
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeesawParams {
    pub forward_start: Value,
    pub forward_increment: Value,
    pub forward_stop: Value,
    pub return_start: Value,
    pub return_increment: Value,
    pub return_stop: Value,
}

impl Default for SeesawParams {
    fn default() -> Self {
        Self {
            forward_start: Value::Int(0),
            forward_increment: Value::Int(1),
            forward_stop: Value::Int(10),
            return_start: Value::Int(10),
            return_increment: Value::Int(-2),
            return_stop: Value::Int(0),
        }
    }
}

/// One signal `seesaw` ramping forward until it leaves
/// `[forward_start, forward_stop]`, then back until it leaves
/// `[return_start, return_stop]`.
pub fn seesaw(options: TemplateOptions, p: SeesawParams) -> SimResult<AssemblyTemplate> {
    let behaviors: Vec<Box<dyn Behavior>> = vec![
        Box::new(Linear::new(
            "b.forward",
            Some(p.forward_start.clone()),
            Some(p.forward_increment),
        )?),
        Box::new(Linear::new(
            "b.return",
            Some(p.return_start.clone()),
            Some(p.return_increment),
        )?),
    ];
    let controls = vec![
        Control::update(
            "c.to_return",
            "b.forward",
            Phase::OnYield,
            Trigger::history_out_of_range("t.to_return", "f", 0, p.forward_start, p.forward_stop),
            vec![ParameterUpdate::new("f", RUNNING_BEHAVIOR, "b.return")],
        ),
        Control::update(
            "c.to_forward",
            "b.return",
            Phase::OnYield,
            Trigger::history_out_of_range("t.to_forward", "f", 0, p.return_start, p.return_stop),
            vec![ParameterUpdate::new("f", RUNNING_BEHAVIOR, "b.forward")],
        ),
    ];
    let feature = Feature::new("f", behaviors, controls)?;
    Ok(AssemblyTemplate::new(
        options,
        "Seesaw",
        vec![SignalSpec {
            name: "seesaw".into(),
            feature,
            character: Character::Continuous,
        }],
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PulserParams {
    pub level1: Value,
    pub duration1: i64,
    pub level2: Value,
    pub duration2: i64,
}

impl Default for PulserParams {
    fn default() -> Self {
        Self {
            level1: Value::Int(0),
            duration1: 3,
            level2: Value::Int(2),
            duration2: 2,
        }
    }
}

/// One discrete signal `pulse` alternating between two levels.
pub fn pulse(options: TemplateOptions, p: PulserParams) -> SimResult<AssemblyTemplate> {
    let feature = pulser("f", p.level1, p.duration1, p.level2, p.duration2)?;
    Ok(AssemblyTemplate::new(
        options,
        "Pulser",
        vec![SignalSpec {
            name: "pulse".into(),
            feature,
            character: Character::Discrete,
        }],
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorParams {
    pub control_name: String,
    pub control_off_duration: i64,
    pub control_on_duration: i64,
    pub sensor_name: String,
    pub sensor_init: Value,
    pub sensor_rise_rate: Value,
    pub sensor_fall_rate: Value,
    /// Ticks between a control change and the sensor's reaction
    pub sensor_reaction_delay: usize,
}

impl Default for ActuatorParams {
    fn default() -> Self {
        Self {
            control_name: "control".into(),
            control_off_duration: 5,
            control_on_duration: 2,
            sensor_name: "sensor".into(),
            sensor_init: Value::Int(0),
            sensor_rise_rate: Value::Int(1),
            sensor_fall_rate: Value::Int(2),
            sensor_reaction_delay: 0,
        }
    }
}

const CONTROL_OFF: i64 = 0;
const CONTROL_ON: i64 = 1;

/// A discrete on/off control pulsing a sensor: the sensor rises while the
/// control is on, falls while it is off, and rests at `sensor_init`.
///
/// The sensor reacts to the control value `sensor_reaction_delay` ticks
/// back, so the history depth is raised to cover that lag.
pub fn simple_actuator(
    mut options: TemplateOptions,
    p: ActuatorParams,
) -> SimResult<AssemblyTemplate> {
    options.history_depth = options.history_depth.max(p.sensor_reaction_delay + 1);

    let control = pulser(
        "f.control",
        CONTROL_OFF,
        p.control_off_duration,
        CONTROL_ON,
        p.control_on_duration,
    )?;

    let init = p.sensor_init.to_f64()?;
    let fall = Value::affine(&Value::Int(0), &p.sensor_fall_rate, -1)?;
    let behaviors: Vec<Box<dyn Behavior>> = vec![
        Box::new(Flatline::new("b.flat", Some(p.sensor_init.clone()))?),
        Box::new(Linear::new(
            "b.rise",
            Some(p.sensor_init.clone()),
            Some(p.sensor_rise_rate),
        )?),
        Box::new(Linear::new("b.fall", None, Some(fall))?),
    ];

    let delay = p.sensor_reaction_delay;
    let to_rise = Trigger::history_condition("", "f.control", delay, |x| {
        x.same_as(&Value::Int(CONTROL_ON))
    });
    let to_fall = Trigger::history_condition("", "f.control", delay, |x| {
        x.same_as(&Value::Int(CONTROL_OFF))
    });
    let to_flat = Trigger::history_condition("", "f.sensor", 0, move |x| {
        x.as_f64().map_or(false, |v| v <= init)
    });

    let switch = |behavior: &str| ParameterUpdate::new("f.sensor", RUNNING_BEHAVIOR, behavior);
    let controls = vec![
        Control::update(
            "",
            "b.flat",
            Phase::OnYield,
            to_rise.clone(),
            vec![
                switch("b.rise"),
                ParameterUpdate::new("b.rise", "bias", p.sensor_init),
            ],
        ),
        Control::update(
            "",
            "b.fall",
            Phase::OnYield,
            to_rise,
            vec![
                switch("b.rise"),
                ParameterUpdate::new("b.rise", "bias", Retrieval::history("f.sensor", 0)),
            ],
        ),
        Control::update(
            "",
            "b.rise",
            Phase::OnYield,
            to_fall,
            vec![
                switch("b.fall"),
                ParameterUpdate::new("b.fall", "bias", Retrieval::history("f.sensor", 0)),
            ],
        ),
        Control::update("", "b.fall", Phase::OnYield, to_flat, vec![switch("b.flat")]),
    ];
    let sensor = Feature::new("f.sensor", behaviors, controls)?;

    Ok(AssemblyTemplate::new(
        options,
        "Actuator",
        vec![
            SignalSpec {
                name: p.control_name,
                feature: control,
                character: Character::Discrete,
            },
            SignalSpec {
                name: p.sensor_name,
                feature: sensor,
                character: Character::Continuous,
            },
        ],
    ))
}
