//! Runner configuration.
//!
//! Loaded from YAML; every field has a default so an empty document (or
//! no document at all) is a valid configuration. Command-line flags are
//! applied on top with the `with_*` overrides.
//!
//! ```yaml
//! name: plant
//! ticks: 100
//! pace: 2.0
//! start_time: "2024-01-01 00:00:00"
//! start_delta: 0
//! routing:
//!   truth: [archive]
//!   reading: stdout
//! destinations:
//!   archive:
//!     type: file
//!     parameters:
//!       path: truths.jsonl
//! overrun:
//!   policy: skip
//!   tolerance: 0.05
//! ```

use crate::error::{RunError, RunResult};
use crate::message::{parse_timestamp, shift_timestamp, try_seconds, MessageFormat};
use chrono::NaiveDateTime;
use iotsim_env::DataView;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Name used in message `meta`; defaults to the assembly's name
    pub name: Option<String>,

    /// Number of ticks to run, 0 = unbounded
    pub ticks: u64,

    /// >1 speeds the assembly up, <1 slows it down
    pub pace: f64,

    /// `now` or a timestamp
    pub start_time: String,

    /// Seconds added to the start time (clock skew at the destination)
    pub start_delta: f64,

    pub message_format: MessageFormat,
    pub routing: Routing,
    pub destinations: BTreeMap<String, DestinationConfig>,

    /// Seed for every stochastic draw of the run
    pub seed: Option<u64>,

    pub overrun: OverrunConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: None,
            ticks: 0,
            pace: 1.0,
            start_time: "now".to_string(),
            start_delta: 0.0,
            message_format: MessageFormat::Json,
            routing: Routing::default(),
            destinations: BTreeMap::new(),
            seed: None,
            overrun: OverrunConfig::default(),
        }
    }
}

/// Sink labels per data view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routing {
    #[serde(deserialize_with = "one_or_many")]
    pub reading: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub truth: Vec<String>,
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            reading: vec!["stdout".to_string()],
            truth: vec!["stdout".to_string()],
        }
    }
}

impl Routing {
    pub fn labels(&self, view: DataView) -> &[String] {
        match view {
            DataView::Truth => &self.truth,
            DataView::Reading => &self.reading,
        }
    }
}

/// A label may be given alone or as a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(label) => vec![label],
        OneOrMany::Many(labels) => labels,
    })
}

/// A labelled destination: a type tag plus free-form parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,
}

/// What to do when a tick is dispatched after its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    /// Fail the run
    #[default]
    Abort,
    /// Drop the late tick's deliveries and continue
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrunConfig {
    pub policy: OverrunPolicy,
    /// Accepted lateness, seconds
    pub tolerance: f64,
}

impl Default for OverrunConfig {
    fn default() -> Self {
        Self {
            policy: OverrunPolicy::Abort,
            tolerance: 0.0,
        }
    }
}

impl RunnerConfig {
    /// Loads configuration from a YAML file.
    pub fn load_from(path: &Path) -> RunResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RunError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parses configuration from a YAML string.
    pub fn parse(yaml: &str) -> RunResult<Self> {
        // An empty document deserializes as null
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| RunError::ParseError(e.to_string()))
    }

    pub fn with_ticks(mut self, ticks: Option<u64>) -> Self {
        if let Some(ticks) = ticks {
            self.ticks = ticks;
        }
        self
    }

    pub fn with_pace(mut self, pace: Option<f64>) -> Self {
        if let Some(pace) = pace {
            self.pace = pace;
        }
        self
    }

    pub fn with_start_time(mut self, start_time: Option<String>) -> Self {
        if let Some(start_time) = start_time {
            self.start_time = start_time;
        }
        self
    }

    pub fn with_start_delta(mut self, start_delta: Option<f64>) -> Self {
        if let Some(start_delta) = start_delta {
            self.start_delta = start_delta;
        }
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> RunResult<()> {
        if !(self.pace > 0.0 && self.pace.is_finite()) {
            return Err(RunError::validation(format!(
                "pace must be positive, got {}",
                self.pace
            )));
        }
        if try_seconds(self.start_delta).is_none() {
            return Err(RunError::validation(format!(
                "start_delta out of range, got {}",
                self.start_delta
            )));
        }
        if !(self.overrun.tolerance >= 0.0 && self.overrun.tolerance.is_finite()) {
            return Err(RunError::validation(format!(
                "overrun tolerance must be non-negative, got {}",
                self.overrun.tolerance
            )));
        }
        if self.start_time != "now" && parse_timestamp(&self.start_time).is_none() {
            return Err(RunError::validation(format!(
                "start_time must be 'now' or a timestamp, got '{}'",
                self.start_time
            )));
        }
        for view in DataView::ALL {
            if self.routing.labels(view).is_empty() {
                return Err(RunError::validation(format!("no destination routed for {}", view)));
            }
        }
        Ok(())
    }

    /// Resolves the start time against the current local time, delta included.
    pub fn resolve_start(&self, now: NaiveDateTime) -> RunResult<NaiveDateTime> {
        let base = if self.start_time == "now" {
            now
        } else {
            parse_timestamp(&self.start_time).ok_or_else(|| {
                RunError::validation(format!("unparseable start_time '{}'", self.start_time))
            })?
        };
        shift_timestamp(base, self.start_delta).ok_or_else(|| {
            RunError::validation(format!(
                "start time {} shifted by {}s is out of range",
                base, self.start_delta
            ))
        })
    }
}
