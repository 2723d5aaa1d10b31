//! Message sinks and the routing table that feeds them.
//!
//! Built-in destination types:
//!
//! | type     | parameters | behaviour                          |
//! |----------|------------|------------------------------------|
//! | `stdout` | -          | one message per line on stdout     |
//! | `stderr` | -          | one message per line on stderr     |
//! | `file`   | `path`     | JSON lines appended to `path`      |
//! | `memory` | -          | kept in memory, for inspection     |
//!
//! A routing label that is not declared under `destinations` is taken as a
//! type tag with no parameters, so `routing: {truth: stdout}` works without
//! any further configuration.

use crate::config::{DestinationConfig, RunnerConfig};
use crate::error::RunResult;
use async_trait::async_trait;
use iotsim_env::{DataView, Destination, EnvError};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Writes each message as a line on stdout.
#[derive(Debug, Default)]
pub struct StdoutDestination;

#[async_trait]
impl Destination for StdoutDestination {
    async fn send(&self, message: &str) -> Result<(), EnvError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", message)?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), EnvError> {
        std::io::stdout().lock().flush()?;
        Ok(())
    }
}

/// Writes each message as a line on stderr.
#[derive(Debug, Default)]
pub struct StderrDestination;

#[async_trait]
impl Destination for StderrDestination {
    async fn send(&self, message: &str) -> Result<(), EnvError> {
        let mut out = std::io::stderr().lock();
        writeln!(out, "{}", message)?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), EnvError> {
        std::io::stderr().lock().flush()?;
        Ok(())
    }
}

/// Appends messages to a file, one per line.
#[derive(Debug)]
pub struct FileDestination {
    path: String,
    writer: Mutex<BufWriter<File>>,
}

impl FileDestination {
    pub fn create(path: &str) -> Result<Self, EnvError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_string(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BufWriter<File>>, EnvError> {
        self.writer
            .lock()
            .map_err(|_| EnvError::sink(format!("writer for {} poisoned", self.path)))
    }
}

#[async_trait]
impl Destination for FileDestination {
    async fn send(&self, message: &str) -> Result<(), EnvError> {
        writeln!(self.lock()?, "{}", message)?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), EnvError> {
        self.lock()?.flush()?;
        debug!(path = %self.path, "file destination flushed");
        Ok(())
    }
}

/// Keeps messages in memory; used to inspect a run.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    messages: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far, in arrival order.
    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn send(&self, message: &str) -> Result<(), EnvError> {
        if self.is_shut_down() {
            return Err(EnvError::sink("memory destination already shut down"));
        }
        self.messages
            .lock()
            .map_err(|_| EnvError::sink("memory destination poisoned"))?
            .push(message.to_string());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), EnvError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Instantiates a destination from its type tag and parameters.
pub fn build_destination(
    kind: &str,
    parameters: &BTreeMap<String, serde_yaml::Value>,
) -> Result<Arc<dyn Destination>, EnvError> {
    let check_keys = |allowed: &[&str]| -> Result<(), EnvError> {
        match parameters.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(EnvError::invalid(format!(
                "unknown parameter '{}' for {} destination",
                key, kind
            ))),
            None => Ok(()),
        }
    };

    match kind {
        "stdout" => {
            check_keys(&[])?;
            Ok(Arc::new(StdoutDestination))
        }
        "stderr" => {
            check_keys(&[])?;
            Ok(Arc::new(StderrDestination))
        }
        "memory" => {
            check_keys(&[])?;
            Ok(Arc::new(MemoryDestination::new()))
        }
        "file" => {
            check_keys(&["path"])?;
            let path = parameters
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| EnvError::invalid("file destination requires a string 'path'"))?;
            Ok(Arc::new(FileDestination::create(path)?))
        }
        other => Err(EnvError::unsupported(other)),
    }
}

/// Destinations per data view.
///
/// A label routed to both views resolves to the same instance.
#[derive(Default)]
pub struct Routes {
    truth: Vec<(String, Arc<dyn Destination>)>,
    reading: Vec<(String, Arc<dyn Destination>)>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every destination named in `config.routing`.
    pub fn from_config(config: &RunnerConfig) -> RunResult<Self> {
        let mut instances: HashMap<String, Arc<dyn Destination>> = HashMap::new();
        let mut routes = Self::new();

        for view in DataView::ALL {
            for label in config.routing.labels(view) {
                let sink = match instances.get(label) {
                    Some(sink) => Arc::clone(sink),
                    None => {
                        let sink = match config.destinations.get(label) {
                            Some(DestinationConfig { kind, parameters }) => {
                                build_destination(kind, parameters)?
                            }
                            None => build_destination(label, &BTreeMap::new())?,
                        };
                        debug!(label = %label, "destination created");
                        instances.insert(label.clone(), Arc::clone(&sink));
                        sink
                    }
                };
                routes.add(view, label.clone(), sink);
            }
        }

        for label in config.destinations.keys() {
            if !instances.contains_key(label) {
                warn!(label = %label, "destination declared but never routed");
            }
        }
        Ok(routes)
    }

    pub fn add(&mut self, view: DataView, label: impl Into<String>, sink: Arc<dyn Destination>) {
        let entry = (label.into(), sink);
        match view {
            DataView::Truth => self.truth.push(entry),
            DataView::Reading => self.reading.push(entry),
        }
    }

    /// Labelled sinks for `view`, in routing order.
    pub fn sinks(&self, view: DataView) -> &[(String, Arc<dyn Destination>)] {
        match view {
            DataView::Truth => &self.truth,
            DataView::Reading => &self.reading,
        }
    }

    pub fn is_empty(&self, view: DataView) -> bool {
        self.sinks(view).is_empty()
    }

    /// Shuts every distinct sink down once; returns the number of failures.
    pub async fn shutdown_all(&self) -> usize {
        let mut done: Vec<usize> = Vec::new();
        let mut failures = 0;
        for (label, sink) in self.truth.iter().chain(self.reading.iter()) {
            let key = Arc::as_ptr(sink) as *const () as usize;
            if done.contains(&key) {
                continue;
            }
            done.push(key);
            if let Err(e) = sink.shutdown().await {
                warn!(label = %label, error = %e, "destination shutdown failed");
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;

    #[tokio::test]
    async fn test_memory_destination() {
        let sink = MemoryDestination::new();
        sink.send("a").await.unwrap();
        sink.send("b").await.unwrap();
        assert_eq!(sink.messages(), vec!["a", "b"]);

        sink.shutdown().await.unwrap();
        assert!(sink.is_shut_down());
        assert!(sink.send("c").await.is_err());
    }

    #[test]
    fn test_build_destination_rejects_unknown() {
        assert!(build_destination("memory", &BTreeMap::new()).is_ok());

        let err = build_destination("kafka", &BTreeMap::new()).err().unwrap();
        assert!(matches!(err, EnvError::UnsupportedDestination(ref k) if k == "kafka"));

        let err = build_destination("file", &BTreeMap::new()).err().unwrap();
        assert!(matches!(err, EnvError::InvalidParameters(_)));

        let mut params = BTreeMap::new();
        params.insert("colour".to_string(), serde_yaml::Value::from("red"));
        assert!(build_destination("stdout", &params).is_err());
    }

    #[tokio::test]
    async fn test_file_destination_appends_lines() {
        let path = std::env::temp_dir().join(format!("iotsim-dest-{}.jsonl", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);

        let sink = FileDestination::create(&path_str).unwrap();
        sink.send(r#"{"a":1}"#).await.unwrap();
        sink.send(r#"{"a":2}"#).await.unwrap();
        sink.shutdown().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_routes_share_instances() {
        let config = RunnerConfig::parse(
            "routing:\n  truth: [stdout, stderr]\n  reading: [stdout]\n",
        )
        .unwrap();
        let routes = Routes::from_config(&config).unwrap();
        assert_eq!(routes.sinks(DataView::Truth).len(), 2);
        assert_eq!(routes.sinks(DataView::Reading).len(), 1);
        assert!(Arc::ptr_eq(
            &routes.sinks(DataView::Truth)[0].1,
            &routes.sinks(DataView::Reading)[0].1
        ));
        assert_eq!(routes.shutdown_all().await, 0);
    }

    #[test]
    fn test_routes_unknown_label() {
        let config = RunnerConfig::parse("routing: {truth: nowhere, reading: stdout}").unwrap();
        let err = Routes::from_config(&config).err().unwrap();
        assert!(matches!(err, RunError::Env(EnvError::UnsupportedDestination(_))));
    }

    #[tokio::test]
    async fn test_shutdown_once_per_instance() {
        let sink = Arc::new(MemoryDestination::new());
        let mut routes = Routes::new();
        routes.add(DataView::Truth, "mem", sink.clone());
        routes.add(DataView::Reading, "mem", sink.clone());
        assert_eq!(routes.shutdown_all().await, 0);
        assert!(sink.is_shut_down());
    }
}
