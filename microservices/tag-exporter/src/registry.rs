//! Process-wide registry of tag series
//!
//! Series are created lazily on first sight of a key and live for the rest of
//! the process. Each one is registered exactly once with a private
//! `prometheus::Registry` as a custom collector, so a scrape renders the value
//! and label set that were written together by the latest update.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

pub const SERIES_HELP: &str = "Latest value reported by a device tag";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("series {name} cannot decrease below zero (got {value})")]
    NegativeValue { name: String, value: f64 },

    #[error("series {name} expects {expected} labels, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to register series {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

pub type SeriesHandle = Arc<Series>;

/// Point-in-time copy of one series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub name: String,
    pub label_names: Vec<String>,
    pub label_values: Vec<String>,
    pub value: f64,
}

#[derive(Debug, Default)]
struct SeriesState {
    value: f64,
    label_values: Vec<String>,
}

/// A named series with a fixed label schema and one current (value, labels) pair
#[derive(Debug)]
pub struct Series {
    name: String,
    label_names: Vec<String>,
    desc: Desc,
    state: RwLock<SeriesState>,
}

impl Series {
    fn new(name: &str, label_names: &[&str]) -> Result<Self, RegistryError> {
        let label_names: Vec<String> = label_names.iter().map(|l| l.to_string()).collect();
        let desc = Desc::new(
            name.to_string(),
            SERIES_HELP.to_string(),
            label_names.clone(),
            HashMap::new(),
        )
        .map_err(|source| RegistryError::Registration {
            name: name.to_string(),
            source,
        })?;

        Ok(Self {
            name: name.to_string(),
            label_names,
            desc,
            state: RwLock::new(SeriesState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.label_names.len()
    }

    /// Replace value and labels together. Negative values are rejected and
    /// the previous value is kept.
    pub fn set(&self, value: f64, label_values: Vec<String>) -> Result<(), RegistryError> {
        if value < 0.0 {
            warn!(series = %self.name, value, "Series cannot decrease in value, update dropped");
            return Err(RegistryError::NegativeValue {
                name: self.name.clone(),
                value,
            });
        }

        if label_values.len() != self.arity() {
            error!(
                series = %self.name,
                expected = self.arity(),
                actual = label_values.len(),
                "Label arity mismatch for existing series"
            );
            return Err(RegistryError::ArityMismatch {
                name: self.name.clone(),
                expected: self.arity(),
                actual: label_values.len(),
            });
        }

        let mut state = self.state.write();
        state.value = value;
        state.label_values = label_values;
        Ok(())
    }

    /// `None` until the first successful `set`
    pub fn snapshot(&self) -> Option<SeriesSnapshot> {
        let state = self.state.read();
        if state.label_values.len() != self.arity() {
            return None;
        }
        Some(SeriesSnapshot {
            name: self.name.clone(),
            label_names: self.label_names.clone(),
            label_values: state.label_values.clone(),
            value: state.value,
        })
    }
}

struct SeriesCollector(SeriesHandle);

impl Collector for SeriesCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.0.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let Some(snapshot) = self.0.snapshot() else {
            return Vec::new();
        };

        let mut counter = proto::Counter::default();
        counter.set_value(snapshot.value);

        let mut metric = proto::Metric::default();
        metric.set_counter(counter);
        for (name, value) in snapshot.label_names.into_iter().zip(snapshot.label_values) {
            let mut pair = proto::LabelPair::default();
            pair.set_name(name);
            pair.set_value(value);
            metric.mut_label().push(pair);
        }

        let mut family = MetricFamily::default();
        family.set_name(snapshot.name);
        family.set_help(SERIES_HELP.to_string());
        family.set_field_type(MetricType::COUNTER);
        family.mut_metric().push(metric);

        vec![family]
    }
}

/// Mapping from derived series name to series, shared by every device session
/// and the scrape handler
pub struct SeriesRegistry {
    series: DashMap<String, SeriesHandle>,
    exposition: Registry,
}

impl SeriesRegistry {
    pub fn new() -> Self {
        Self {
            series: DashMap::new(),
            exposition: Registry::new(),
        }
    }

    /// Look up a series by name, creating and registering it on first sight.
    ///
    /// Concurrent callers for the same name all get the same instance, and it
    /// is registered for exposition once.
    pub fn get_or_create(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<SeriesHandle, RegistryError> {
        let series = match self.series.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let series = self.register(name, label_names).map_err(|e| {
                    warn!(series = %name, error = %e, "Cannot register series, update dropped");
                    e
                })?;
                entry.insert(series.clone());
                info!(series = %name, labels = ?label_names, "Registered new series");
                return Ok(series);
            }
        };

        if series.arity() != label_names.len() {
            error!(
                series = %name,
                expected = series.arity(),
                actual = label_names.len(),
                "Series requested with a different label schema"
            );
            return Err(RegistryError::ArityMismatch {
                name: name.to_string(),
                expected: series.arity(),
                actual: label_names.len(),
            });
        }

        Ok(series)
    }

    fn register(&self, name: &str, label_names: &[&str]) -> Result<SeriesHandle, RegistryError> {
        let series = Arc::new(Series::new(name, label_names)?);
        self.exposition
            .register(Box::new(SeriesCollector(series.clone())))
            .map_err(|source| RegistryError::Registration {
                name: name.to_string(),
                source,
            })?;
        Ok(series)
    }

    pub fn set_value(
        &self,
        series: &Series,
        value: f64,
        label_values: Vec<String>,
    ) -> Result<(), RegistryError> {
        series.set(value, label_values)
    }

    pub fn get(&self, name: &str) -> Option<SeriesHandle> {
        self.series.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Snapshot of every series that has a value, sorted by name
    pub fn collect(&self) -> Vec<SeriesSnapshot> {
        let mut snapshots: Vec<SeriesSnapshot> = self
            .series
            .iter()
            .filter_map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Render the current state in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, RegistryError> {
        let families = self.exposition.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| RegistryError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| RegistryError::Encoding(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl Default for SeriesRegistry {
    fn default() -> Self {
        Self::new()
    }
}
