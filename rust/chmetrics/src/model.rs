//! Metric data model produced by a query: one named series of attributed samples.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_UNIT: &str = "by";

/// Attribute key/value pairs identifying the stream a sample belongs to.
///
/// Keys are kept sorted and unique; inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, String>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub start_timestamp: DateTime<Utc>,
    pub value: f64,
    pub attributes: AttributeSet,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64, attributes: AttributeSet) -> Self {
        Self {
            timestamp,
            start_timestamp: timestamp,
            value,
            attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporality {
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub aggregation: Aggregation,
    pub temporality: Temporality,
    pub monotonic: bool,
    pub samples: Vec<MetricSample>,
}

impl MetricSeries {
    /// Wraps samples as a monotonic cumulative sum, the only shape queries emit.
    pub fn cumulative_sum(name: impl Into<String>, samples: Vec<MetricSample>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: DEFAULT_UNIT.to_string(),
            aggregation: Aggregation::Sum,
            temporality: Temporality::Cumulative,
            monotonic: true,
            samples,
        }
    }
}
