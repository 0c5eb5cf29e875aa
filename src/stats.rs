//! Timing statistics for completed renders.
//!
//! The aggregator is an append-only, chronological list of
//! [`ComputationRecord`]s. Averages are derived on demand and never stored.

use crate::model::EngineKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timing of one completed render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationRecord {
    /// Wall-clock time of the compute phase in milliseconds.
    pub elapsed_ms: f64,
    /// Resolution label such as `"4096x4096"`.
    pub resolution: String,
    /// Engine that produced the render.
    pub engine: EngineKind,
}

impl ComputationRecord {
    pub fn new(elapsed_ms: f64, resolution: impl Into<String>, engine: EngineKind) -> Self {
        Self {
            elapsed_ms,
            resolution: resolution.into(),
            engine,
        }
    }
}

impl fmt::Display for ComputationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Size: {}, Time: {:.2} ms, Type: {}",
            self.resolution, self.elapsed_ms, self.engine
        )
    }
}

/// Mean elapsed time over a group of records.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineAverage {
    pub engine: EngineKind,
    pub resolution: String,
    pub count: usize,
    pub mean_ms: f64,
}

impl fmt::Display for EngineAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "| {} | {:.2} ms", self.resolution, self.mean_ms)
    }
}

/// Append-only history of computation records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsAggregator {
    records: Vec<ComputationRecord>,
}

impl StatsAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an aggregator over previously saved records.
    pub fn from_records(records: Vec<ComputationRecord>) -> Self {
        Self { records }
    }

    /// Appends a record.
    pub fn record(&mut self, record: ComputationRecord) {
        self.records.push(record);
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[ComputationRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean over every record for `engine`, or `None` when there are none.
    ///
    /// The resolution label is taken from the most recent matching record.
    pub fn average(&self, engine: EngineKind) -> Option<EngineAverage> {
        let mut matching = self.records.iter().filter(|r| r.engine == engine);
        let first = matching.next()?;
        let (count, total, last) = matching.fold((1usize, first.elapsed_ms, first), |acc, r| {
            (acc.0 + 1, acc.1 + r.elapsed_ms, r)
        });
        Some(EngineAverage {
            engine,
            resolution: last.resolution.clone(),
            count,
            mean_ms: total / count as f64,
        })
    }

    /// Means grouped by engine and resolution, in order of first appearance.
    pub fn averages(&self) -> Vec<EngineAverage> {
        let mut groups: Vec<(EngineKind, &str, usize, f64)> = Vec::new();
        for record in &self.records {
            match groups
                .iter_mut()
                .find(|(engine, res, _, _)| *engine == record.engine && *res == record.resolution)
            {
                Some(group) => {
                    group.2 += 1;
                    group.3 += record.elapsed_ms;
                }
                None => groups.push((
                    record.engine,
                    record.resolution.as_str(),
                    1,
                    record.elapsed_ms,
                )),
            }
        }
        groups
            .into_iter()
            .map(|(engine, resolution, count, total)| EngineAverage {
                engine,
                resolution: resolution.to_string(),
                count,
                mean_ms: total / count as f64,
            })
            .collect()
    }

    /// Multi-line listing of every record, or a placeholder when empty.
    pub fn listing(&self) -> String {
        if self.records.is_empty() {
            return "There are no stats to be displayed...".to_string();
        }
        let mut out = String::from("All sets calculated so far:\n\n");
        for record in &self.records {
            out.push_str(&format!(" - {}\n", record));
        }
        out
    }
}
