//! Experiment record: the mutable aggregate of one execution run.

use crate::components::{Params, SensorData};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Whether an instruction touched real hardware or was simulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Executed,
    Simulated,
}

/// One dispatched instruction, as it happened.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub params: Params,
    pub success: bool,
    pub kind: RecordKind,
    /// Seconds since the experiment's start time, fixed at append time.
    pub experiment_elapsed_time: f64,
}

/// One sampled sensor value.
#[derive(Clone, Debug, Serialize)]
pub struct Datapoint {
    pub data: SensorData,
    pub timestamp: DateTime<Utc>,
    pub experiment_elapsed_time: f64,
}

/// The aggregate produced by one `execute` call.
///
/// Created fresh per run, appended to only by the execution engine's tasks
/// (through a shared lock), frozen at completion and owned by the caller
/// thereafter. Derived values are never computed eagerly; elapsed times are
/// fixed once, when each record is appended.
#[derive(Clone, Debug, Serialize)]
pub struct Experiment {
    pub id: Uuid,
    pub protocol_name: String,
    pub start_time: Option<DateTime<Utc>>,
    /// Stamped only when every task joined without a critical failure.
    pub end_time: Option<DateTime<Utc>>,
    pub executed_procedures: Vec<ExecutionRecord>,
    pub datapoints: HashMap<String, Vec<Datapoint>>,
    pub is_executing: bool,
    pub was_executed: bool,
    /// Set when a strict-mode device failure aborted the run.
    pub critically_failed: bool,
}

impl Experiment {
    pub(crate) fn new(protocol_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol_name: protocol_name.to_string(),
            start_time: None,
            end_time: None,
            executed_procedures: Vec::new(),
            datapoints: HashMap::new(),
            is_executing: false,
            was_executed: false,
            critically_failed: false,
        }
    }

    pub(crate) fn begin(&mut self, now: DateTime<Utc>) {
        self.start_time = Some(now);
        self.is_executing = true;
    }

    fn elapsed_seconds(&self, timestamp: DateTime<Utc>) -> f64 {
        self.start_time
            .and_then(|start| (timestamp - start).num_microseconds())
            .map(|us| us as f64 / 1e6)
            .unwrap_or_default()
    }

    pub(crate) fn record_procedure(
        &mut self,
        component: &str,
        params: Params,
        success: bool,
        kind: RecordKind,
    ) {
        let timestamp = Utc::now();
        let experiment_elapsed_time = self.elapsed_seconds(timestamp);
        self.executed_procedures.push(ExecutionRecord {
            timestamp,
            component: component.to_string(),
            params,
            success,
            kind,
            experiment_elapsed_time,
        });
    }

    pub(crate) fn record_datapoint(&mut self, component: &str, data: SensorData) {
        let timestamp = Utc::now();
        let experiment_elapsed_time = self.elapsed_seconds(timestamp);
        self.datapoints
            .entry(component.to_string())
            .or_default()
            .push(Datapoint {
                data,
                timestamp,
                experiment_elapsed_time,
            });
    }

    pub(crate) fn finish(&mut self, now: DateTime<Utc>, critically_failed: bool) {
        self.critically_failed = critically_failed;
        if !critically_failed {
            self.end_time = Some(now);
        }
        self.is_executing = false;
        self.was_executed = true;
    }

    /// Records for one component, in append order.
    pub fn records_for<'a>(
        &'a self,
        component: &'a str,
    ) -> impl Iterator<Item = &'a ExecutionRecord> {
        self.executed_procedures
            .iter()
            .filter(move |record| record.component == component)
    }
}
