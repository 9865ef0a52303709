//! Execution engine.
//!
//! Consumes a compiled timeline and dispatches it as a set of concurrent,
//! independently-timed tokio tasks: one per compiled instruction, plus a
//! monitoring loop and a stop-signal task per sensor. The run suspends on a
//! join-all until every task has finished; suspension points are exactly the
//! "wait until elapsed time reaches T" and "wait until signalled" operations.

mod engine;
mod experiment;

pub use engine::run;
pub use experiment::{Datapoint, ExecutionRecord, Experiment, RecordKind};

use crate::config::Settings;
use crate::error::{FlowError, FlowResult};

/// How a run interacts with hardware and with the clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Real hardware: resources are acquired and updates perform device I/O.
    Live,
    /// No hardware I/O; every update is treated as successful.
    Simulated,
    /// Simulated, with every wait divided by the given factor. Ordering is
    /// unchanged; only wall-clock pacing is.
    SimulatedAtSpeed(u32),
}

impl ExecutionMode {
    pub fn is_live(self) -> bool {
        matches!(self, ExecutionMode::Live)
    }

    /// Global scale factor applied to every wait duration.
    pub fn speed(self) -> f64 {
        match self {
            ExecutionMode::Live | ExecutionMode::Simulated => 1.0,
            ExecutionMode::SimulatedAtSpeed(factor) => f64::from(factor),
        }
    }
}

/// Options for one `execute` call.
#[derive(Clone, Debug)]
pub struct ExecuteOptions {
    pub mode: ExecutionMode,
    /// Escalate any device update failure into a fatal run failure.
    pub strict: bool,
    pub settings: Settings,
}

impl ExecuteOptions {
    pub fn new(mode: ExecutionMode) -> FlowResult<Self> {
        if mode == ExecutionMode::SimulatedAtSpeed(0) {
            return Err(FlowError::Configuration(
                "simulation speed factor must be nonzero".to_string(),
            ));
        }
        Ok(Self {
            mode,
            strict: true,
            settings: Settings::default(),
        })
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Simulated,
            strict: true,
            settings: Settings::default(),
        }
    }
}
