//! Core library for flowlab.
//!
//! Describes continuous-flow laboratory procedures as time-stamped
//! instructions for physical devices and executes them against real or
//! simulated hardware. Two subsystems carry the weight: the protocol
//! [`compiler`], a pure transformation from user-declared procedures to a
//! deterministic, gap-free, per-device instruction timeline; and the
//! [`execution`] engine, which dispatches that timeline as concurrent,
//! independently-timed tokio tasks, samples sensors, and aggregates results
//! into an [`execution::Experiment`] record despite partial failures.
//!
//! Typical flow: build an [`Apparatus`], declare procedures on a
//! [`Protocol`], then compile or execute it.
//!
//! ```
//! use flowlab::{Apparatus, ComponentHandle, ExecuteOptions, ProcedureSpec, Protocol, Pump};
//!
//! let pump = ComponentHandle::new(Pump::new("pump"));
//! let mut apparatus = Apparatus::new("rig");
//! apparatus.add(pump.clone()).unwrap();
//!
//! let mut protocol = Protocol::new("demo", apparatus);
//! protocol
//!     .add(
//!         &pump,
//!         ProcedureSpec::new().stop("0.1 s").param("rate", "5 mL/min"),
//!     )
//!     .unwrap();
//!
//! let experiment = tokio_test::block_on(protocol.execute(ExecuteOptions::default())).unwrap();
//! assert!(experiment.was_executed);
//! assert_eq!(experiment.executed_procedures.len(), 2);
//! ```

pub mod apparatus;
pub mod compiler;
pub mod components;
pub mod config;
pub mod error;
pub mod execution;
pub mod protocol;
pub mod quantity;

pub use apparatus::Apparatus;
pub use compiler::{CompiledInstruction, CompiledProtocol, ComponentTimeline, TIME_EPSILON};
pub use components::{
    ActiveComponent, ComponentHandle, DummySensor, ParamKind, ParamValue, Params, Pump, Sensor,
    SensorData, TempControl, Valve,
};
pub use config::Settings;
pub use error::{FlowError, FlowResult};
pub use execution::{
    Datapoint, ExecuteOptions, ExecutionMode, ExecutionRecord, Experiment, RecordKind,
};
pub use protocol::{Procedure, ProcedureSpec, Protocol};
pub use quantity::{Dimension, Quantity, QuantityError};
