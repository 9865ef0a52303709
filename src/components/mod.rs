//! Component model and capability contract.
//!
//! Every controllable device implements [`ActiveComponent`]: a typed
//! parameter schema, an idle base state for gap bridging, an in-memory
//! parameter update, a hardware update reporting success, and scoped
//! acquisition of its hardware handle for live runs. Capability accessors
//! (`as_valve`, `as_temp_control`, `as_sensor`) replace runtime
//! introspection: callers check for a capability before invoking it, never
//! by catching an error from an unimplemented operation.
//!
//! Components are shared between the protocol author, the compiler and the
//! concurrently running engine tasks through [`ComponentHandle`], an
//! `Arc<Mutex<..>>` wrapper. The mutex is a `parking_lot` lock held only
//! across synchronous critical sections; engine tasks never hold it across
//! an await point.

pub mod mock;
pub mod pump;
pub mod sensor;
pub mod temp_control;
pub mod valve;

pub use mock::{MockDevice, MockProbe, MockSensor};
pub use pump::Pump;
pub use sensor::{DummySensor, Sensor, SensorData};
pub use temp_control::TempControl;
pub use valve::Valve;

use crate::quantity::{Dimension, Quantity};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Parameter set applied to a component at one instant.
pub type Params = BTreeMap<String, ParamValue>;

/// Strongly-typed parameter value for component state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Quantity(Quantity),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            ParamValue::Quantity(q) => Some(*q),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(fl) => write!(f, "{}", fl),
            ParamValue::Str(s) => write!(f, "{}", s),
            ParamValue::Quantity(q) => write!(f, "{}", q),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<Quantity> for ParamValue {
    fn from(value: Quantity) -> Self {
        ParamValue::Quantity(value)
    }
}

/// Expected shape of one schema entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Quantity(Dimension),
}

/// Capability contract for a controllable device.
pub trait ActiveComponent: Send {
    fn name(&self) -> &str;

    /// Enumerated parameter schema: `(name, expected kind)` pairs. Procedure
    /// parameters are validated against this before compilation.
    fn param_schema(&self) -> &'static [(&'static str, ParamKind)];

    /// Idle configuration, used to bridge gaps between procedures.
    fn base_state(&self) -> Params;

    /// Device-specific readiness and definition check. Definition problems
    /// should fail in every mode; hardware-readiness problems only when
    /// `dry_run` is false.
    fn validate(&self, dry_run: bool) -> anyhow::Result<()> {
        let _ = dry_run;
        Ok(())
    }

    /// Sets in-memory parameters without touching hardware.
    fn update_from_params(&mut self, params: &Params);

    /// Applies the in-memory parameters to physical hardware, returning
    /// whether the device reported success.
    fn update(&mut self) -> anyhow::Result<bool>;

    /// Opens the underlying hardware handle before a live run.
    fn acquire(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases the hardware handle after the run, on every exit path.
    fn release(&mut self) {}

    fn as_valve(&self) -> Option<&Valve> {
        None
    }

    fn as_temp_control(&self) -> Option<&TempControl> {
        None
    }

    fn as_sensor(&self) -> Option<&dyn Sensor> {
        None
    }

    fn as_sensor_mut(&mut self) -> Option<&mut dyn Sensor> {
        None
    }
}

/// Shared, lockable handle to a component.
///
/// Cloning the handle shares the same underlying device; equality is
/// identity, not name equality.
#[derive(Clone)]
pub struct ComponentHandle {
    name: String,
    inner: Arc<Mutex<Box<dyn ActiveComponent>>>,
}

impl ComponentHandle {
    pub fn new<C: ActiveComponent + 'static>(component: C) -> Self {
        let name = component.name().to_string();
        Self {
            name,
            inner: Arc::new(Mutex::new(Box::new(component))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locks the component. Callers must not hold the guard across an await.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn ActiveComponent>> {
        self.inner.lock()
    }
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ComponentHandle {}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentHandle({})", self.name)
    }
}
