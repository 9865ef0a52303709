//! Procedure store and authoring-time validation.
//!
//! A protocol is an append-only list of procedures: "set component X to
//! parameters P between start and stop". Everything that can be rejected
//! synchronously is rejected here, before compilation: unknown components,
//! empty parameter sets, schema and dimensionality mismatches, unreachable
//! valve settings, and inconsistent time bounds. Timing ambiguity that spans
//! multiple procedures (overlap, duration inference) is the compiler's job.

use crate::apparatus::Apparatus;
use crate::compiler::{self, CompiledProtocol};
use crate::components::{ComponentHandle, ParamKind, ParamValue, Params};
use crate::error::{FlowError, FlowResult};
use crate::execution::{self, ExecuteOptions, Experiment};
use crate::quantity::{Dimension, Quantity};
use std::collections::BTreeMap;
use tracing::debug;

/// One user-declared directive, normalized to base-unit seconds.
///
/// `start == None` means the caller did not bound the procedure's beginning;
/// it sorts and dispatches as time zero, but the distinction matters when
/// the compiler checks for conflicting whole-duration procedures.
#[derive(Clone, Debug)]
pub struct Procedure {
    pub(crate) component: ComponentHandle,
    pub(crate) start: Option<f64>,
    pub(crate) stop: Option<f64>,
    pub(crate) params: Params,
}

impl Procedure {
    pub fn component(&self) -> &ComponentHandle {
        &self.component
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn stop(&self) -> Option<f64> {
        self.stop
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// Builder for the arguments of [`Protocol::add`].
#[derive(Clone, Debug, Default)]
pub struct ProcedureSpec {
    start: Option<String>,
    stop: Option<String>,
    duration: Option<String>,
    params: Vec<(String, ParamValue)>,
}

impl ProcedureSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start time relative to the protocol start, e.g. `"5 seconds"`.
    /// Defaults to the beginning of the protocol.
    pub fn start(mut self, expression: impl Into<String>) -> Self {
        self.start = Some(expression.into());
        self
    }

    /// Stop time relative to the protocol start. Mutually exclusive with
    /// `duration`.
    pub fn stop(mut self, expression: impl Into<String>) -> Self {
        self.stop = Some(expression.into());
        self
    }

    /// Length of the procedure, e.g. `"1 min"`. Mutually exclusive with
    /// `stop`.
    pub fn duration(mut self, expression: impl Into<String>) -> Self {
        self.duration = Some(expression.into());
        self
    }

    /// A device parameter for this procedure's time window.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

/// A set of procedures for an apparatus.
pub struct Protocol {
    name: String,
    apparatus: Apparatus,
    procedures: Vec<Procedure>,
}

impl Protocol {
    pub fn new(name: impl Into<String>, apparatus: Apparatus) -> Self {
        Self {
            name: name.into(),
            apparatus,
            procedures: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apparatus(&self) -> &Apparatus {
        &self.apparatus
    }

    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    /// Appends a procedure after validating it against the component.
    pub fn add(&mut self, component: &ComponentHandle, spec: ProcedureSpec) -> FlowResult<()> {
        if !self.apparatus.contains(component) {
            return Err(FlowError::UnknownComponent(component.name().to_string()));
        }
        if spec.params.is_empty() {
            return Err(FlowError::EmptyProcedure(component.name().to_string()));
        }

        let mut raw = spec.params;
        let mut params: Params = BTreeMap::new();
        {
            let comp = component.lock();

            // Symbolic valve settings resolve to port numbers before the
            // schema sees them.
            if let Some(valve) = comp.as_valve() {
                for (name, value) in raw.iter_mut() {
                    if name == "setting" {
                        *value = ParamValue::Int(i64::from(valve.resolve_setting(value)?));
                    }
                }
            }

            let schema = comp.param_schema();
            for (name, value) in raw {
                let kind = schema
                    .iter()
                    .find(|(entry, _)| *entry == name)
                    .map(|(_, kind)| *kind)
                    .ok_or_else(|| FlowError::InvalidParameter {
                        component: comp.name().to_string(),
                        parameter: name.clone(),
                        reason: format!(
                            "valid parameters are {:?}",
                            schema.iter().map(|(entry, _)| *entry).collect::<Vec<_>>()
                        ),
                    })?;
                let value = coerce_param(comp.name(), &name, value, kind)?;
                params.insert(name, value);
            }
        }

        if spec.stop.is_some() && spec.duration.is_some() {
            return Err(FlowError::StopAndDuration);
        }

        let start = spec
            .start
            .as_deref()
            .map(parse_seconds)
            .transpose()?;
        let stop = if let Some(expression) = spec.stop.as_deref() {
            Some(parse_seconds(expression)?)
        } else if let Some(expression) = spec.duration.as_deref() {
            Some(start.unwrap_or(0.0) + parse_seconds(expression)?)
        } else {
            None
        };

        // Zero-length spans are rejected too: they compile to two
        // instructions at the same instant, whose dispatch order is a race.
        if let Some(stop) = stop {
            if start.unwrap_or(0.0) >= stop {
                return Err(FlowError::StartAfterStop(component.name().to_string()));
            }
        }

        debug!(
            component = component.name(),
            ?start,
            ?stop,
            "procedure added"
        );
        self.procedures.push(Procedure {
            component: component.clone(),
            start,
            stop,
            params,
        });
        Ok(())
    }

    /// Compiles the procedures into a per-component instruction timeline.
    pub fn compile(&self, dry_run: bool) -> FlowResult<CompiledProtocol> {
        compiler::compile(self, dry_run)
    }

    /// Recompiles and executes the protocol, producing a fresh experiment.
    pub async fn execute(&self, options: ExecuteOptions) -> FlowResult<Experiment> {
        execution::run(self, options).await
    }
}

/// Parses a time expression into base-unit seconds. A bare number is taken
/// as seconds.
fn parse_seconds(expression: &str) -> FlowResult<f64> {
    let quantity = Quantity::parse(expression)?;
    match quantity.dimension() {
        Dimension::Time | Dimension::Dimensionless => Ok(quantity.base_magnitude()),
        actual => Err(FlowError::ExpectedTime {
            expression: expression.to_string(),
            actual,
        }),
    }
}

fn coerce_param(
    component: &str,
    parameter: &str,
    value: ParamValue,
    kind: ParamKind,
) -> FlowResult<ParamValue> {
    let mismatch = |reason: String| FlowError::InvalidParameter {
        component: component.to_string(),
        parameter: parameter.to_string(),
        reason,
    };

    match kind {
        ParamKind::Bool => match value {
            ParamValue::Bool(_) => Ok(value),
            other => Err(mismatch(format!("expected a boolean, got '{}'", other))),
        },
        ParamKind::Int => match value {
            ParamValue::Int(_) => Ok(value),
            other => Err(mismatch(format!("expected an integer, got '{}'", other))),
        },
        ParamKind::Quantity(expected) => {
            let quantity = match value {
                ParamValue::Quantity(q) => q,
                ParamValue::Str(ref expression) => Quantity::parse(expression)?,
                other => {
                    return Err(mismatch(format!(
                        "expected a quantity such as \"5 {}\", got '{}'",
                        expected.base_unit(),
                        other
                    )))
                }
            };
            if quantity.dimension() != expected {
                return Err(FlowError::DimensionalityMismatch {
                    component: component.to_string(),
                    parameter: parameter.to_string(),
                    expected,
                    actual: quantity.dimension(),
                });
            }
            Ok(ParamValue::Quantity(quantity))
        }
    }
}
