//! Protocol compiler.
//!
//! Turns the unordered procedure list into a per-component, time-ascending,
//! gap-free instruction timeline. After compilation there is no ambiguity
//! left about what any device is doing at any instant: every period not
//! covered by an explicit procedure is bridged by an instruction returning
//! the device to its base state, and every procedure has a resolved stop
//! time. Execution never infers intent at dispatch time.
//!
//! Compilation is a pure, synchronous transformation; it is re-run for every
//! execution so dry-run and live validation can legitimately differ.

use crate::components::{ComponentHandle, Params};
use crate::error::{FlowError, FlowResult};
use crate::protocol::{Procedure, Protocol};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Absolute tolerance, in seconds, for treating two procedure boundaries as
/// the same instant.
pub const TIME_EPSILON: f64 = 1e-9;

pub(crate) fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_EPSILON
}

/// A resolved, unambiguous device command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompiledInstruction {
    /// Seconds of experiment elapsed time at which to apply the parameters.
    pub time: f64,
    pub params: Params,
}

/// One component's ordered instruction sequence.
#[derive(Debug)]
pub struct ComponentTimeline {
    pub component: ComponentHandle,
    pub instructions: Vec<CompiledInstruction>,
}

impl ComponentTimeline {
    /// Elapsed time of the last instruction; the end of this component's
    /// monitoring window.
    pub fn end_time(&self) -> f64 {
        self.instructions
            .iter()
            .map(|instruction| instruction.time)
            .fold(0.0, f64::max)
    }
}

/// The compiled timeline for every component with procedures.
#[derive(Debug)]
pub struct CompiledProtocol {
    pub timelines: Vec<ComponentTimeline>,
}

impl CompiledProtocol {
    pub fn timeline(&self, name: &str) -> Option<&ComponentTimeline> {
        self.timelines
            .iter()
            .find(|timeline| timeline.component.name() == name)
    }

    /// Serializable view keyed by component name, for downstream reporting
    /// and visualization layers.
    pub fn by_name(&self) -> HashMap<String, Vec<CompiledInstruction>> {
        self.timelines
            .iter()
            .map(|timeline| {
                (
                    timeline.component.name().to_string(),
                    timeline.instructions.clone(),
                )
            })
            .collect()
    }
}

pub fn compile(protocol: &Protocol, dry_run: bool) -> FlowResult<CompiledProtocol> {
    let inferred_duration = protocol
        .procedures()
        .iter()
        .filter_map(Procedure::stop)
        .fold(None, |acc: Option<f64>, stop| {
            Some(acc.map_or(stop, |current| current.max(stop)))
        });

    let mut timelines = Vec::new();
    for component in protocol.apparatus().components() {
        let mut procedures: Vec<Procedure> = protocol
            .procedures()
            .iter()
            .filter(|procedure| procedure.component() == component)
            .cloned()
            .collect();

        if procedures.is_empty() {
            warn!(
                component = component.name(),
                "component has no procedures in this protocol; skipping. \
                 If this is intentional, ignore this warning"
            );
            continue;
        }

        let base_state = {
            let comp = component.lock();
            comp.validate(dry_run)
                .map_err(|source| FlowError::InvalidComponent {
                    component: comp.name().to_string(),
                    source,
                })?;

            if let Some(temp_control) = comp.as_temp_control() {
                for procedure in &mut procedures {
                    temp_control.normalize_params(&mut procedure.params)?;
                }
            }
            comp.base_state()
        };

        procedures.sort_by(|a, b| {
            a.start
                .unwrap_or(0.0)
                .total_cmp(&b.start.unwrap_or(0.0))
        });

        let continuous = procedures
            .iter()
            .filter(|procedure| procedure.start.is_none() && procedure.stop.is_none())
            .count();
        if continuous > 1 {
            return Err(FlowError::ConflictingContinuous(
                component.name().to_string(),
            ));
        }

        resolve_stops(component.name(), &mut procedures, inferred_duration)?;

        let mut instructions = Vec::new();
        for (i, procedure) in procedures.iter().enumerate() {
            instructions.push(CompiledInstruction {
                time: procedure.start.unwrap_or(0.0),
                params: procedure.params.clone(),
            });

            // All stops are resolved by now.
            let Some(stop) = procedure.stop else { continue };

            // If the next procedure begins right as this one ends, the
            // device never idles in between; no bridging instruction.
            let adjacent = procedures
                .get(i + 1)
                .is_some_and(|next| approx_eq(next.start.unwrap_or(0.0), stop));
            if !adjacent {
                instructions.push(CompiledInstruction {
                    time: stop,
                    params: base_state.clone(),
                });
            }
        }

        timelines.push(ComponentTimeline {
            component: component.clone(),
            instructions,
        });
    }

    Ok(CompiledProtocol { timelines })
}

/// Infers missing stop times and rejects overlaps, in start order.
fn resolve_stops(
    component: &str,
    procedures: &mut [Procedure],
    inferred_duration: Option<f64>,
) -> FlowResult<()> {
    for i in 0..procedures.len() {
        let next_start = procedures
            .get(i + 1)
            .map(|next| next.start.unwrap_or(0.0));

        match (procedures[i].stop, next_start) {
            (Some(stop), Some(next_start)) => {
                if next_start < stop && !approx_eq(next_start, stop) {
                    return Err(FlowError::OverlappingProcedures {
                        component: component.to_string(),
                        first_start: procedures[i].start.unwrap_or(0.0),
                        first_stop: stop,
                        second_start: next_start,
                    });
                }
            }
            (None, Some(next_start)) => {
                // Inferring "stop when the next one starts" from a procedure
                // that also starts at zero would compile to a zero-length
                // instruction; the author needs to disambiguate.
                if next_start == 0.0 {
                    return Err(FlowError::AmbiguousStart(component.to_string()));
                }
                warn!(
                    component,
                    stop = next_start,
                    "inferring stop time as the beginning of the component's next procedure"
                );
                procedures[i].stop = Some(next_start);
            }
            (None, None) => {
                let duration = inferred_duration.ok_or(FlowError::UndecidableDuration)?;
                // An inferred stop must still lie after the procedure's own
                // start, or the timeline would run backwards.
                let start = procedures[i].start.unwrap_or(0.0);
                if duration < start || approx_eq(duration, start) {
                    return Err(FlowError::StartAfterStop(component.to_string()));
                }
                warn!(
                    component,
                    stop = duration,
                    "inferring stop time as the end of the protocol; \
                     provide stop to override"
                );
                procedures[i].stop = Some(duration);
            }
            (Some(_), None) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_eq_uses_absolute_epsilon() {
        assert!(approx_eq(5.0, 5.0 + 1e-12));
        assert!(approx_eq(5.0, 5.0 - 1e-12));
        assert!(!approx_eq(5.0, 5.0 + 1e-6));
    }
}
