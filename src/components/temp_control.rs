//! A temperature controller.

use super::{ActiveComponent, ParamKind, ParamValue, Params};
use crate::error::{FlowError, FlowResult};
use crate::quantity::{Dimension, Quantity};
use std::collections::BTreeMap;
use tracing::debug;

/// Idle setpoint in degrees Celsius, used when a procedure deactivates the
/// controller without naming a temperature.
pub const IDLE_TEMP_C: f64 = 0.0;

const TEMP_SCHEMA: &[(&str, ParamKind)] = &[
    ("active", ParamKind::Bool),
    ("temp", ParamKind::Quantity(Dimension::Temperature)),
];

/// A heater/chiller with a setpoint and an active flag.
pub struct TempControl {
    name: String,
    temp: Quantity,
    active: bool,
}

impl TempControl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            temp: Quantity::new(IDLE_TEMP_C, Dimension::Temperature),
            active: false,
        }
    }

    pub fn temp(&self) -> Quantity {
        self.temp
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fills in the implied half of a partial directive.
    ///
    /// A target temperature implies `active = true`; an explicit
    /// `active = false` without a temperature implies the idle setpoint;
    /// `active = true` without a temperature is an incomplete directive.
    pub fn normalize_params(&self, params: &mut Params) -> FlowResult<()> {
        let temp_given = params.contains_key("temp");
        let active = params.get("active").and_then(ParamValue::as_bool);

        if temp_given && active.is_none() {
            params.insert("active".to_string(), ParamValue::Bool(true));
        } else if active != Some(true) && !temp_given {
            params.insert(
                "temp".to_string(),
                ParamValue::Quantity(Quantity::new(IDLE_TEMP_C, Dimension::Temperature)),
            );
        } else if active == Some(true) && !temp_given {
            return Err(FlowError::IncompleteTempDirective(self.name.clone()));
        }

        Ok(())
    }
}

impl ActiveComponent for TempControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_schema(&self) -> &'static [(&'static str, ParamKind)] {
        TEMP_SCHEMA
    }

    fn base_state(&self) -> Params {
        BTreeMap::from([
            ("active".to_string(), ParamValue::Bool(false)),
            (
                "temp".to_string(),
                ParamValue::Quantity(Quantity::new(IDLE_TEMP_C, Dimension::Temperature)),
            ),
        ])
    }

    fn update_from_params(&mut self, params: &Params) {
        if let Some(temp) = params.get("temp").and_then(ParamValue::as_quantity) {
            self.temp = temp;
        }
        if let Some(active) = params.get("active").and_then(ParamValue::as_bool) {
            self.active = active;
        }
    }

    fn update(&mut self) -> anyhow::Result<bool> {
        debug!(
            controller = %self.name,
            temp = %self.temp,
            active = self.active,
            "temperature setpoint applied"
        );
        Ok(true)
    }

    fn as_temp_control(&self) -> Option<&TempControl> {
        Some(self)
    }
}
