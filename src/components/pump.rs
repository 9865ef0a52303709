//! A generic continuous-flow pump.

use super::{ActiveComponent, ParamKind, ParamValue, Params};
use crate::quantity::{Dimension, Quantity};
use std::collections::BTreeMap;
use tracing::debug;

const PUMP_SCHEMA: &[(&str, ParamKind)] = &[(
    "rate",
    ParamKind::Quantity(Dimension::VolumetricFlowRate),
)];

/// A pump with a single controllable flow rate. Idles at zero flow.
pub struct Pump {
    name: String,
    rate: Quantity,
}

impl Pump {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate: Quantity::new(0.0, Dimension::VolumetricFlowRate),
        }
    }

    /// Current in-memory flow rate.
    pub fn rate(&self) -> Quantity {
        self.rate
    }
}

impl ActiveComponent for Pump {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_schema(&self) -> &'static [(&'static str, ParamKind)] {
        PUMP_SCHEMA
    }

    fn base_state(&self) -> Params {
        BTreeMap::from([(
            "rate".to_string(),
            ParamValue::Quantity(Quantity::new(0.0, Dimension::VolumetricFlowRate)),
        )])
    }

    fn update_from_params(&mut self, params: &Params) {
        if let Some(rate) = params.get("rate").and_then(ParamValue::as_quantity) {
            self.rate = rate;
        }
    }

    fn update(&mut self) -> anyhow::Result<bool> {
        debug!(pump = %self.name, rate = %self.rate, "pump rate applied");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_from_params_sets_rate() {
        let mut pump = Pump::new("p");
        let params = BTreeMap::from([(
            "rate".to_string(),
            ParamValue::Quantity(Quantity::new(5.0, Dimension::VolumetricFlowRate)),
        )]);
        pump.update_from_params(&params);
        assert_eq!(pump.rate().base_magnitude(), 5.0);
    }

    #[test]
    fn base_state_is_zero_flow() {
        let pump = Pump::new("p");
        let base = pump.base_state();
        let rate = base.get("rate").and_then(ParamValue::as_quantity).unwrap();
        assert_eq!(rate.base_magnitude(), 0.0);
    }
}
