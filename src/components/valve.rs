//! A generic multi-port valve.

use super::{ActiveComponent, ParamKind, ParamValue, Params};
use crate::error::{FlowError, FlowResult};
use anyhow::anyhow;
use std::collections::BTreeMap;
use tracing::{debug, trace};

const VALVE_SCHEMA: &[(&str, ParamKind)] = &[("setting", ParamKind::Int)];

/// A valve whose position is selected through a mapping from connected
/// component names to integer port numbers.
pub struct Valve {
    name: String,
    mapping: Option<BTreeMap<String, u32>>,
    setting: u32,
}

impl Valve {
    pub fn new<S, I, K>(name: S, mapping: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            mapping: Some(
                mapping
                    .into_iter()
                    .map(|(component, port)| (component.into(), port))
                    .collect(),
            ),
            setting: 1,
        }
    }

    /// A valve declared without a port mapping. Unusable in a protocol until
    /// a mapping is known; kept so apparatus definition and validation can be
    /// exercised separately.
    pub fn unmapped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mapping: None,
            setting: 1,
        }
    }

    pub fn mapping(&self) -> Option<&BTreeMap<String, u32>> {
        self.mapping.as_ref()
    }

    pub fn setting(&self) -> u32 {
        self.setting
    }

    /// Resolves a user-supplied setting to a port number.
    ///
    /// Precedence: a mapped component's name first, then a literal port
    /// number already present among the mapping's values. Anything else is
    /// an error.
    pub fn resolve_setting(&self, value: &ParamValue) -> FlowResult<u32> {
        let mapping = self.mapping.as_ref().ok_or_else(|| {
            FlowError::Configuration(format!("Valve '{}' does not have a mapping", self.name))
        })?;

        match value {
            ParamValue::Str(target) => {
                let port = mapping.get(target).copied().ok_or_else(|| {
                    FlowError::InvalidValveSetting {
                        valve: self.name.clone(),
                        setting: target.clone(),
                    }
                })?;
                trace!(valve = %self.name, target, port, "resolved setting by component name");
                Ok(port)
            }
            ParamValue::Int(port) => {
                if mapping.values().any(|&p| i64::from(p) == *port) {
                    trace!(valve = %self.name, port, "user supplied a literal port number");
                    Ok(*port as u32)
                } else {
                    Err(FlowError::InvalidValveSetting {
                        valve: self.name.clone(),
                        setting: port.to_string(),
                    })
                }
            }
            other => Err(FlowError::InvalidValveSetting {
                valve: self.name.clone(),
                setting: other.to_string(),
            }),
        }
    }
}

impl ActiveComponent for Valve {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_schema(&self) -> &'static [(&'static str, ParamKind)] {
        VALVE_SCHEMA
    }

    fn base_state(&self) -> Params {
        BTreeMap::from([("setting".to_string(), ParamValue::Int(1))])
    }

    fn validate(&self, _dry_run: bool) -> anyhow::Result<()> {
        // A definition problem, so it fails for dry runs too.
        match &self.mapping {
            Some(mapping) if !mapping.is_empty() => Ok(()),
            _ => Err(anyhow!("valve '{}' requires a mapping", self.name)),
        }
    }

    fn update_from_params(&mut self, params: &Params) {
        if let Some(setting) = params.get("setting").and_then(ParamValue::as_i64) {
            self.setting = setting as u32;
        }
    }

    fn update(&mut self) -> anyhow::Result<bool> {
        debug!(valve = %self.name, setting = self.setting, "valve position applied");
        Ok(true)
    }

    fn as_valve(&self) -> Option<&Valve> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valve() -> Valve {
        Valve::new("v", [("A", 1), ("B", 2)])
    }

    #[test]
    fn resolves_by_name_and_literal_port() {
        let v = valve();
        assert_eq!(v.resolve_setting(&ParamValue::from("A")).unwrap(), 1);
        assert_eq!(v.resolve_setting(&ParamValue::from(1_i64)).unwrap(), 1);
    }

    #[test]
    fn rejects_unknown_settings() {
        let v = valve();
        assert!(matches!(
            v.resolve_setting(&ParamValue::from(3_i64)),
            Err(FlowError::InvalidValveSetting { .. })
        ));
        assert!(matches!(
            v.resolve_setting(&ParamValue::from("C")),
            Err(FlowError::InvalidValveSetting { .. })
        ));
    }

    #[test]
    fn unmapped_valve_fails_validation_even_dry() {
        let v = Valve::unmapped("v");
        assert!(v.validate(true).is_err());
        assert!(v.validate(false).is_err());
    }
}
