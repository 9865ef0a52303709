//! Sensing capability and a built-in dummy sensor.

use super::{ActiveComponent, ParamKind, ParamValue, Params};
use crate::quantity::{Dimension, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sensing capability. A component exposing this is sampled by the engine's
/// monitoring loop at its current in-memory rate.
pub trait Sensor {
    /// Current sampling rate in Hz. Zero means the sensor is off.
    fn rate_hz(&self) -> f64;

    /// Performs one read against the device.
    fn read(&mut self) -> anyhow::Result<f64>;
}

/// One sampled value in an experiment's datapoint stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorData {
    /// A real reading from the device.
    Reading(f64),
    /// Placeholder emitted during simulated runs, which perform no I/O.
    Simulated,
}

const SENSOR_SCHEMA: &[(&str, ParamKind)] =
    &[("rate", ParamKind::Quantity(Dimension::Frequency))];

/// A sensor returning a deterministic waveform of its read count.
///
/// Not real data; useful for demos and for protocols that are still being
/// drafted against simulated hardware.
pub struct DummySensor {
    name: String,
    rate: Quantity,
    counter: u64,
}

impl DummySensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate: Quantity::new(0.0, Dimension::Frequency),
            counter: 0,
        }
    }
}

impl Sensor for DummySensor {
    fn rate_hz(&self) -> f64 {
        self.rate.base_magnitude()
    }

    fn read(&mut self) -> anyhow::Result<f64> {
        self.counter += 1;
        Ok(self.counter as f64 * (self.counter as f64 * 0.314).sin())
    }
}

impl ActiveComponent for DummySensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_schema(&self) -> &'static [(&'static str, ParamKind)] {
        SENSOR_SCHEMA
    }

    fn base_state(&self) -> Params {
        // Default to being off.
        BTreeMap::from([(
            "rate".to_string(),
            ParamValue::Quantity(Quantity::new(0.0, Dimension::Frequency)),
        )])
    }

    fn update_from_params(&mut self, params: &Params) {
        if let Some(rate) = params.get("rate").and_then(ParamValue::as_quantity) {
            self.rate = rate;
        }
    }

    fn update(&mut self) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn as_sensor(&self) -> Option<&dyn Sensor> {
        Some(self)
    }

    fn as_sensor_mut(&mut self) -> Option<&mut dyn Sensor> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_sensor_reads_advance_the_counter() {
        let mut sensor = DummySensor::new("s");
        let first = sensor.read().unwrap();
        let second = sensor.read().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn rate_follows_in_memory_params() {
        let mut sensor = DummySensor::new("s");
        assert_eq!(sensor.rate_hz(), 0.0);
        let params = BTreeMap::from([(
            "rate".to_string(),
            ParamValue::Quantity(Quantity::new(5.0, Dimension::Frequency)),
        )]);
        sensor.update_from_params(&params);
        assert_eq!(sensor.rate_hz(), 5.0);
    }
}
