//! Mock devices for tests and wiring checks.
//!
//! `MockDevice` stands in for any updatable component: it records every
//! hardware update it receives and can be scripted to start failing after a
//! given number of updates, to refuse acquisition, or to fail validation.
//! Because the device itself is moved into a
//! [`ComponentHandle`](crate::components::ComponentHandle), observers take a
//! [`MockProbe`] first; the probe shares the device's counters and update
//! log.

use super::{ActiveComponent, ParamKind, ParamValue, Params, Sensor};
use crate::quantity::{Dimension, Quantity};
use anyhow::anyhow;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MOCK_SCHEMA: &[(&str, ParamKind)] = &[("level", ParamKind::Int)];

/// Shared observer for a [`MockDevice`] after it has been handed to the
/// apparatus.
#[derive(Clone, Default)]
pub struct MockProbe {
    updates: Arc<Mutex<Vec<Params>>>,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockProbe {
    /// Parameter sets the device held at each hardware update, in call order.
    pub fn updates(&self) -> Vec<Params> {
        self.updates.lock().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// A scriptable device with a single integer `level` parameter.
pub struct MockDevice {
    name: String,
    state: Params,
    probe: MockProbe,
    fail_after_updates: Option<usize>,
    fail_acquire: bool,
    fail_validate: bool,
}

impl MockDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: BTreeMap::from([("level".to_string(), ParamValue::Int(0))]),
            probe: MockProbe::default(),
            fail_after_updates: None,
            fail_acquire: false,
            fail_validate: false,
        }
    }

    /// The first `n` hardware updates succeed; every later one reports
    /// failure.
    pub fn failing_after(name: impl Into<String>, n: usize) -> Self {
        let mut device = Self::new(name);
        device.fail_after_updates = Some(n);
        device
    }

    /// Refuses hardware acquisition, as an unplugged device would.
    pub fn with_failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// Fails `validate` in every mode.
    pub fn with_failing_validate(mut self) -> Self {
        self.fail_validate = true;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl ActiveComponent for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_schema(&self) -> &'static [(&'static str, ParamKind)] {
        MOCK_SCHEMA
    }

    fn base_state(&self) -> Params {
        BTreeMap::from([("level".to_string(), ParamValue::Int(0))])
    }

    fn validate(&self, _dry_run: bool) -> anyhow::Result<()> {
        if self.fail_validate {
            Err(anyhow!("mock device '{}' is scripted to be invalid", self.name))
        } else {
            Ok(())
        }
    }

    fn update_from_params(&mut self, params: &Params) {
        for (key, value) in params {
            self.state.insert(key.clone(), value.clone());
        }
    }

    fn update(&mut self) -> anyhow::Result<bool> {
        let mut updates = self.probe.updates.lock();
        updates.push(self.state.clone());
        let seen = updates.len();
        Ok(self.fail_after_updates.map_or(true, |n| seen <= n))
    }

    fn acquire(&mut self) -> anyhow::Result<()> {
        if self.fail_acquire {
            return Err(anyhow!("no hardware handle for '{}'", self.name));
        }
        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A sensor whose reads return their own count and can be scripted to fail.
pub struct MockSensor {
    name: String,
    rate: Quantity,
    reads: usize,
    fail_after_reads: Option<usize>,
}

impl MockSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate: Quantity::new(0.0, Dimension::Frequency),
            reads: 0,
            fail_after_reads: None,
        }
    }

    /// The first `n` reads succeed; every later one raises.
    pub fn failing_after(name: impl Into<String>, n: usize) -> Self {
        let mut sensor = Self::new(name);
        sensor.fail_after_reads = Some(n);
        sensor
    }
}

impl Sensor for MockSensor {
    fn rate_hz(&self) -> f64 {
        self.rate.base_magnitude()
    }

    fn read(&mut self) -> anyhow::Result<f64> {
        self.reads += 1;
        if self.fail_after_reads.is_some_and(|n| self.reads > n) {
            return Err(anyhow!("mock sensor '{}' read failed", self.name));
        }
        Ok(self.reads as f64)
    }
}

impl ActiveComponent for MockSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_schema(&self) -> &'static [(&'static str, ParamKind)] {
        &[("rate", ParamKind::Quantity(Dimension::Frequency))]
    }

    fn base_state(&self) -> Params {
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
    fn scripted_failure_starts_after_threshold() {
        let mut device = MockDevice::failing_after("m", 1);
        assert!(device.update().unwrap());
        assert!(!device.update().unwrap());
        assert_eq!(device.probe().update_count(), 2);
    }

    #[test]
    fn probe_observes_acquire_and_release() {
        let mut device = MockDevice::new("m");
        let probe = device.probe();
        device.acquire().unwrap();
        device.release();
        assert_eq!(probe.acquire_count(), 1);
        assert_eq!(probe.release_count(), 1);
    }

    #[test]
    fn mock_sensor_read_failure() {
        let mut sensor = MockSensor::failing_after("s", 2);
        assert!(sensor.read().is_ok());
        assert!(sensor.read().is_ok());
        assert!(sensor.read().is_err());
    }
}
