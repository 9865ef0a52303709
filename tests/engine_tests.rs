//! Execution engine behavior under virtual time.
//!
//! Most tests run with a paused clock, so multi-second protocols resolve
//! instantly and dispatch ordering is deterministic. The one pacing test
//! that must observe the wall clock runs unpaused.

use flowlab::components::{MockDevice, MockProbe, MockSensor};
use flowlab::{
    Apparatus, ComponentHandle, DummySensor, ExecuteOptions, ExecutionMode, FlowError, ParamValue,
    Params, ProcedureSpec, Protocol, Pump, RecordKind, SensorData,
};

fn levels(updates: &[Params]) -> Vec<i64> {
    updates
        .iter()
        .filter_map(|params| params.get("level").and_then(ParamValue::as_i64))
        .collect()
}

fn mock_protocol(device: MockDevice) -> (Protocol, MockProbe) {
    let probe = device.probe();
    let handle = ComponentHandle::new(device);
    let mut apparatus = Apparatus::new("rig");
    apparatus.add(handle.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &handle,
            ProcedureSpec::new().stop("5 s").param("level", 1_i64),
        )
        .unwrap();
    protocol
        .add(
            &handle,
            ProcedureSpec::new()
                .start("5 s")
                .stop("10 s")
                .param("level", 2_i64),
        )
        .unwrap();
    (protocol, probe)
}

#[tokio::test(start_paused = true)]
async fn live_dispatch_follows_the_timeline() {
    let device = MockDevice::new("m");
    let probe = device.probe();
    let other = MockDevice::new("other");
    let handle = ComponentHandle::new(device);
    let other_handle = ComponentHandle::new(other);

    let mut apparatus = Apparatus::new("rig");
    apparatus.add(handle.clone()).unwrap();
    apparatus.add(other_handle.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &handle,
            ProcedureSpec::new().stop("5 s").param("level", 1_i64),
        )
        .unwrap();
    protocol
        .add(
            &handle,
            ProcedureSpec::new()
                .start("5 s")
                .stop("10 s")
                .param("level", 2_i64),
        )
        .unwrap();
    // A second component on an interleaved schedule must not perturb the
    // first one's update order.
    protocol
        .add(
            &other_handle,
            ProcedureSpec::new()
                .start("2.5 s")
                .stop("7.5 s")
                .param("level", 9_i64),
        )
        .unwrap();

    let options = ExecuteOptions::new(ExecutionMode::Live).unwrap();
    let experiment = protocol.execute(options).await.unwrap();

    assert_eq!(levels(&probe.updates()), vec![1, 2, 0]);

    let records: Vec<_> = experiment.records_for("m").collect();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|record| record.success));
    assert!(records
        .iter()
        .all(|record| record.kind == RecordKind::Executed));
    assert!(records
        .windows(2)
        .all(|pair| pair[0].experiment_elapsed_time <= pair[1].experiment_elapsed_time));
    assert!(!experiment.critically_failed);
    assert!(experiment.end_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn strict_failure_marks_the_run_critical() {
    let (protocol, probe) = mock_protocol(MockDevice::failing_after("m", 1));
    let options = ExecuteOptions::new(ExecutionMode::Live).unwrap();
    let experiment = protocol.execute(options).await.unwrap();

    // Already-started siblings drain to completion; every instruction is
    // still dispatched and recorded.
    assert_eq!(probe.update_count(), 3);
    let records: Vec<_> = experiment.records_for("m").collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|record| !record.success).count(), 2);

    assert!(experiment.critically_failed);
    assert!(experiment.end_time.is_none());
    assert!(experiment.was_executed);
    assert!(!experiment.is_executing);
}

#[tokio::test(start_paused = true)]
async fn non_strict_failures_stay_non_critical() {
    let (protocol, _probe) = mock_protocol(MockDevice::failing_after("m", 1));
    let options = ExecuteOptions::new(ExecutionMode::Live)
        .unwrap()
        .strict(false);
    let experiment = protocol.execute(options).await.unwrap();

    assert!(!experiment.critically_failed);
    assert!(experiment.end_time.is_some());
    assert_eq!(
        experiment
            .records_for("m")
            .filter(|record| !record.success)
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn simulated_runs_touch_no_hardware() {
    let (protocol, probe) = mock_protocol(MockDevice::new("m"));
    let experiment = protocol.execute(ExecuteOptions::default()).await.unwrap();

    assert_eq!(probe.update_count(), 0);
    assert_eq!(probe.acquire_count(), 0);
    let records: Vec<_> = experiment.records_for("m").collect();
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .all(|record| record.kind == RecordKind::Simulated && record.success));
}

#[tokio::test(start_paused = true)]
async fn simulated_monitoring_emits_placeholder_datapoints() {
    let sensor = ComponentHandle::new(DummySensor::new("uv"));
    let mut apparatus = Apparatus::new("rig");
    apparatus.add(sensor.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &sensor,
            ProcedureSpec::new().stop("2 s").param("rate", "5 Hz"),
        )
        .unwrap();

    let experiment = protocol.execute(ExecuteOptions::default()).await.unwrap();
    let datapoints = experiment.datapoints.get("uv").unwrap();
    assert!(datapoints.len() >= 5, "got {} datapoints", datapoints.len());
    assert!(datapoints
        .iter()
        .all(|datapoint| datapoint.data == SensorData::Simulated));
}

#[tokio::test(start_paused = true)]
async fn live_monitoring_records_real_readings() {
    let sensor = ComponentHandle::new(MockSensor::new("s"));
    let mut apparatus = Apparatus::new("rig");
    apparatus.add(sensor.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &sensor,
            ProcedureSpec::new().stop("1 s").param("rate", "10 Hz"),
        )
        .unwrap();

    let options = ExecuteOptions::new(ExecutionMode::Live).unwrap();
    let experiment = protocol.execute(options).await.unwrap();

    let datapoints = experiment.datapoints.get("s").unwrap();
    assert!(datapoints.len() >= 5);
    let values: Vec<f64> = datapoints
        .iter()
        .map(|datapoint| match datapoint.data {
            SensorData::Reading(value) => value,
            SensorData::Simulated => panic!("live run produced a simulated datapoint"),
        })
        .collect();
    assert_eq!(values[0], 1.0);
    assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(start_paused = true)]
async fn sensor_read_failure_stops_only_its_monitor() {
    let sensor = ComponentHandle::new(MockSensor::failing_after("s", 2));
    let device = MockDevice::new("m");
    let probe = device.probe();
    let device = ComponentHandle::new(device);

    let mut apparatus = Apparatus::new("rig");
    apparatus.add(sensor.clone()).unwrap();
    apparatus.add(device.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &sensor,
            ProcedureSpec::new().stop("2 s").param("rate", "5 Hz"),
        )
        .unwrap();
    protocol
        .add(
            &device,
            ProcedureSpec::new().stop("2 s").param("level", 1_i64),
        )
        .unwrap();

    let options = ExecuteOptions::new(ExecutionMode::Live).unwrap();
    let experiment = protocol.execute(options).await.unwrap();

    // Two good reads landed before the monitor shut itself down.
    assert_eq!(experiment.datapoints.get("s").unwrap().len(), 2);

    // The rest of the run never noticed.
    assert_eq!(levels(&probe.updates()), vec![1, 0]);
    assert!(!experiment.critically_failed);
    assert!(experiment.end_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn zero_rate_sensor_still_terminates() {
    let sensor = ComponentHandle::new(DummySensor::new("uv"));
    let mut apparatus = Apparatus::new("rig");
    apparatus.add(sensor.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &sensor,
            ProcedureSpec::new().stop("1 s").param("rate", "0 Hz"),
        )
        .unwrap();

    let experiment = protocol.execute(ExecuteOptions::default()).await.unwrap();
    assert!(experiment.datapoints.get("uv").is_none());
    assert!(experiment.was_executed);
}

#[tokio::test(start_paused = true)]
async fn reruns_produce_fresh_experiments() {
    let sensor = ComponentHandle::new(DummySensor::new("uv"));
    let pump = ComponentHandle::new(Pump::new("pump"));
    let mut apparatus = Apparatus::new("rig");
    apparatus.add(sensor.clone()).unwrap();
    apparatus.add(pump.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &sensor,
            ProcedureSpec::new().stop("1 s").param("rate", "5 Hz"),
        )
        .unwrap();
    protocol
        .add(
            &pump,
            ProcedureSpec::new().stop("1 s").param("rate", "5 mL/min"),
        )
        .unwrap();

    let first = protocol.execute(ExecuteOptions::default()).await.unwrap();
    let second = protocol.execute(ExecuteOptions::default()).await.unwrap();

    assert_ne!(first.id, second.id);
    assert!(first.was_executed && second.was_executed);
    assert_eq!(
        first.executed_procedures.len(),
        second.executed_procedures.len()
    );
    // Monitoring restarted cleanly on the second run.
    assert!(!second.datapoints.get("uv").unwrap().is_empty());
}

#[tokio::test]
async fn accelerated_simulation_compresses_wall_time() {
    let pump = ComponentHandle::new(Pump::new("pump"));
    let mut apparatus = Apparatus::new("rig");
    apparatus.add(pump.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(
            &pump,
            ProcedureSpec::new()
                .stop("0.5 s")
                .param("rate", "5 mL/min"),
        )
        .unwrap();

    let options = ExecuteOptions::new(ExecutionMode::SimulatedAtSpeed(10)).unwrap();
    let started = std::time::Instant::now();
    let experiment = protocol.execute(options).await.unwrap();
    let elapsed = started.elapsed();

    // 0.5 s of protocol time at 10x should finish well under real time.
    assert!(elapsed < std::time::Duration::from_millis(400), "{elapsed:?}");
    assert_eq!(experiment.records_for("pump").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_speed_factor_is_rejected() {
    assert!(matches!(
        ExecuteOptions::new(ExecutionMode::SimulatedAtSpeed(0)),
        Err(FlowError::Configuration(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn acquisition_failure_rolls_back_and_aborts() {
    let good = MockDevice::new("a");
    let good_probe = good.probe();
    let bad = MockDevice::new("b").with_failing_acquire();
    let bad_probe = bad.probe();
    let good = ComponentHandle::new(good);
    let bad = ComponentHandle::new(bad);

    let mut apparatus = Apparatus::new("rig");
    apparatus.add(good.clone()).unwrap();
    apparatus.add(bad.clone()).unwrap();
    let mut protocol = Protocol::new("p", apparatus);
    protocol
        .add(&good, ProcedureSpec::new().stop("5 s").param("level", 1_i64))
        .unwrap();
    protocol
        .add(&bad, ProcedureSpec::new().stop("5 s").param("level", 1_i64))
        .unwrap();

    let options = ExecuteOptions::new(ExecutionMode::Live).unwrap();
    let err = protocol.execute(options).await.unwrap_err();
    match err {
        FlowError::Acquisition { component, .. } => assert_eq!(component, "b"),
        other => panic!("expected an acquisition error, got {other:?}"),
    }

    // The handle opened before the failure was closed again; nothing was
    // dispatched.
    assert_eq!(good_probe.acquire_count(), 1);
    assert_eq!(good_probe.release_count(), 1);
    assert_eq!(bad_probe.acquire_count(), 0);
    assert_eq!(good_probe.update_count(), 0);
}
