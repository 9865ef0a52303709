//! Task scheduling and dispatch for one execution run.

use super::experiment::{Experiment, RecordKind};
use super::{ExecuteOptions, ExecutionMode};
use crate::compiler::CompiledInstruction;
use crate::components::{ComponentHandle, SensorData};
use crate::error::{FlowError, FlowResult};
use crate::protocol::Protocol;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info};

type SharedExperiment = Arc<Mutex<Experiment>>;

/// A device update failed under strict mode.
struct StrictFailure {
    component: String,
}

type TaskResult = Result<(), StrictFailure>;

/// Runs a protocol to completion and returns its experiment record.
///
/// The timeline is recompiled from the procedure store on every call, so
/// dry-run and live compilations can differ in validation strictness, and
/// each call produces a fresh [`Experiment`].
pub async fn run(protocol: &Protocol, options: ExecuteOptions) -> FlowResult<Experiment> {
    let mode = options.mode;
    if mode == ExecutionMode::SimulatedAtSpeed(0) {
        return Err(FlowError::Configuration(
            "simulation speed factor must be nonzero".to_string(),
        ));
    }
    let compiled = protocol.compile(!mode.is_live())?;

    // Live runs open every hardware handle before any task starts; a single
    // refusal rolls back the handles already opened and aborts with nothing
    // dispatched.
    let mut acquired: Vec<ComponentHandle> = Vec::new();
    if mode.is_live() {
        for timeline in &compiled.timelines {
            let result = timeline.component.lock().acquire();
            if let Err(source) = result {
                for handle in &acquired {
                    handle.lock().release();
                }
                return Err(FlowError::Acquisition {
                    component: timeline.component.name().to_string(),
                    source,
                });
            }
            acquired.push(timeline.component.clone());
        }
    }

    let experiment: SharedExperiment = Arc::new(Mutex::new(Experiment::new(protocol.name())));
    let epoch = Instant::now();
    {
        let mut exp = experiment.lock();
        exp.begin(chrono::Utc::now());
        info!(
            experiment = %exp.id,
            protocol = protocol.name(),
            ?mode,
            strict = options.strict,
            "experiment started"
        );
    }
    if let ExecutionMode::SimulatedAtSpeed(factor) = mode {
        info!(factor, "simulating at {factor}x speed");
    }

    let speed = mode.speed();
    let idle_poll = Duration::from_millis(options.settings.idle_poll_interval_ms);
    let mut tasks: Vec<JoinHandle<TaskResult>> = Vec::new();

    for timeline in &compiled.timelines {
        let end_time = timeline.end_time();
        debug!(
            component = timeline.component.name(),
            end_time, "component monitoring window computed"
        );

        for instruction in &timeline.instructions {
            tasks.push(tokio::spawn(wait_and_dispatch(
                timeline.component.clone(),
                instruction.clone(),
                Arc::clone(&experiment),
                epoch,
                mode,
                options.strict,
            )));
        }

        let is_sensor = timeline.component.lock().as_sensor().is_some();
        if is_sensor {
            // One stop signal per sensor per run, owned here; dropping it at
            // the end of the run means nothing leaks into the next one.
            let (stop_tx, stop_rx) = watch::channel(false);
            tasks.push(tokio::spawn(monitor(
                timeline.component.clone(),
                Arc::clone(&experiment),
                mode,
                stop_rx,
                idle_poll,
            )));
            tasks.push(tokio::spawn(end_monitoring(
                timeline.component.name().to_string(),
                end_time,
                speed,
                epoch,
                stop_tx,
            )));
        }
    }

    // Lenient drain: a strict failure surfaces only after every already-
    // started task has finished; siblings are not cancelled mid-flight.
    let outcomes = join_all(tasks).await;

    let mut critical: Option<String> = None;
    for outcome in outcomes {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                critical.get_or_insert(failure.component);
            }
            Err(join_error) => error!(error = %join_error, "execution task panicked"),
        }
    }

    if mode.is_live() {
        for handle in &acquired {
            handle.lock().release();
        }
    }

    {
        let mut exp = experiment.lock();
        exp.finish(chrono::Utc::now(), critical.is_some());
        match &critical {
            Some(component) => {
                error!(component = %component, experiment = %exp.id, "protocol execution critically failed")
            }
            None => info!(experiment = %exp.id, "experiment completed"),
        }
    }

    Ok(Arc::try_unwrap(experiment)
        .map(Mutex::into_inner)
        .unwrap_or_else(|shared| shared.lock().clone()))
}

/// Dispatch task for one compiled instruction.
async fn wait_and_dispatch(
    component: ComponentHandle,
    instruction: CompiledInstruction,
    experiment: SharedExperiment,
    epoch: Instant,
    mode: ExecutionMode,
    strict: bool,
) -> TaskResult {
    sleep_until(epoch + Duration::from_secs_f64(instruction.time / mode.speed())).await;

    // In-memory state always updates, so introspection stays consistent in
    // every mode. The lock spans the whole step: a device never sees two
    // concurrent updates.
    let success = {
        let mut comp = component.lock();
        comp.update_from_params(&instruction.params);
        if mode.is_live() {
            match comp.update() {
                Ok(success) => success,
                Err(err) => {
                    error!(component = comp.name(), error = %err, "device update raised");
                    false
                }
            }
        } else {
            true
        }
    };

    let kind = if mode.is_live() {
        info!(
            component = component.name(),
            time = instruction.time,
            params = ?instruction.params,
            "executing"
        );
        RecordKind::Executed
    } else {
        info!(
            component = component.name(),
            time = instruction.time,
            params = ?instruction.params,
            "simulating"
        );
        RecordKind::Simulated
    };

    experiment
        .lock()
        .record_procedure(component.name(), instruction.params.clone(), success, kind);

    if !success {
        error!(component = component.name(), "failed to update device");
        if strict {
            return Err(StrictFailure {
                component: component.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Monitoring loop for one sensing component.
///
/// Samples at the sensor's current in-memory rate; a zero rate idles at the
/// configured poll interval. Terminated only by the run's stop signal. A
/// failed read stops this sensor's loop and nothing else.
async fn monitor(
    component: ComponentHandle,
    experiment: SharedExperiment,
    mode: ExecutionMode,
    mut stop_rx: watch::Receiver<bool>,
    idle_poll: Duration,
) -> TaskResult {
    debug!(component = component.name(), "sensor monitoring started");
    loop {
        if *stop_rx.borrow() {
            break;
        }

        let sample = {
            let mut comp = component.lock();
            match comp.as_sensor_mut() {
                Some(sensor) => {
                    let rate = sensor.rate_hz();
                    if rate > 0.0 {
                        if mode.is_live() {
                            Some((rate, sensor.read().map(SensorData::Reading)))
                        } else {
                            Some((rate, Ok(SensorData::Simulated)))
                        }
                    } else {
                        None
                    }
                }
                None => break,
            }
        };

        let delay = match sample {
            Some((rate, Ok(data))) => {
                experiment.lock().record_datapoint(component.name(), data);
                Duration::from_secs_f64(1.0 / rate / mode.speed())
            }
            Some((_, Err(err))) => {
                error!(
                    component = component.name(),
                    error = %err,
                    "failed to read sensor; stopping its monitor"
                );
                break;
            }
            None => idle_poll.div_f64(mode.speed()),
        };

        tokio::select! {
            _ = sleep(delay) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    // Signal task is gone; nothing will ever stop us.
                    break;
                }
            }
        }
    }
    debug!(component = component.name(), "sensor monitoring stopped");
    Ok(())
}

/// Signals a sensor's monitoring loop to stop once its timeline is over.
async fn end_monitoring(
    component: String,
    end_time: f64,
    speed: f64,
    epoch: Instant,
    stop_tx: watch::Sender<bool>,
) -> TaskResult {
    sleep_until(epoch + Duration::from_secs_f64(end_time / speed)).await;
    debug!(component = %component, end_time, "signalling sensor monitor to stop");
    let _ = stop_tx.send(true);
    Ok(())
}
