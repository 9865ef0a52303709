//! Demo: compile and simulate a small continuous-flow protocol.

use anyhow::Result;
use flowlab::{
    Apparatus, ComponentHandle, DummySensor, ExecuteOptions, ExecutionMode, ProcedureSpec,
    Protocol, Pump, Settings, TempControl, Valve,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load(None)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.clone())),
        )
        .init();

    let pump = ComponentHandle::new(Pump::new("pump"));
    let valve = ComponentHandle::new(Valve::new("valve", [("reactor", 1), ("waste", 2)]));
    let heater = ComponentHandle::new(TempControl::new("heater"));
    let sensor = ComponentHandle::new(DummySensor::new("uv_detector"));

    let mut apparatus = Apparatus::new("demo rig");
    for component in [&pump, &valve, &heater, &sensor] {
        apparatus.add(component.clone())?;
    }

    let mut protocol = Protocol::new("demo protocol", apparatus);
    protocol.add(
        &pump,
        ProcedureSpec::new().stop("10 seconds").param("rate", "5 mL/min"),
    )?;
    protocol.add(
        &pump,
        ProcedureSpec::new()
            .start("15 seconds")
            .stop("20 seconds")
            .param("rate", "1 mL/min"),
    )?;
    protocol.add(
        &valve,
        ProcedureSpec::new()
            .start("2 seconds")
            .stop("6 seconds")
            .param("setting", "waste"),
    )?;
    protocol.add(
        &heater,
        ProcedureSpec::new().stop("10 seconds").param("temp", "45 degC"),
    )?;
    protocol.add(
        &sensor,
        ProcedureSpec::new().stop("20 seconds").param("rate", "4 Hz"),
    )?;

    let compiled = protocol.compile(true)?;
    println!(
        "compiled timeline:\n{}",
        serde_json::to_string_pretty(&compiled.by_name())?
    );

    let options = ExecuteOptions::new(ExecutionMode::SimulatedAtSpeed(10))?
        .settings(settings);
    let experiment = protocol.execute(options).await?;

    println!(
        "experiment {}: {} instructions dispatched, {} datapoint streams",
        experiment.id,
        experiment.executed_procedures.len(),
        experiment.datapoints.len()
    );
    println!("{}", serde_json::to_string_pretty(&experiment)?);
    Ok(())
}
