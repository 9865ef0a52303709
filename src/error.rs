//! Custom error types for the library.
//!
//! All authoring-time and compile-time failures surface as [`FlowError`].
//! The taxonomy splits roughly into:
//!
//! - **Configuration errors** (invalid procedure declarations, unknown
//!   components, bad parameter kinds), raised synchronously from
//!   [`crate::protocol::Protocol::add`].
//! - **Compile errors** (ambiguous or conflicting timing, invalid devices),
//!   raised by [`crate::compiler::compile`] before any hardware interaction.
//! - **Acquisition errors**, raised by the execution engine before any task
//!   starts when a live run cannot open a device's hardware handle.
//!
//! Runtime device-update failures are deliberately *not* part of this enum:
//! they are recorded on the experiment (per-instruction success flags) and,
//! under strict mode, surface as the experiment's critical-failure flag after
//! in-flight tasks have drained.

use crate::quantity::{Dimension, QuantityError};
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Component '{0}' is not part of the apparatus")]
    UnknownComponent(String),

    #[error("Procedure for '{0}' has no parameters and would not change device state")]
    EmptyProcedure(String),

    #[error("Invalid parameter '{parameter}' for '{component}': {reason}")]
    InvalidParameter {
        component: String,
        parameter: String,
        reason: String,
    },

    #[error(
        "Bad dimensionality of '{parameter}' for '{component}': expected {expected}, got {actual}"
    )]
    DimensionalityMismatch {
        component: String,
        parameter: String,
        expected: Dimension,
        actual: Dimension,
    },

    #[error("Expected a time expression, got {actual} from '{expression}'")]
    ExpectedTime {
        expression: String,
        actual: Dimension,
    },

    #[error("Invalid setting '{setting}' for valve '{valve}'")]
    InvalidValveSetting { valve: String, setting: String },

    #[error("Provide one of stop and duration, not both")]
    StopAndDuration,

    #[error("Procedure for '{0}' begins at or after it ends")]
    StartAfterStop(String),

    #[error("Component '{component}' is not valid: {source}")]
    InvalidComponent {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "Component '{0}' cannot have two procedures spanning the entire protocol; \
         merge them into one procedure or bound their time ranges"
    )]
    ConflictingContinuous(String),

    #[error(
        "Overlapping procedures on '{component}': the procedure over \
         [{first_start}s, {first_stop}s) conflicts with the one starting at {second_start}s"
    )]
    OverlappingProcedures {
        component: String,
        first_start: f64,
        first_stop: f64,
        second_start: f64,
    },

    #[error("Ambiguous start time for '{0}': a later procedure also starts at 0")]
    AmbiguousStart(String),

    #[error(
        "Unable to infer the protocol duration; define stop or duration for at least one procedure"
    )]
    UndecidableDuration,

    #[error("Temperature controller '{0}' is activated but no temperature was given")]
    IncompleteTempDirective(String),

    #[error("Quantity error: {0}")]
    Quantity(#[from] QuantityError),

    #[error("Failed to acquire hardware for '{component}': {source}")]
    Acquisition {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Settings error: {0}")]
    Config(#[from] config::ConfigError),
}
