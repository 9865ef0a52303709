//! Quantity parsing for human-entered unit expressions.
//!
//! Procedure authors write values like `"5 seconds"`, `"30 degC"` or
//! `"1.5 mL/min"`. This module parses those expressions into a [`Quantity`]
//! carrying a base-unit magnitude and a [`Dimension`], so the protocol layer
//! can check that a parameter's unit family matches what the device expects
//! before anything is dispatched.
//!
//! Base units per family: seconds, hertz, degrees Celsius, millilitres per
//! minute. Offset units (kelvin, Fahrenheit) are converted to Celsius at
//! parse time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("could not parse quantity expression '{0}'")]
    Unparseable(String),

    #[error("unknown unit '{unit}' in expression '{expression}'")]
    UnknownUnit { unit: String, expression: String },
}

/// Unit family of a parsed quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Time,
    Frequency,
    Temperature,
    VolumetricFlowRate,
    Dimensionless,
}

impl Dimension {
    /// Symbol of the base unit this family normalizes to.
    pub fn base_unit(&self) -> &'static str {
        match self {
            Dimension::Time => "s",
            Dimension::Frequency => "Hz",
            Dimension::Temperature => "degC",
            Dimension::VolumetricFlowRate => "mL/min",
            Dimension::Dimensionless => "",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Time => "time",
            Dimension::Frequency => "frequency",
            Dimension::Temperature => "temperature",
            Dimension::VolumetricFlowRate => "volumetric flow rate",
            Dimension::Dimensionless => "dimensionless",
        };
        write!(f, "{}", name)
    }
}

/// A magnitude normalized to its family's base unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    magnitude: f64,
    dimension: Dimension,
}

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*(.*?)\s*$")
        .expect("quantity regex is valid")
});

impl Quantity {
    /// Builds a quantity already expressed in base units.
    pub fn new(magnitude: f64, dimension: Dimension) -> Self {
        Self {
            magnitude,
            dimension,
        }
    }

    /// Parses an expression like `"5 seconds"` into a base-unit quantity.
    ///
    /// A bare number parses as [`Dimension::Dimensionless`].
    pub fn parse(expression: &str) -> Result<Self, QuantityError> {
        let captures = QUANTITY_RE
            .captures(expression)
            .ok_or_else(|| QuantityError::Unparseable(expression.to_string()))?;
        let magnitude: f64 = captures[1]
            .parse()
            .map_err(|_| QuantityError::Unparseable(expression.to_string()))?;
        let unit = &captures[2];

        if unit.is_empty() {
            return Ok(Self::new(magnitude, Dimension::Dimensionless));
        }

        let (dimension, base) = match unit {
            "s" | "sec" | "secs" | "second" | "seconds" => (Dimension::Time, magnitude),
            "ms" | "millisecond" | "milliseconds" => (Dimension::Time, magnitude / 1e3),
            "min" | "minute" | "minutes" => (Dimension::Time, magnitude * 60.0),
            "h" | "hr" | "hour" | "hours" => (Dimension::Time, magnitude * 3600.0),

            "Hz" | "hz" => (Dimension::Frequency, magnitude),
            "kHz" => (Dimension::Frequency, magnitude * 1e3),
            "mHz" => (Dimension::Frequency, magnitude / 1e3),

            "degC" | "\u{b0}C" => (Dimension::Temperature, magnitude),
            "K" => (Dimension::Temperature, magnitude - 273.15),
            "degF" | "\u{b0}F" => (Dimension::Temperature, (magnitude - 32.0) / 1.8),

            "mL/min" | "ml/min" => (Dimension::VolumetricFlowRate, magnitude),
            "uL/min" | "\u{b5}L/min" => (Dimension::VolumetricFlowRate, magnitude / 1e3),
            "mL/s" | "ml/s" => (Dimension::VolumetricFlowRate, magnitude * 60.0),
            "L/min" | "l/min" => (Dimension::VolumetricFlowRate, magnitude * 1e3),
            "L/hr" | "L/h" => (Dimension::VolumetricFlowRate, magnitude * 1e3 / 60.0),

            _ => {
                return Err(QuantityError::UnknownUnit {
                    unit: unit.to_string(),
                    expression: expression.to_string(),
                })
            }
        };

        Ok(Self::new(base, dimension))
    }

    /// Magnitude in the family's base unit.
    pub fn base_magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dimension == Dimension::Dimensionless {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} {}", self.magnitude, self.dimension.base_unit())
        }
    }
}
