//! Runtime settings.
//!
//! Layered the usual way: compiled-in defaults, then an optional TOML file,
//! then `FLOWLAB_*` environment variables. Timing policy that is part of the
//! compiler's contract (the adjacency epsilon) is deliberately *not*
//! configurable; see [`crate::compiler::TIME_EPSILON`].

use crate::error::FlowResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Poll interval, in milliseconds, for sensors whose sampling rate is
    /// currently zero.
    pub idle_poll_interval_ms: u64,
    /// Default tracing filter directive used by the demo binary.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_poll_interval_ms: 100,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings, merging defaults, an optional file, and environment
    /// variables prefixed `FLOWLAB_`.
    pub fn load(path: Option<&Path>) -> FlowResult<Self> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Settings::default())?);
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix("FLOWLAB"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
