//! Runtime configuration.
//!
//! Configuration is read from TOML:
//!
//! ```toml
//! [poller]
//! mode = "speculative"
//! max_events = 64
//! ```

use crate::error::{Error, Result};
use crate::reconcile::PollMode;

use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    /// Whether the backend may try I/O before the poller reports readiness.
    #[serde(default)]
    pub mode: PollMode,

    /// Upper bound of events collected per poller wait. The epoll backend
    /// clamps it to `1..=MAX_EVENTS`.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_max_events() -> usize {
    64
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            mode: PollMode::default(),
            max_events: default_max_events(),
        }
    }
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        s.parse()
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(s)?)
    }
}
