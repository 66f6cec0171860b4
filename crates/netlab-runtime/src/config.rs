//! Runtime configuration.

use std::time::Duration;

use netlab_common::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};

/// Cross-backend runtime tunables.
///
/// Handed to a runtime through [`crate::option::with_config`] and returned
/// by value from [`crate::ContainerRuntime::config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Default timeout for backend calls, in seconds when serialized.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Stop containers gracefully before removing them.
    pub graceful_shutdown: bool,
    /// Enable backend debug output.
    pub debug: bool,
    /// Leave the management network in place on teardown.
    pub keep_mgmt_net: bool,
}

impl RuntimeConfig {
    /// Default backend call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if the document does not describe a
    /// runtime configuration.
    pub fn from_toml_str(input: &str) -> RuntimeResult<Self> {
        toml::from_str(input).map_err(|e| RuntimeError::Config {
            message: e.to_string(),
        })
    }

    /// Set the default timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable graceful shutdown.
    #[must_use]
    pub const fn with_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = true;
        self
    }

    /// Enable debug output.
    #[must_use]
    pub const fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Keep the management network on teardown.
    #[must_use]
    pub const fn with_keep_mgmt_net(mut self) -> Self {
        self.keep_mgmt_net = true;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            graceful_shutdown: false,
            debug: false,
            keep_mgmt_net: false,
        }
    }
}

/// Durations are written as whole seconds when exact and as fractional
/// seconds otherwise, so `timeout = 30` and `timeout = 1.5` both load.
mod duration_secs {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Seconds::deserialize(deserializer)? {
            Seconds::Whole(secs) => Ok(Duration::from_secs(secs)),
            Seconds::Fractional(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| D::Error::custom(format!("invalid timeout {secs}: {e}"))),
        }
    }
}
