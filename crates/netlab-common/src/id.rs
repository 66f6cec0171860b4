//! Container name validation and container ID generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RuntimeError, RuntimeResult};

/// A validated container name.
///
/// Container names must:
/// - Be 1-128 characters long
/// - Contain only alphanumeric characters, `-`, `_` and `.`
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerName(String);

impl ContainerName {
    /// Maximum length of a container name.
    pub const MAX_LENGTH: usize = 128;

    /// Create a new container name, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidContainerName`] if the format is invalid.
    pub fn new(name: impl Into<String>) -> RuntimeResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the container name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> RuntimeResult<()> {
        let invalid = || RuntimeError::InvalidContainerName {
            name: name.to_string(),
        };

        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphanumeric() => {}
            _ => return Err(invalid()),
        }
        if name.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }
        if chars.any(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.')) {
            return Err(invalid());
        }

        Ok(())
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContainerName {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A backend-assigned container ID (64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Length of the abbreviated ID.
    pub const SHORT_LENGTH: usize = 12;

    /// Generate a new random container ID from two UUID v4 values.
    #[must_use]
    pub fn generate() -> Self {
        let hi = uuid::Uuid::new_v4();
        let lo = uuid::Uuid::new_v4();
        Self(format!("{}{}", hex::encode(hi.as_bytes()), hex::encode(lo.as_bytes())))
    }

    /// Wrap an ID reported by a backend.
    #[must_use]
    pub fn from_backend(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the container ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short version of the ID (first 12 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..Self::SHORT_LENGTH).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
