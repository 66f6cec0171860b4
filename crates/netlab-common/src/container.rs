//! Backend-neutral container descriptions and list filters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A container as reported by any runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericContainer {
    /// Container names.
    pub names: Vec<String>,
    /// Full container ID.
    pub id: String,
    /// Abbreviated container ID.
    pub short_id: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Machine-readable state (`created`, `running`, `exited`).
    pub state: String,
    /// Human-readable status.
    pub status: String,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// PID of the container's init process, 0 when not running.
    pub pid: u32,
    /// Management network addressing.
    pub network_settings: NetworkSettings,
}

impl GenericContainer {
    /// Whether any of the container's names equals `name`.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n) == name)
    }
}

/// Management network addressing of a container.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub ipv4_addr: String,
    pub ipv4_prefix_len: u8,
    pub ipv6_addr: String,
    pub ipv6_prefix_len: u8,
    pub ipv4_gateway: String,
    pub ipv6_gateway: String,
}

/// What a [`GenericFilter`] inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Match against container labels.
    Label,
    /// Match against container names.
    Name,
}

/// How a [`GenericFilter`] compares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Value must equal `match_value`.
    #[default]
    #[serde(alias = "=")]
    Equals,
    /// Label key must be present.
    Exists,
}

/// A label or name predicate used when listing containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericFilter {
    /// What to inspect.
    pub filter_type: FilterType,
    /// Label key; unused for name filters.
    #[serde(default)]
    pub field: String,
    /// Comparison operator.
    #[serde(default)]
    pub operator: FilterOperator,
    /// Expected value.
    #[serde(default)]
    pub match_value: String,
}

impl GenericFilter {
    /// Label `key` equals `value`.
    #[must_use]
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            filter_type: FilterType::Label,
            field: key.into(),
            operator: FilterOperator::Equals,
            match_value: value.into(),
        }
    }

    /// Label `key` is present.
    #[must_use]
    pub fn label_exists(key: impl Into<String>) -> Self {
        Self {
            filter_type: FilterType::Label,
            field: key.into(),
            operator: FilterOperator::Exists,
            match_value: String::new(),
        }
    }

    /// Container name equals `name`.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            filter_type: FilterType::Name,
            field: String::new(),
            operator: FilterOperator::Equals,
            match_value: name.into(),
        }
    }

    /// Whether `container` satisfies this predicate.
    #[must_use]
    pub fn matches(&self, container: &GenericContainer) -> bool {
        match (self.filter_type, self.operator) {
            (FilterType::Label, FilterOperator::Equals) => {
                container.labels.get(&self.field) == Some(&self.match_value)
            }
            (FilterType::Label, FilterOperator::Exists) => {
                container.labels.contains_key(&self.field)
            }
            (FilterType::Name, FilterOperator::Equals) => container.has_name(&self.match_value),
            (FilterType::Name, FilterOperator::Exists) => !container.names.is_empty(),
        }
    }

    /// Whether `container` satisfies every filter; an empty set matches all.
    #[must_use]
    pub fn match_all(filters: &[Self], container: &GenericContainer) -> bool {
        filters.iter().all(|f| f.matches(container))
    }
}

impl fmt::Display for GenericFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.filter_type, self.operator) {
            (FilterType::Label, FilterOperator::Equals) => {
                write!(f, "label={}={}", self.field, self.match_value)
            }
            (FilterType::Label, FilterOperator::Exists) => write!(f, "label={}", self.field),
            (FilterType::Name, _) => write!(f, "name={}", self.match_value),
        }
    }
}
