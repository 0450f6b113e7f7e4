//! Engine configuration.
//!
//! Configuration is injected into [`ProtocolGraph`](crate::ProtocolGraph) at
//! construction; there is no process-wide default registry. A YAML file
//! looks like:
//!
//! ```yaml
//! cache:
//!   capacity: 512
//! invariants:
//!   max-reported-cycles: 10
//!   max-reported-placeholders: 10
//! risk:
//!   high-severity-floor: 75
//!   medium-severity-floor: 40
//! ```
//!
//! Every section and key is optional.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Default number of memoized query results.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default cap on cycles listed by invariant validation.
pub const DEFAULT_MAX_REPORTED_CYCLES: usize = 10;

/// Default cap on placeholders listed by invariant validation.
pub const DEFAULT_MAX_REPORTED_PLACEHOLDERS: usize = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GraphConfig {
    /// Query cache settings
    pub cache: CacheConfig,
    /// Invariant reporting settings
    pub invariants: InvariantConfig,
    /// Risk scoring settings
    pub risk: RiskConfig,
}

/// Cache section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Invariant section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InvariantConfig {
    /// Cycles listed individually before the report is truncated
    pub max_reported_cycles: usize,
    /// Placeholders listed individually before the report is truncated
    pub max_reported_placeholders: usize,
}

impl Default for InvariantConfig {
    fn default() -> Self {
        Self {
            max_reported_cycles: DEFAULT_MAX_REPORTED_CYCLES,
            max_reported_placeholders: DEFAULT_MAX_REPORTED_PLACEHOLDERS,
        }
    }
}

/// Risk section.
///
/// When a breaking change is found, the reported score is raised to at
/// least the floor of its severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RiskConfig {
    /// Minimum score for a high-severity breaking change
    pub high_severity_floor: u32,
    /// Minimum score for a medium-severity breaking change
    pub medium_severity_floor: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_severity_floor: 75,
            medium_severity_floor: 40,
        }
    }
}

impl GraphConfig {
    /// Parse configuration from a YAML string and validate it.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the YAML is malformed or a value is out of range.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, otherwise as
    /// [`from_yaml_str`](Self::from_yaml_str).
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_yaml_str(&content)
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a zero cache capacity or a severity floor above
    /// 100.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(Error::Config(
                "cache.capacity must be greater than zero".to_string(),
            ));
        }
        if self.risk.high_severity_floor > 100 || self.risk.medium_severity_floor > 100 {
            return Err(Error::Config(
                "risk severity floors must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}
