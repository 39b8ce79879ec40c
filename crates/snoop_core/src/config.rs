//! Configuration - TOML to SnoopConfig conversion
//!
//! Every section and field is optional; missing values take the defaults
//! shown below.
//!
//! # Config Format
//!
//! ```toml
//! [registry]
//! capacity = 32          # clients per driver family, 1..=1024
//!
//! [errors]
//! queue_capacity = 32    # deferred error codes per client, 1..=4096
//!
//! [filter]
//! path = "snoop.filter"  # absent = instrument everything
//!
//! [nova]
//! start_delay_secs = 0
//! duration_secs = 0      # 0 = trace until removed
//!
//! [shutdown]
//! grace_period_ms = 500
//! ```

use crate::error::{Result, SnoopError};
use crate::error_queue::DEFAULT_QUEUE_CAPACITY;
use crate::filter::FilterSet;
use crate::installer::InstallSettings;
use crate::registry::DEFAULT_CAPACITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted `registry.capacity`
pub const MAX_REGISTRY_CAPACITY: usize = 1024;

/// Largest accepted `errors.queue_capacity`
pub const MAX_QUEUE_CAPACITY: usize = 4096;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SnoopConfig {
    pub registry: RegistryConfig,
    pub errors: ErrorsConfig,
    pub filter: FilterConfig,
    pub nova: NovaConfig,
    pub shutdown: ShutdownConfig,
}

/// `[registry]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Client slots per driver family
    pub capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// `[errors]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Deferred error codes kept per client
    pub queue_capacity: usize,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// `[filter]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Filter file; `None` instruments every entry point
    pub path: Option<PathBuf>,
}

/// `[nova]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NovaConfig {
    /// Seconds after install before call tracing starts
    pub start_delay_secs: u64,
    /// Seconds of call tracing, 0 for no limit
    pub duration_secs: u64,
}

/// `[shutdown]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Wait after unpatching before the driver library is closed
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_period_ms: 500 }
    }
}

impl SnoopConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every capacity against its accepted range
    pub fn validate(&self) -> Result<()> {
        check_range("registry.capacity", self.registry.capacity, MAX_REGISTRY_CAPACITY)?;
        check_range("errors.queue_capacity", self.errors.queue_capacity, MAX_QUEUE_CAPACITY)
    }

    /// Client slots per family, clamped to the accepted range
    pub fn registry_capacity(&self) -> usize {
        self.registry.capacity.clamp(1, MAX_REGISTRY_CAPACITY)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Grace period before closing a driver library
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_period_ms)
    }

    /// Installer tunables
    pub fn install_settings(&self) -> InstallSettings {
        InstallSettings {
            queue_capacity: self.errors.queue_capacity.clamp(1, MAX_QUEUE_CAPACITY),
            grace_period: self.grace_period(),
        }
    }

    /// Load the configured filter; empty when none is configured or the
    /// file cannot be read
    pub fn load_filter(&self) -> FilterSet {
        match &self.filter.path {
            Some(path) => FilterSet::load_or_empty(path),
            None => FilterSet::new(),
        }
    }
}

fn check_range(key: &'static str, value: usize, max: usize) -> Result<()> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(SnoopError::OutOfRange { key, value, min: 1, max })
    }
}
