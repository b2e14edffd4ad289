//! Configuration for the orchestration core
//!
//! Serde-backed TOML configuration with per-section defaults, covering
//! discovery, loading, the concurrency bridge, and option overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::module::traits::OptionValue;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to parse config TOML: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

fn default_modules_dir() -> String {
    "modules".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_wait_secs() -> u64 {
    300
}

fn default_per_module_permits() -> usize {
    10
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory scanned for `module.toml` manifests
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,

    /// Module names skipped during discovery
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            modules_dir: default_modules_dir(),
            ignore: Vec::new(),
        }
    }
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Intersect requests with the minimal set for desired outputs
    #[serde(default = "default_true")]
    pub prune_to_outputs: bool,

    /// Order wired instances topologically when the graph allows it
    #[serde(default = "default_true")]
    pub topological_order: bool,

    /// Capacity of each instance's fresh incoming event queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            prune_to_outputs: true,
            topological_order: true,
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Concurrency bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Wait ceiling for one submitted operation, in seconds
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// In-flight operation bound per module instance
    #[serde(default = "default_per_module_permits")]
    pub per_module_permits: usize,
}

impl BridgeConfig {
    /// Wait ceiling as a `Duration`.
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait_secs(),
            per_module_permits: default_per_module_permits(),
        }
    }
}

/// Per-module run configuration. A requested module with no entry here is
/// skipped by the loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleRunConfig {
    /// Option values layered over the module's declared defaults
    #[serde(default)]
    pub opts: BTreeMap<String, OptionValue>,
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Bridge settings
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Global option overrides; win over module defaults and per-module
    /// config on key collision
    #[serde(default)]
    pub global_opts: BTreeMap<String, OptionValue>,

    /// Per-module run configuration, keyed by module name
    #[serde(default)]
    pub module_configs: BTreeMap<String, ModuleRunConfig>,
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: OrchestratorConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loader.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "loader.queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.bridge.max_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "bridge.max_wait_secs must be non-zero".to_string(),
            ));
        }
        if self.bridge.per_module_permits == 0 {
            return Err(ConfigError::Invalid(
                "bridge.per_module_permits must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
