//! Module manifest parsing
//!
//! Parses `module.toml` manifests into descriptors for on-disk module
//! sources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::module::traits::{
    Module, ModuleDescriptor, ModuleError, ModuleFactory, ModuleSource, ModuleStatus, OptionValue,
};

fn default_priority() -> i64 {
    100
}

/// Module manifest (`module.toml` structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name
    pub name: String,
    /// Human-readable display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// One-line summary
    #[serde(default)]
    pub summary: Option<String>,
    /// Module author
    #[serde(default)]
    pub author: Option<String>,
    /// Watched event types (`"*"` = wildcard)
    #[serde(default)]
    pub watched_events: Vec<String>,
    /// Produced event types
    #[serde(default)]
    pub produced_events: Vec<String>,
    /// Category tags
    #[serde(default)]
    pub categories: Vec<String>,
    /// Behavior flags
    #[serde(default)]
    pub flags: Vec<String>,
    /// Use-case tags
    #[serde(default)]
    pub use_cases: Vec<String>,
    /// Option defaults
    #[serde(default)]
    pub opts: BTreeMap<String, toml::Value>,
    /// Option descriptions
    #[serde(default)]
    pub opt_descs: BTreeMap<String, String>,
    /// Ordering priority (lower first)
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Administratively disabled
    #[serde(default)]
    pub disabled: bool,
    /// Whether the module may drive the concurrency bridge
    #[serde(default)]
    pub async_capable: bool,
}

impl ModuleManifest {
    /// Load a manifest from a `module.toml` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModuleError::InvalidManifest(format!("failed to read manifest file: {}", e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse a manifest from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ModuleError> {
        let manifest: ModuleManifest = toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("failed to parse manifest TOML: {}", e))
        })?;
        if manifest.name.is_empty() {
            return Err(ModuleError::InvalidManifest(
                "module name cannot be empty".to_string(),
            ));
        }
        Ok(manifest)
    }

    /// Convert to a catalogue descriptor.
    pub fn to_descriptor(&self) -> ModuleDescriptor {
        let opts: BTreeMap<String, OptionValue> = self
            .opts
            .iter()
            .map(|(key, value)| (key.clone(), toml_to_option_value(value)))
            .collect();
        ModuleDescriptor {
            name: self.name.clone(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            summary: self.summary.clone().unwrap_or_default(),
            author: self.author.clone().unwrap_or_default(),
            watched_events: self.watched_events.iter().cloned().collect(),
            produced_events: self.produced_events.iter().cloned().collect(),
            categories: self.categories.iter().cloned().collect(),
            flags: self.flags.iter().cloned().collect(),
            use_cases: self.use_cases.iter().cloned().collect(),
            opts,
            opt_descs: self.opt_descs.clone(),
            priority: self.priority,
            status: if self.disabled {
                ModuleStatus::Disabled
            } else {
                ModuleStatus::Loaded
            },
            async_capable: self.async_capable,
            error: None,
        }
    }
}

fn toml_to_option_value(value: &toml::Value) -> OptionValue {
    // Datetime has no JSON counterpart; it degrades to its string form.
    serde_json::to_value(value).unwrap_or_else(|_| OptionValue::String(value.to_string()))
}

/// On-disk module source backed by a manifest.
///
/// Metadata comes from the manifest; instantiation requires a factory bound
/// by the embedder, otherwise it fails per-module.
pub struct ManifestSource {
    manifest: ModuleManifest,
    factory: Option<ModuleFactory>,
}

impl ManifestSource {
    /// Source with metadata only; instantiation will fail until a factory
    /// is bound.
    pub fn new(manifest: ModuleManifest) -> Self {
        Self {
            manifest,
            factory: None,
        }
    }

    /// Source with a bound instance factory.
    pub fn with_factory(manifest: ModuleManifest, factory: ModuleFactory) -> Self {
        Self {
            manifest,
            factory: Some(factory),
        }
    }

    /// The parsed manifest.
    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }
}

impl ModuleSource for ManifestSource {
    fn source_name(&self) -> &str {
        &self.manifest.name
    }

    fn describe(&self) -> Result<ModuleDescriptor, ModuleError> {
        Ok(self.manifest.to_descriptor())
    }

    fn instantiate(&self) -> Result<Box<dyn Module>, ModuleError> {
        match &self.factory {
            Some(factory) => factory().map_err(ModuleError::from),
            None => Err(ModuleError::Instantiation(format!(
                "no factory bound for module {}",
                self.manifest.name
            ))),
        }
    }
}
