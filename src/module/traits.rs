//! Module system traits and shared vocabulary
//!
//! Defines the contracts collector modules and the orchestrator use to
//! communicate: the descriptor a module declares, the source it is
//! discovered through, and the instance interface the loader wires.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::module::events::{ModuleWiring, ScanEvent, ScanTarget};

/// Configured value for a single module option.
pub type OptionValue = serde_json::Value;

/// Synthetic event type that seeds a scan. It never has a producer, so the
/// resolver must not count it as a missing dependency.
pub const SEED_EVENT: &str = "ROOT";

/// Wildcard watched-event declaration: the module consumes every event type.
/// Indexed under the literal `"*"` key and excluded from edge derivation.
pub const WILDCARD_EVENT: &str = "*";

/// Catalogue status of a discovered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleStatus {
    /// Metadata extracted successfully; the module is runnable.
    Loaded,
    /// Metadata extraction or validation failed; retained for reporting.
    Failed,
    /// Present in the catalogue but administratively disabled.
    Disabled,
}

/// Declared metadata for one collector module.
///
/// Immutable per discovery pass: re-discovery replaces the whole catalogue,
/// never individual descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module name
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
    /// One-line summary of what the module collects
    pub summary: String,
    /// Module author
    pub author: String,
    /// Event types this module consumes (`"*"` = everything)
    pub watched_events: BTreeSet<String>,
    /// Event types this module can emit
    pub produced_events: BTreeSet<String>,
    /// Category tags
    pub categories: BTreeSet<String>,
    /// Behavior flags (e.g. "slow", "invasive", "apikey")
    pub flags: BTreeSet<String>,
    /// Use-case tags (e.g. "Footprint", "Investigate", "Passive")
    pub use_cases: BTreeSet<String>,
    /// Option defaults, keyed by option name
    pub opts: BTreeMap<String, OptionValue>,
    /// Option descriptions, keyed by option name
    pub opt_descs: BTreeMap<String, String>,
    /// Ordering tie-break when the graph gives no constraint (lower first)
    pub priority: i64,
    /// Catalogue status
    pub status: ModuleStatus,
    /// Whether the module may drive the concurrency bridge
    pub async_capable: bool,
    /// Extraction error, for Failed descriptors
    pub error: Option<String>,
}

impl ModuleDescriptor {
    /// Create a descriptor with the given name and default everything else.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            summary: String::new(),
            author: String::new(),
            watched_events: BTreeSet::new(),
            produced_events: BTreeSet::new(),
            categories: BTreeSet::new(),
            flags: BTreeSet::new(),
            use_cases: BTreeSet::new(),
            opts: BTreeMap::new(),
            opt_descs: BTreeMap::new(),
            priority: 100,
            status: ModuleStatus::Loaded,
            async_capable: false,
            error: None,
        }
    }

    /// Placeholder descriptor for a source whose metadata extraction failed.
    pub fn failed(name: &str, error: String) -> Self {
        let mut descriptor = Self::new(name);
        descriptor.status = ModuleStatus::Failed;
        descriptor.error = Some(error);
        descriptor
    }

    /// Set the watched and produced event vocabularies.
    pub fn with_events<I, J>(mut self, watched: I, produced: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        self.watched_events = watched.into_iter().map(Into::into).collect();
        self.produced_events = produced.into_iter().map(Into::into).collect();
        self
    }

    /// Set the ordering priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the one-line summary.
    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    /// Whether this module declared the wildcard watch.
    pub fn watches_wildcard(&self) -> bool {
        self.watched_events.contains(WILDCARD_EVENT)
    }
}

/// Merge option maps, later layers winning on key collision.
///
/// The loader layers per-module config over descriptor defaults, then the
/// global override map over both.
pub fn merge_options(
    defaults: &BTreeMap<String, OptionValue>,
    layers: &[&BTreeMap<String, OptionValue>],
) -> BTreeMap<String, OptionValue> {
    let mut merged = defaults.clone();
    for layer in layers {
        for (key, value) in layer.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Live collector instance
///
/// Instances are created through a [`ModuleSource`], configured with merged
/// options, wired with scan collaborators, then driven by an external scan
/// engine that feeds `handle_event`.
pub trait Module: Send {
    /// Module name; must match the descriptor it was created from.
    fn name(&self) -> &str;

    /// Apply merged option values. Called once, before `attach`.
    fn configure(&mut self, opts: &BTreeMap<String, OptionValue>) -> Result<(), ModuleError>;

    /// Give the module a chance to rewrite or enrich the scan target before
    /// it is attached. The default keeps the target unchanged.
    fn enrich_target(&self, target: ScanTarget) -> ScanTarget {
        target
    }

    /// Attach scan collaborators. A validation failure here is a hard
    /// per-module error; the loader excludes the module and continues.
    fn attach(&mut self, wiring: ModuleWiring) -> Result<(), ModuleError>;

    /// Process one incoming event.
    fn handle_event(&mut self, event: &ScanEvent) -> Result<(), ModuleError>;
}

/// Discoverable module source: metadata extraction plus instantiation.
///
/// Discovery must tolerate any source failing in `describe`; the failure is
/// recorded as a Failed descriptor, never propagated raw.
pub trait ModuleSource: Send + Sync {
    /// Stable name, available even when `describe` fails.
    fn source_name(&self) -> &str;

    /// Extract the module descriptor.
    fn describe(&self) -> Result<ModuleDescriptor, ModuleError>;

    /// Create a fresh, unconfigured instance.
    fn instantiate(&self) -> Result<Box<dyn Module>, ModuleError>;
}

/// Factory signature used by compiled-in sources.
pub type ModuleFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Module>> + Send + Sync>;

/// Source for compiled-in collectors: a descriptor plus a factory closure.
pub struct StaticSource {
    descriptor: ModuleDescriptor,
    factory: ModuleFactory,
}

impl StaticSource {
    /// Create a source from a descriptor and an instance factory.
    pub fn new(descriptor: ModuleDescriptor, factory: ModuleFactory) -> Self {
        Self { descriptor, factory }
    }
}

impl ModuleSource for StaticSource {
    fn source_name(&self) -> &str {
        &self.descriptor.name
    }

    fn describe(&self) -> Result<ModuleDescriptor, ModuleError> {
        Ok(self.descriptor.clone())
    }

    fn instantiate(&self) -> Result<Box<dyn Module>, ModuleError> {
        (self.factory)().map_err(ModuleError::from)
    }
}

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module discovery failed: {0}")]
    Discovery(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("module failed to load: {0}")]
    FailedModule(String),

    #[error("module is disabled: {0}")]
    DisabledModule(String),

    #[error("module instantiation failed: {0}")]
    Instantiation(String),

    #[error("invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid module configuration: {0}")]
    Configuration(String),

    #[error("module wiring failed: {0}")]
    Wiring(String),

    #[error("module operation failed: {0}")]
    Operation(String),
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::Instantiation(e.to_string())
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::Operation(e.to_string())
    }
}
