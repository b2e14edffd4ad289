//! Osprey orchestration core
//!
//! Event-driven orchestrator for a plugin-based data-collection platform.
//! Independent collector modules declare which event types they consume and
//! which they can emit; this crate discovers them, builds the implied
//! producer-to-consumer dependency graph, detects cycles, computes a valid
//! execution order (or the minimal module subset needed to reach desired
//! outputs), then instantiates and wires each module with shared lifecycle
//! state and a concurrency bridge for bounded async I/O from synchronous
//! module code.
//!
//! Collector implementations, the result database, any web/API surface, and
//! the scan engine that drives wired instances are external collaborators;
//! this crate owns discovery, resolution, loading, and the bridge.
//!
//! ## Example
//!
//! ```no_run
//! use osprey_core::module::{ModuleRegistry, scan_manifest_dir};
//!
//! let registry = ModuleRegistry::new();
//! let sources = scan_manifest_dir("modules")?;
//! let discovery = registry.discover(&sources, &[]);
//! println!("{} modules loaded, {} failed", discovery.loaded, discovery.failed);
//!
//! let resolution = registry.resolve(&["CVE".to_string()], &[], &[]);
//! println!("load order: {:?}", resolution.load_order);
//! # Ok::<(), osprey_core::module::ModuleError>(())
//! ```

pub mod config;
pub mod module;

pub use config::{
    BridgeConfig, ConfigError, DiscoveryConfig, LoaderConfig, ModuleRunConfig, OrchestratorConfig,
};
pub use module::{
    AsyncBridge, AsyncResult, DiscoveryResult, EventGraph, LoadRequest, LoadResult, Module,
    ModuleDescriptor, ModuleError, ModuleLoader, ModuleRegistry, ModuleSource, ResolutionResult,
    ResolutionStatus, ScanEvent,
};
