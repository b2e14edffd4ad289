//! Module orchestration core
//!
//! Event-driven orchestration for plugin collector modules: descriptors
//! declare watched and produced event types, the registry catalogues them,
//! the graph derives producer-to-consumer dependencies, the resolver
//! computes execution order or minimal module subsets, the loader wires
//! live instances, and the bridge lets their synchronous code run
//! bounded-concurrency async I/O.
//!
//! ## Architecture
//!
//! - **Index** (`graph::index`): producer/consumer maps over declared
//!   metadata, adjacency rebuilt in full per discovery pass
//! - **Resolver** (`graph::resolver`): topological order, cycle
//!   enumeration, backward-reachability minimal sets
//! - **Registry** (`registry`): thread-safe catalogue with atomic
//!   whole-replace discovery
//! - **Loader** (`loader`): strategy-based instantiation, lifecycle wiring,
//!   deterministic ordering, partial-failure reporting
//! - **Bridge** (`bridge`): persistent background event loop, per-module
//!   concurrency bounds, uniform success/failure envelopes

pub mod bridge;
pub mod events;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod traits;

pub use bridge::{
    AsyncBridge, AsyncResult, BridgeError, BridgeHandle, ConcurrencyLimiter, FetchRequest,
    FetchedPage,
};
pub use events::{EventSink, ModuleWiring, ResultStore, ScanEvent, ScanLogger, ScanTarget};
pub use graph::{EventGraph, GraphEdge, ResolutionResult, ResolutionStatus};
pub use loader::{
    Instantiator, LoadRequest, LoadResult, LoadedModule, ModuleLoader, OrderingMethod, ScanHandles,
};
pub use registry::{
    scan_manifest_dir, DiscoveryResult, ManifestSource, ModuleManifest, ModuleRegistry,
    RegistryStats, SearchFilter,
};
pub use traits::{
    merge_options, Module, ModuleDescriptor, ModuleError, ModuleFactory, ModuleSource,
    ModuleStatus, OptionValue, StaticSource, SEED_EVENT, WILDCARD_EVENT,
};
