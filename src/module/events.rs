//! Scan events and wiring-time collaborators
//!
//! The event vocabulary modules exchange, plus the collaborator handles the
//! loader attaches to every wired instance: result store, outgoing sink,
//! scan target, and the scan-scoped logger.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::module::bridge::BridgeHandle;
use crate::module::traits::{ModuleError, SEED_EVENT};

/// A single collected fact flowing between modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Event type binding producers to consumers
    pub event_type: String,
    /// Collected data payload
    pub data: String,
    /// Name of the module that emitted the event
    pub source_module: String,
}

impl ScanEvent {
    /// Create an event.
    pub fn new(event_type: &str, data: &str, source_module: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            data: data.to_string(),
            source_module: source_module.to_string(),
        }
    }

    /// The synthetic seed event that starts a scan.
    pub fn seed(data: &str) -> Self {
        Self::new(SEED_EVENT, data, SEED_EVENT)
    }
}

/// Outgoing sink for events a module emits.
///
/// The scan engine owns the queue behind this; the core only hands modules
/// the handle.
pub trait EventSink: Send + Sync {
    /// Deliver one emitted event.
    fn emit(&self, event: ScanEvent) -> Result<(), ModuleError>;
}

/// Persistence handle for collected results. Opaque to the core; the loader
/// only wires it through to instances.
pub trait ResultStore: Send + Sync {
    /// Record one event under the given scan.
    fn record(&self, scan_id: &str, event: &ScanEvent) -> Result<(), ModuleError>;
}

/// The subject of a scan, with alias matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTarget {
    /// Primary target value (domain, IP, name, ...)
    pub value: String,
    /// Target kind label
    pub kind: String,
    /// Alternative identities modules have established for the target
    pub aliases: Vec<String>,
}

impl ScanTarget {
    /// Create a target with no aliases.
    pub fn new(value: &str, kind: &str) -> Self {
        Self {
            value: value.to_string(),
            kind: kind.to_string(),
            aliases: Vec::new(),
        }
    }

    /// Register an alternative identity for the target.
    pub fn add_alias(&mut self, alias: &str) {
        if !self.matches(alias) {
            self.aliases.push(alias.to_string());
        }
    }

    /// Whether a candidate value refers to this target (primary value or
    /// any alias, case-insensitive).
    pub fn matches(&self, candidate: &str) -> bool {
        self.value.eq_ignore_ascii_case(candidate)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(candidate))
    }
}

/// Scan-scoped logger tagging every record with scan and module ids.
#[derive(Debug, Clone)]
pub struct ScanLogger {
    scan_id: String,
    module: String,
}

impl ScanLogger {
    /// Create a logger for one wired instance.
    pub fn new(scan_id: &str, module: &str) -> Self {
        Self {
            scan_id: scan_id.to_string(),
            module: module.to_string(),
        }
    }

    /// Log a module error.
    pub fn error(&self, message: &str) {
        tracing::error!(scan = %self.scan_id, module = %self.module, "{}", message);
    }

    /// Log module progress.
    pub fn info(&self, message: &str) {
        tracing::info!(scan = %self.scan_id, module = %self.module, "{}", message);
    }

    /// Log module detail.
    pub fn debug(&self, message: &str) {
        tracing::debug!(scan = %self.scan_id, module = %self.module, "{}", message);
    }
}

/// Everything the loader attaches to a wired instance.
///
/// Built fresh per module per scan; the incoming queue receiver is owned by
/// the instance, the matching sender stays with the loader's result.
pub struct ModuleWiring {
    /// Scan identifier
    pub scan_id: String,
    /// Persistent result store
    pub store: Arc<dyn ResultStore>,
    /// Shared worker pool for CPU-bound work
    pub pool: Arc<rayon::ThreadPool>,
    /// Scan target, after module enrichment
    pub target: ScanTarget,
    /// Outgoing event sink
    pub sink: Arc<dyn EventSink>,
    /// Fresh incoming event queue for this instance
    pub incoming: mpsc::Receiver<ScanEvent>,
    /// Scan-scoped logger
    pub logger: ScanLogger,
    /// Bounded-concurrency bridge handle
    pub bridge: BridgeHandle,
}
