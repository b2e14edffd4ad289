//! Module loader implementation
//!
//! Pruning against desired outputs, strategy-based instantiation with a
//! legacy fallback, lifecycle wiring, and deterministic ordering of the
//! wired set.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::module::bridge::{AsyncBridge, BridgeHandle};
use crate::module::events::{EventSink, ModuleWiring, ResultStore, ScanEvent, ScanLogger, ScanTarget};
use crate::module::registry::ModuleRegistry;
use crate::module::traits::{merge_options, Module, ModuleError, OptionValue};

/// How the wired set was ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderingMethod {
    /// Graph-derived topological order, priority for graph-absent modules
    Topological,
    /// Pure ascending-priority order
    Priority,
}

/// One wired, runnable module instance.
pub struct LoadedModule {
    /// Module name
    pub name: String,
    /// Ordering priority from the descriptor
    pub priority: i64,
    /// The configured, wired instance
    pub instance: Box<dyn Module>,
    /// Sender side of the instance's fresh incoming queue
    pub events_in: mpsc::Sender<ScanEvent>,
}

/// Outcome of one load pass.
pub struct LoadResult {
    /// Scan id the instances were wired with
    pub scan_id: String,
    /// Wired instances in execution order
    pub modules: Vec<LoadedModule>,
    /// Instances wired successfully
    pub loaded: usize,
    /// Modules that failed instantiation or wiring
    pub failed: usize,
    /// Requested modules skipped for lack of a config entry
    pub skipped: usize,
    /// Requested modules dropped by output pruning
    pub pruned: usize,
    /// Per-module (name, message) failures
    pub errors: Vec<(String, String)>,
    /// Ordering method used
    pub ordering: OrderingMethod,
    /// Cycles detected within the loaded set
    pub cycle_count: usize,
    /// Wall-clock duration of the pass
    pub duration: Duration,
}

/// Collaborators shared by every instance wired for one scan.
#[derive(Clone)]
pub struct ScanHandles {
    /// Persistent result store
    pub store: Arc<dyn ResultStore>,
    /// Shared worker pool
    pub pool: Arc<rayon::ThreadPool>,
    /// Scan target
    pub target: ScanTarget,
    /// Outgoing event sink
    pub sink: Arc<dyn EventSink>,
}

/// One load request.
pub struct LoadRequest {
    /// Scan id; generated when absent
    pub scan_id: Option<String>,
    /// Requested module names
    pub modules: Vec<String>,
    /// Desired output event types; empty disables pruning
    pub desired_outputs: Vec<String>,
    /// Scan collaborators
    pub handles: ScanHandles,
}

/// One instantiation strategy. Strategies are tried in order; the first
/// success wins, and only when all fail is the module recorded as failed.
pub trait Instantiator: Send + Sync {
    /// Strategy name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Produce a fresh, unconfigured instance.
    fn instantiate(
        &self,
        registry: &ModuleRegistry,
        module: &str,
    ) -> Result<Box<dyn Module>, ModuleError>;
}

/// Registry-backed instantiation, gated on descriptor status.
struct RegistryInstantiator;

impl Instantiator for RegistryInstantiator {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn instantiate(
        &self,
        registry: &ModuleRegistry,
        module: &str,
    ) -> Result<Box<dyn Module>, ModuleError> {
        registry.instantiate_checked(module)
    }
}

/// Legacy direct instantiation from the stored source, bypassing status
/// checks.
struct DirectInstantiator;

impl Instantiator for DirectInstantiator {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn instantiate(
        &self,
        registry: &ModuleRegistry,
        module: &str,
    ) -> Result<Box<dyn Module>, ModuleError> {
        registry.instantiate_unchecked(module)
    }
}

/// Orchestration driver: requested names + configuration in, ordered wired
/// instances out.
pub struct ModuleLoader {
    registry: Arc<ModuleRegistry>,
    config: OrchestratorConfig,
    bridge: Arc<AsyncBridge>,
    strategies: Vec<Box<dyn Instantiator>>,
}

impl ModuleLoader {
    /// Create a loader with the default strategy order (registry, then
    /// legacy direct).
    pub fn new(
        registry: Arc<ModuleRegistry>,
        config: OrchestratorConfig,
    ) -> Result<Self, ModuleError> {
        let bridge = AsyncBridge::shared().map_err(|e| ModuleError::Operation(e.to_string()))?;
        Ok(Self {
            registry,
            config,
            bridge,
            strategies: vec![Box::new(RegistryInstantiator), Box::new(DirectInstantiator)],
        })
    }

    /// Replace the instantiation strategy order.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn Instantiator>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Load, configure, wire, and order the requested modules.
    pub fn load(&self, request: LoadRequest) -> LoadResult {
        let started = Instant::now();
        let scan_id = request
            .scan_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let graph = self.registry.graph();

        // 1. optional pruning against the minimal set for desired outputs
        let mut requested: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();
        for name in request.modules {
            if seen.insert(name.clone()) {
                requested.push(name);
            }
        }
        let mut pruned = 0;
        if !request.desired_outputs.is_empty() && self.config.loader.prune_to_outputs {
            let keep = graph.resolve_for_output(&request.desired_outputs);
            requested.retain(|name| {
                if keep.contains(name) {
                    true
                } else {
                    info!(module = %name, "pruned: not needed for desired outputs");
                    pruned += 1;
                    false
                }
            });
        }

        // 2./3. instantiate and wire, tolerating per-module failure
        let mut wired: Vec<LoadedModule> = Vec::new();
        let mut errors: Vec<(String, String)> = Vec::new();
        let mut loaded = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for name in &requested {
            let Some(run_config) = self.config.module_configs.get(name) else {
                warn!(module = %name, "no config entry, skipping");
                skipped += 1;
                continue;
            };

            let mut instance: Option<Box<dyn Module>> = None;
            let mut last_error = ModuleError::UnknownModule(name.clone());
            for strategy in &self.strategies {
                match strategy.instantiate(&self.registry, name) {
                    Ok(created) => {
                        instance = Some(created);
                        break;
                    }
                    Err(e) => {
                        debug!(module = %name, strategy = strategy.name(), "instantiation failed: {}", e);
                        last_error = e;
                    }
                }
            }
            let Some(instance) = instance else {
                error!(module = %name, "all instantiation strategies failed: {}", last_error);
                errors.push((name.clone(), last_error.to_string()));
                failed += 1;
                continue;
            };

            match self.wire(&scan_id, name, instance, &run_config.opts, &request.handles) {
                Ok(module) => {
                    loaded += 1;
                    wired.push(module);
                }
                Err(e) => {
                    error!(module = %name, "wiring failed: {}", e);
                    errors.push((name.clone(), e.to_string()));
                    failed += 1;
                }
            }
        }

        // 4. ordering
        let (ordering, cycle_count) = if self.config.loader.topological_order {
            let in_graph: BTreeSet<String> = wired
                .iter()
                .map(|m| m.name.clone())
                .filter(|name| graph.contains(name))
                .collect();
            let (order, _) = graph.topological_order_for(&in_graph);
            let position: BTreeMap<&str, usize> = order
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect();
            // graph-absent modules follow the ordered set, by ascending
            // priority then name
            wired.sort_by(|a, b| {
                match (position.get(a.name.as_str()), position.get(b.name.as_str())) {
                    (Some(pa), Some(pb)) => pa.cmp(pb),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => (a.priority, &a.name).cmp(&(b.priority, &b.name)),
                }
            });
            let cycles = graph.detect_cycles_for(&in_graph).len();
            (OrderingMethod::Topological, cycles)
        } else {
            wired.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
            (OrderingMethod::Priority, 0)
        };

        let result = LoadResult {
            scan_id,
            modules: wired,
            loaded,
            failed,
            skipped,
            pruned,
            errors,
            ordering,
            cycle_count,
            duration: started.elapsed(),
        };
        info!(
            loaded = result.loaded,
            failed = result.failed,
            skipped = result.skipped,
            pruned = result.pruned,
            ordering = ?result.ordering,
            "module load pass complete"
        );
        result
    }

    /// Configure and wire one instance. Configuration failures surface as
    /// instantiation-class errors; queue/attach failures are hard wiring
    /// errors for this module only.
    fn wire(
        &self,
        scan_id: &str,
        name: &str,
        mut instance: Box<dyn Module>,
        opts: &BTreeMap<String, OptionValue>,
        handles: &ScanHandles,
    ) -> Result<LoadedModule, ModuleError> {
        let descriptor = self.registry.get(name);
        let (defaults, priority) = match &descriptor {
            Some(d) => (d.opts.clone(), d.priority),
            None => (BTreeMap::new(), 100),
        };
        let merged = merge_options(&defaults, &[opts, &self.config.global_opts]);
        instance.configure(&merged)?;

        let capacity = self.config.loader.queue_capacity;
        if capacity == 0 {
            return Err(ModuleError::Wiring(
                "incoming queue capacity must be non-zero".to_string(),
            ));
        }
        let (events_in, incoming) = mpsc::channel(capacity);

        let target = instance.enrich_target(handles.target.clone());
        let wiring = ModuleWiring {
            scan_id: scan_id.to_string(),
            store: Arc::clone(&handles.store),
            pool: Arc::clone(&handles.pool),
            target,
            sink: Arc::clone(&handles.sink),
            incoming,
            logger: ScanLogger::new(scan_id, name),
            bridge: BridgeHandle::new(
                Arc::clone(&self.bridge),
                self.config.bridge.per_module_permits,
                self.config.bridge.max_wait(),
            ),
        };
        instance.attach(wiring)?;

        debug!(module = %name, scan = %scan_id, "module wired");
        Ok(LoadedModule {
            name: name.to_string(),
            priority,
            instance,
            events_in,
        })
    }
}
