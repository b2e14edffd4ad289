//! Module registry and catalogue
//!
//! Authoritative, thread-safe catalogue of discovered module descriptors
//! layered over the event graph. Discovery builds a complete replacement
//! catalogue and swaps it under one write lock, so readers never observe a
//! half-updated state; all queries run under the read lock against an
//! immutable snapshot.

pub mod discovery;
pub mod manifest;

pub use discovery::{scan_manifest_dir, DiscoveryResult};
pub use manifest::{ManifestSource, ModuleManifest};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::module::events::ModuleWiring;
use crate::module::graph::{EventGraph, GraphEdge, ResolutionResult};
use crate::module::traits::{
    merge_options, Module, ModuleDescriptor, ModuleError, ModuleSource, ModuleStatus, OptionValue,
};

/// Filters applied on top of the free-text query in [`ModuleRegistry::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Require at least one of these categories
    pub categories: Vec<String>,
    /// Require at least one of these flags
    pub flags: Vec<String>,
    /// Require at least one of these use cases
    pub use_cases: Vec<String>,
    /// Require this author (case-insensitive)
    pub author: Option<String>,
}

/// Catalogue counters for operator-facing reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Descriptors in the catalogue
    pub total: usize,
    /// Runnable descriptors
    pub loaded: usize,
    /// Descriptors whose extraction failed
    pub failed: usize,
    /// Administratively disabled descriptors
    pub disabled: usize,
    /// Distinct event types across the catalogue
    pub event_types: usize,
    /// Derived dependency edges
    pub edges: usize,
    /// Distinct category tags
    pub categories: usize,
    /// Distinct behavior flags
    pub flags: usize,
}

#[derive(Default)]
struct Catalogue {
    descriptors: BTreeMap<String, Arc<ModuleDescriptor>>,
    sources: BTreeMap<String, Arc<dyn ModuleSource>>,
    graph: EventGraph,
    by_category: BTreeMap<String, BTreeSet<String>>,
    by_flag: BTreeMap<String, BTreeSet<String>>,
    by_use_case: BTreeMap<String, BTreeSet<String>>,
}

/// Thread-safe module catalogue.
///
/// One reader/writer lock guards the whole catalogue: discovery (write) is
/// infrequent and exclusive, queries are read-only and safe under high read
/// concurrency.
#[derive(Default)]
pub struct ModuleRegistry {
    catalogue: RwLock<Catalogue>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalogue> {
        self.catalogue.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalogue> {
        self.catalogue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one discovery pass and atomically replace the catalogue.
    ///
    /// A per-source extraction failure is recorded as a Failed descriptor
    /// carrying the error message; it never aborts the batch. Names on the
    /// ignore list are skipped entirely.
    pub fn discover(
        &self,
        sources: &[Arc<dyn ModuleSource>],
        ignore: &[String],
    ) -> DiscoveryResult {
        let started = Instant::now();
        let mut next = Catalogue::default();
        let mut errors: Vec<(String, String)> = Vec::new();
        let mut total = 0;
        let mut loaded = 0;
        let mut failed = 0;

        for source in sources {
            let source_name = source.source_name().to_string();
            if ignore.iter().any(|n| n == &source_name) {
                debug!("ignoring module source {}", source_name);
                continue;
            }
            total += 1;

            let descriptor = match source.describe() {
                Ok(descriptor) => {
                    loaded += 1;
                    descriptor
                }
                Err(e) => {
                    warn!("metadata extraction failed for {}: {}", source_name, e);
                    failed += 1;
                    errors.push((source_name.clone(), e.to_string()));
                    ModuleDescriptor::failed(&source_name, e.to_string())
                }
            };

            let name = descriptor.name.clone();
            if next.descriptors.contains_key(&name) {
                warn!("duplicate module name {}, replacing earlier source", name);
            }
            if descriptor.status == ModuleStatus::Loaded {
                next.graph.add(&descriptor);
            }
            for category in &descriptor.categories {
                next.by_category
                    .entry(category.clone())
                    .or_default()
                    .insert(name.clone());
            }
            for flag in &descriptor.flags {
                next.by_flag
                    .entry(flag.clone())
                    .or_default()
                    .insert(name.clone());
            }
            for use_case in &descriptor.use_cases {
                next.by_use_case
                    .entry(use_case.clone())
                    .or_default()
                    .insert(name.clone());
            }
            next.sources.insert(name.clone(), Arc::clone(source));
            next.descriptors.insert(name, Arc::new(descriptor));
        }

        next.graph.rebuild_edges();
        let result = DiscoveryResult {
            total,
            loaded,
            failed,
            errors,
            duration: started.elapsed(),
        };

        *self.write() = next;
        info!(
            total = result.total,
            loaded = result.loaded,
            failed = result.failed,
            "module discovery complete"
        );
        result
    }

    /// Descriptor by name.
    pub fn get(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.read().descriptors.get(name).cloned()
    }

    /// Source by name, regardless of descriptor status.
    pub fn source_of(&self, name: &str) -> Option<Arc<dyn ModuleSource>> {
        self.read().sources.get(name).cloned()
    }

    /// Every catalogued module name, ascending.
    pub fn list_names(&self) -> Vec<String> {
        self.read().descriptors.keys().cloned().collect()
    }

    /// Names of runnable modules.
    pub fn list_loaded(&self) -> Vec<String> {
        self.list_by_status(ModuleStatus::Loaded)
    }

    /// Names of modules whose extraction failed.
    pub fn list_failed(&self) -> Vec<String> {
        self.list_by_status(ModuleStatus::Failed)
    }

    fn list_by_status(&self, status: ModuleStatus) -> Vec<String> {
        self.read()
            .descriptors
            .values()
            .filter(|d| d.status == status)
            .map(|d| d.name.clone())
            .collect()
    }

    /// Modules producing the event type, name-sorted.
    pub fn producers_of(&self, event_type: &str) -> Vec<String> {
        self.read().graph.producers_of(event_type)
    }

    /// Modules watching the event type, name-sorted.
    pub fn consumers_of(&self, event_type: &str) -> Vec<String> {
        self.read().graph.consumers_of(event_type)
    }

    /// Union of every watched and produced event type.
    pub fn all_event_types(&self) -> BTreeSet<String> {
        self.read().graph.all_event_types()
    }

    /// Modules carrying the category tag.
    pub fn by_category(&self, category: &str) -> Vec<String> {
        names_for(&self.read().by_category, category)
    }

    /// Modules carrying the behavior flag.
    pub fn by_flag(&self, flag: &str) -> Vec<String> {
        names_for(&self.read().by_flag, flag)
    }

    /// Modules carrying the use-case tag.
    pub fn by_use_case(&self, use_case: &str) -> Vec<String> {
        names_for(&self.read().by_use_case, use_case)
    }

    /// Category tag histogram: tag -> module count.
    pub fn categories(&self) -> BTreeMap<String, usize> {
        self.read()
            .by_category
            .iter()
            .map(|(tag, modules)| (tag.clone(), modules.len()))
            .collect()
    }

    /// Behavior flag histogram: flag -> module count.
    pub fn flags(&self) -> BTreeMap<String, usize> {
        self.read()
            .by_flag
            .iter()
            .map(|(flag, modules)| (flag.clone(), modules.len()))
            .collect()
    }

    /// Substring search over name/display name/summary, narrowed by
    /// set-intersection filters.
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Vec<Arc<ModuleDescriptor>> {
        let needle = query.to_ascii_lowercase();
        let catalogue = self.read();
        catalogue
            .descriptors
            .values()
            .filter(|d| {
                needle.is_empty()
                    || d.name.to_ascii_lowercase().contains(&needle)
                    || d.display_name.to_ascii_lowercase().contains(&needle)
                    || d.summary.to_ascii_lowercase().contains(&needle)
            })
            .filter(|d| intersects(&d.categories, &filter.categories))
            .filter(|d| intersects(&d.flags, &filter.flags))
            .filter(|d| intersects(&d.use_cases, &filter.use_cases))
            .filter(|d| match &filter.author {
                Some(author) => d.author.eq_ignore_ascii_case(author),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Catalogue counters.
    pub fn stats(&self) -> RegistryStats {
        let catalogue = self.read();
        let count = |status: ModuleStatus| {
            catalogue
                .descriptors
                .values()
                .filter(|d| d.status == status)
                .count()
        };
        RegistryStats {
            total: catalogue.descriptors.len(),
            loaded: count(ModuleStatus::Loaded),
            failed: count(ModuleStatus::Failed),
            disabled: count(ModuleStatus::Disabled),
            event_types: catalogue.graph.all_event_types().len(),
            edges: catalogue.graph.edge_count(),
            categories: catalogue.by_category.len(),
            flags: catalogue.by_flag.len(),
        }
    }

    /// Edge list for diagnostics/visualization.
    pub fn export_edges(&self) -> Vec<GraphEdge> {
        self.read().graph.export_edges()
    }

    /// Clone of the current graph snapshot, for resolution work outside the
    /// lock.
    pub fn graph(&self) -> EventGraph {
        self.read().graph.clone()
    }

    /// Resolve a selection over the current snapshot.
    pub fn resolve(
        &self,
        target_events: &[String],
        required_modules: &[String],
        excluded_modules: &[String],
    ) -> ResolutionResult {
        self.read()
            .graph
            .resolve(target_events, required_modules, excluded_modules)
    }

    /// Minimal module set able to reach the desired output types.
    pub fn resolve_for_output(&self, desired: &[String]) -> BTreeSet<String> {
        self.read().graph.resolve_for_output(desired)
    }

    /// Status-gated instantiation without lifecycle hooks. Used by the
    /// loader's registry strategy.
    pub fn instantiate_checked(&self, name: &str) -> Result<Box<dyn Module>, ModuleError> {
        let (descriptor, source) = self.descriptor_and_source(name)?;
        match descriptor.status {
            ModuleStatus::Loaded => source.instantiate(),
            ModuleStatus::Failed => Err(ModuleError::FailedModule(format!(
                "{}: {}",
                name,
                descriptor.error.as_deref().unwrap_or("extraction failed")
            ))),
            ModuleStatus::Disabled => Err(ModuleError::DisabledModule(name.to_string())),
        }
    }

    /// Direct instantiation from the stored source, bypassing status
    /// checks. Legacy fallback path for the loader.
    pub fn instantiate_unchecked(&self, name: &str) -> Result<Box<dyn Module>, ModuleError> {
        let source = self
            .source_of(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        source.instantiate()
    }

    /// The sole descriptor-to-live-instance transition point for external
    /// callers: instantiate, configure with merged options, and optionally
    /// attach wiring.
    pub fn create_instance(
        &self,
        name: &str,
        options: Option<&BTreeMap<String, OptionValue>>,
        wiring: Option<ModuleWiring>,
    ) -> Result<Box<dyn Module>, ModuleError> {
        let (descriptor, _) = self.descriptor_and_source(name)?;
        let mut instance = self.instantiate_checked(name)?;
        let merged = match options {
            Some(overrides) => merge_options(&descriptor.opts, &[overrides]),
            None => descriptor.opts.clone(),
        };
        instance.configure(&merged)?;
        if let Some(wiring) = wiring {
            instance.attach(wiring)?;
        }
        Ok(instance)
    }

    fn descriptor_and_source(
        &self,
        name: &str,
    ) -> Result<(Arc<ModuleDescriptor>, Arc<dyn ModuleSource>), ModuleError> {
        let catalogue = self.read();
        let descriptor = catalogue
            .descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        let source = catalogue
            .sources
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        Ok((descriptor, source))
    }
}

fn names_for(multimap: &BTreeMap<String, BTreeSet<String>>, key: &str) -> Vec<String> {
    multimap
        .get(key)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

fn intersects(have: &BTreeSet<String>, want: &[String]) -> bool {
    want.is_empty() || want.iter().any(|tag| have.contains(tag))
}
