//! Event-graph index
//!
//! Producer/consumer maps over one catalogue snapshot, plus the
//! module-to-dependents adjacency derived from them. Every producer/consumer
//! fact lives in exactly one of the two index maps; edges are recomputed in
//! full by `rebuild_edges`, never patched incrementally.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::module::traits::{ModuleDescriptor, WILDCARD_EVENT};

/// One derived producer-to-consumer edge, exported for diagnostics and
/// visualization only; never consulted on the runtime path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    /// Producing module
    pub from: String,
    /// Consuming module
    pub to: String,
}

/// Producer/consumer index and derived dependency adjacency.
///
/// A dependency edge exists from producer P to consumer C whenever P
/// produces an event type C watches and P != C, at most once per (P, C)
/// pair. Wildcard watchers are indexed under the literal `"*"` key and
/// derive no edges.
#[derive(Debug, Clone, Default)]
pub struct EventGraph {
    /// event type -> producing modules
    producers: BTreeMap<String, BTreeSet<String>>,
    /// event type -> watching modules (wildcard under `"*"`)
    consumers: BTreeMap<String, BTreeSet<String>>,
    /// module -> watched event types
    watched: BTreeMap<String, BTreeSet<String>>,
    /// module -> produced event types
    produced: BTreeMap<String, BTreeSet<String>>,
    /// producer module -> consumer modules, derived by `rebuild_edges`
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl EventGraph {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one descriptor. O(|watched| + |produced|). Call
    /// `rebuild_edges` after a batch of additions, before ordering queries.
    pub fn add(&mut self, descriptor: &ModuleDescriptor) {
        let name = descriptor.name.clone();
        for event in &descriptor.watched_events {
            self.consumers
                .entry(event.clone())
                .or_default()
                .insert(name.clone());
        }
        for event in &descriptor.produced_events {
            self.producers
                .entry(event.clone())
                .or_default()
                .insert(name.clone());
        }
        self.watched
            .insert(name.clone(), descriptor.watched_events.clone());
        self.produced
            .insert(name, descriptor.produced_events.clone());
    }

    /// Clear and recompute the adjacency from the index maps.
    ///
    /// Idempotent for a fixed descriptor set. A module never gets a
    /// self-edge even when it both produces and watches the same type.
    pub fn rebuild_edges(&mut self) {
        self.dependents.clear();
        for (event, producers) in &self.producers {
            if event == WILDCARD_EVENT {
                continue;
            }
            let Some(consumers) = self.consumers.get(event) else {
                continue;
            };
            for producer in producers {
                for consumer in consumers {
                    if producer == consumer {
                        continue;
                    }
                    self.dependents
                        .entry(producer.clone())
                        .or_default()
                        .insert(consumer.clone());
                }
            }
        }
        debug!(
            modules = self.module_count(),
            edges = self.edge_count(),
            "rebuilt dependency edges"
        );
    }

    /// Whether the module is indexed.
    pub fn contains(&self, module: &str) -> bool {
        self.watched.contains_key(module)
    }

    /// All indexed module names, ascending.
    pub fn modules(&self) -> BTreeSet<String> {
        self.watched.keys().cloned().collect()
    }

    /// Number of indexed modules.
    pub fn module_count(&self) -> usize {
        self.watched.len()
    }

    /// Number of derived edges.
    pub fn edge_count(&self) -> usize {
        self.dependents.values().map(BTreeSet::len).sum()
    }

    /// Modules producing the event type, name-sorted. Unknown type yields
    /// an empty list.
    pub fn producers_of(&self, event_type: &str) -> Vec<String> {
        self.producers
            .get(event_type)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Modules watching the event type, name-sorted. Unknown type yields an
    /// empty list.
    pub fn consumers_of(&self, event_type: &str) -> Vec<String> {
        self.consumers
            .get(event_type)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Union of every watched and produced event type.
    pub fn all_event_types(&self) -> BTreeSet<String> {
        self.producers
            .keys()
            .chain(self.consumers.keys())
            .cloned()
            .collect()
    }

    /// Watched event types of one module, if indexed.
    pub fn watched_of(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.watched.get(module)
    }

    /// Produced event types of one module, if indexed.
    pub fn produced_of(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.produced.get(module)
    }

    /// Direct successors in the derived adjacency, name-sorted.
    pub fn dependents_of(&self, module: &str) -> Vec<String> {
        self.dependents
            .get(module)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn dependents_set(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.dependents.get(module)
    }

    /// Modules whose produced events the module watches, excluding itself.
    /// The wildcard watch contributes no dependencies.
    pub fn dependencies_of(&self, module: &str) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        let Some(watched) = self.watched.get(module) else {
            return deps;
        };
        for event in watched {
            if event == WILDCARD_EVENT {
                continue;
            }
            if let Some(producers) = self.producers.get(event) {
                deps.extend(producers.iter().cloned());
            }
        }
        deps.remove(module);
        deps
    }

    /// Flat edge list for diagnostics/visualization.
    pub fn export_edges(&self) -> Vec<GraphEdge> {
        self.dependents
            .iter()
            .flat_map(|(from, tos)| {
                tos.iter().map(move |to| GraphEdge {
                    from: from.clone(),
                    to: to.clone(),
                })
            })
            .collect()
    }
}
