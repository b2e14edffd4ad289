//! Dependency resolution over the event graph
//!
//! Topological ordering with deterministic tie-breaking, iterative cycle
//! enumeration, backward-reachability minimal sets, and the `resolve` entry
//! point that classifies a selection as Ok, MissingDeps, or Circular.
//! Missing and circular dependencies are data, not errors.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use super::index::EventGraph;
use crate::module::traits::{SEED_EVENT, WILDCARD_EVENT};

/// Outcome classification for [`EventGraph::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionStatus {
    /// Selection is orderable and every watched type has a producer.
    Ok,
    /// At least one watched or requested type has no producer anywhere.
    MissingDeps,
    /// The selection's induced subgraph contains at least one cycle.
    Circular,
}

/// Result of one resolution pass over a catalogue snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionResult {
    /// Classification of the selection
    pub status: ResolutionStatus,
    /// Modules the resolution selected
    pub selected: BTreeSet<String>,
    /// Topologically valid order over the selection (empty on MissingDeps;
    /// on Circular, cyclic members are appended name-sorted so the order is
    /// still a total permutation)
    pub load_order: Vec<String>,
    /// Event types with no producer anywhere
    pub missing_events: Vec<String>,
    /// Enumerated circular chains; overlapping cycles may all be reported
    pub cycles: Vec<Vec<String>>,
    /// Selected module count
    pub module_count: usize,
    /// Edge count within the selection
    pub edge_count: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Unvisited,
    OnStack,
    Done,
}

impl EventGraph {
    /// Backward-reachability closure: every producer of a desired type plus,
    /// transitively, each member's dependencies.
    ///
    /// "Minimal" means no module outside the closure can contribute, not
    /// that every member provably fires at runtime (a module may drop
    /// events based on content). Unknown or empty input yields the empty
    /// set; callers must interpret that explicitly.
    pub fn resolve_for_output(&self, desired: &[String]) -> BTreeSet<String> {
        let mut selected = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        for event in desired {
            for producer in self.producers_of(event) {
                if selected.insert(producer.clone()) {
                    queue.push_back(producer);
                }
            }
        }
        while let Some(module) = queue.pop_front() {
            for dep in self.dependencies_of(&module) {
                if selected.insert(dep.clone()) {
                    queue.push_back(dep);
                }
            }
        }
        selected
    }

    /// Topological order over every indexed module.
    ///
    /// Returns the order plus the count of modules that sat inside a cycle
    /// and were appended name-sorted; the order is always a total
    /// permutation of the module set.
    pub fn topological_order(&self) -> (Vec<String>, usize) {
        self.topological_order_for(&self.modules())
    }

    /// Topological order restricted to the given module set.
    ///
    /// Kahn's algorithm over in-degree from current edges; ties among
    /// simultaneously-ready modules are broken by ascending name. Cycle
    /// members are appended name-sorted.
    pub fn topological_order_for(&self, within: &BTreeSet<String>) -> (Vec<String>, usize) {
        let nodes: BTreeSet<&str> = within
            .iter()
            .map(String::as_str)
            .filter(|m| self.contains(m))
            .collect();

        let mut in_degree: BTreeMap<&str, usize> = nodes.iter().map(|&m| (m, 0)).collect();
        for &producer in &nodes {
            if let Some(consumers) = self.dependents_set(producer) {
                for consumer in consumers {
                    if let Some(degree) = in_degree.get_mut(consumer.as_str()) {
                        *degree += 1;
                    }
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&m, _)| m)
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(nodes.len());
        let mut placed: BTreeSet<&str> = BTreeSet::new();

        while let Some(&module) = ready.iter().next() {
            ready.remove(module);
            placed.insert(module);
            order.push(module.to_string());
            if let Some(consumers) = self.dependents_set(module) {
                for consumer in consumers {
                    if let Some(degree) = in_degree.get_mut(consumer.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(consumer.as_str());
                        }
                    }
                }
            }
        }

        let leftover: Vec<&str> = nodes.difference(&placed).copied().collect();
        let cyclic = leftover.len();
        order.extend(leftover.into_iter().map(String::from));
        (order, cyclic)
    }

    /// Enumerate cycles over every indexed module.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        self.detect_cycles_for(&self.modules())
    }

    /// Enumerate cycles within the induced subgraph of the given set.
    ///
    /// Iterative DFS with an explicit frame stack (no recursion-depth limit
    /// on large graphs); traversal visits nodes and successors in ascending
    /// name order so reported cycles are reproducible. Every back-edge
    /// yields one reported path; overlapping cycles may all appear.
    pub fn detect_cycles_for(&self, within: &BTreeSet<String>) -> Vec<Vec<String>> {
        let nodes: Vec<&str> = within
            .iter()
            .map(String::as_str)
            .filter(|m| self.contains(m))
            .collect();
        let node_set: BTreeSet<&str> = nodes.iter().copied().collect();
        let mut state: BTreeMap<&str, VisitState> = nodes
            .iter()
            .map(|&m| (m, VisitState::Unvisited))
            .collect();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        for &start in &nodes {
            if state[start] != VisitState::Unvisited {
                continue;
            }
            // frame: (node, sorted successors, next successor index)
            let mut stack: Vec<(&str, Vec<&str>, usize)> = Vec::new();
            let mut path: Vec<&str> = Vec::new();

            state.insert(start, VisitState::OnStack);
            stack.push((start, self.successors_in(start, &node_set), 0));
            path.push(start);

            loop {
                let next = {
                    let Some(frame) = stack.last_mut() else { break };
                    if frame.2 < frame.1.len() {
                        let next = frame.1[frame.2];
                        frame.2 += 1;
                        Some(next)
                    } else {
                        None
                    }
                };
                match next {
                    Some(next) => match state[next] {
                        VisitState::Unvisited => {
                            state.insert(next, VisitState::OnStack);
                            stack.push((next, self.successors_in(next, &node_set), 0));
                            path.push(next);
                        }
                        VisitState::OnStack => {
                            // back-edge: the chain from `next` around to here
                            if let Some(pos) = path.iter().position(|&n| n == next) {
                                let mut cycle: Vec<String> =
                                    path[pos..].iter().map(|&n| n.to_string()).collect();
                                cycle.push(next.to_string());
                                cycles.push(cycle);
                            }
                        }
                        VisitState::Done => {}
                    },
                    None => {
                        if let Some((node, _, _)) = stack.pop() {
                            state.insert(node, VisitState::Done);
                            path.pop();
                        }
                    }
                }
            }
        }
        cycles
    }

    fn successors_in<'a>(&'a self, module: &str, within: &BTreeSet<&'a str>) -> Vec<&'a str> {
        self.dependents_set(module)
            .map(|set| {
                set.iter()
                    .filter_map(|c| within.get(c.as_str()).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compute the selected module set for the given targets and
    /// constraints, verify producer coverage, and classify the outcome.
    ///
    /// Selection is the backward closure of `target_events` union
    /// `required_modules`, minus `excluded_modules`; with no targets and no
    /// required modules the whole catalogue is selected. A watched event
    /// with no producer anywhere counts as missing, except the synthetic
    /// seed event and the wildcard; a target event with no producer
    /// anywhere is itself missing.
    pub fn resolve(
        &self,
        target_events: &[String],
        required_modules: &[String],
        excluded_modules: &[String],
    ) -> ResolutionResult {
        let mut selected: BTreeSet<String> =
            if target_events.is_empty() && required_modules.is_empty() {
                self.modules()
            } else {
                let mut closure = self.resolve_for_output(target_events);
                for name in required_modules {
                    if self.contains(name) {
                        closure.insert(name.clone());
                    }
                }
                closure
            };
        for name in excluded_modules {
            selected.remove(name);
        }

        let mut missing: BTreeSet<String> = BTreeSet::new();
        for event in target_events {
            if self.producers_of(event).is_empty() {
                missing.insert(event.clone());
            }
        }
        for module in &selected {
            if let Some(watched) = self.watched_of(module) {
                for event in watched {
                    if event == SEED_EVENT || event == WILDCARD_EVENT {
                        continue;
                    }
                    if self.producers_of(event).is_empty() {
                        missing.insert(event.clone());
                    }
                }
            }
        }

        let edge_count = selected
            .iter()
            .map(|m| {
                self.dependents_set(m)
                    .map(|set| set.iter().filter(|c| selected.contains(*c)).count())
                    .unwrap_or(0)
            })
            .sum();

        if !missing.is_empty() {
            debug!(missing = missing.len(), "resolution found unsatisfiable event types");
            return ResolutionResult {
                status: ResolutionStatus::MissingDeps,
                module_count: selected.len(),
                selected,
                load_order: Vec::new(),
                missing_events: missing.into_iter().collect(),
                cycles: Vec::new(),
                edge_count,
            };
        }

        let cycles = self.detect_cycles_for(&selected);
        let (load_order, cyclic) = self.topological_order_for(&selected);
        let status = if cycles.is_empty() {
            ResolutionStatus::Ok
        } else {
            ResolutionStatus::Circular
        };
        debug!(
            modules = selected.len(),
            cyclic,
            ?status,
            "resolution complete"
        );
        ResolutionResult {
            status,
            module_count: selected.len(),
            selected,
            load_order,
            missing_events: Vec::new(),
            cycles,
            edge_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::traits::ModuleDescriptor;

    fn descriptor(name: &str, watched: &[&str], produced: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor::new(name).with_events(watched.iter().copied(), produced.iter().copied())
    }

    fn graph(descriptors: &[ModuleDescriptor]) -> EventGraph {
        let mut graph = EventGraph::new();
        for d in descriptors {
            graph.add(d);
        }
        graph.rebuild_edges();
        graph
    }

    fn chain() -> EventGraph {
        graph(&[
            descriptor("resolver", &["DOMAIN"], &["IP"]),
            descriptor("geo", &["IP"], &["GEO"]),
            descriptor("vuln", &["IP", "GEO"], &["CVE"]),
        ])
    }

    #[test]
    fn minimal_set_covers_transitive_producers() {
        let g = chain();
        let set = g.resolve_for_output(&["CVE".to_string()]);
        let expected: BTreeSet<String> = ["resolver", "geo", "vuln"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn minimal_set_unknown_type_is_empty_and_idempotent() {
        let g = chain();
        assert!(g.resolve_for_output(&["NOPE".to_string()]).is_empty());
        assert!(g.resolve_for_output(&[]).is_empty());
        let first = g.resolve_for_output(&["CVE".to_string()]);
        assert_eq!(first, g.resolve_for_output(&["CVE".to_string()]));
    }

    #[test]
    fn chain_orders_producers_first() {
        let g = chain();
        let (order, cyclic) = g.topological_order();
        assert_eq!(cyclic, 0);
        let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(pos("resolver") < pos("geo"));
        assert!(pos("geo") < pos("vuln"));
    }

    #[test]
    fn ready_ties_break_by_ascending_name() {
        let g = graph(&[
            descriptor("zeta", &[], &["Z"]),
            descriptor("alpha", &[], &["A"]),
            descriptor("mid", &["A", "Z"], &[]),
        ]);
        let (order, _) = g.topological_order();
        assert_eq!(order, vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn two_module_cycle_detected_and_still_ordered() {
        let g = graph(&[
            descriptor("a", &["Y"], &["X"]),
            descriptor("b", &["X"], &["Y"]),
        ]);
        let cycles = g.detect_cycles();
        assert!(!cycles.is_empty());
        assert!(cycles
            .iter()
            .any(|c| c.contains(&"a".to_string()) && c.contains(&"b".to_string())));

        let (order, cyclic) = g.topological_order();
        assert_eq!(cyclic, 2);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b"]);
    }

    #[test]
    fn resolve_unknown_target_reports_missing() {
        let g = chain();
        let result = g.resolve(&["UNKNOWN_TYPE".to_string()], &[], &[]);
        assert_eq!(result.status, ResolutionStatus::MissingDeps);
        assert!(result
            .missing_events
            .contains(&"UNKNOWN_TYPE".to_string()));
        assert!(result.load_order.is_empty());
    }

    fn seeded_chain() -> EventGraph {
        graph(&[
            descriptor("seed", &[SEED_EVENT], &["DOMAIN"]),
            descriptor("resolver", &["DOMAIN"], &["IP"]),
            descriptor("geo", &["IP"], &["GEO"]),
            descriptor("vuln", &["IP", "GEO"], &["CVE"]),
        ])
    }

    #[test]
    fn resolve_for_target_restricts_and_orders() {
        let g = graph(&[
            descriptor("seed", &[SEED_EVENT], &["DOMAIN"]),
            descriptor("resolver", &["DOMAIN"], &["IP"]),
            descriptor("geo", &["IP"], &["GEO"]),
            descriptor("vuln", &["IP", "GEO"], &["CVE"]),
            descriptor("web", &[SEED_EVENT], &["WEB_PAGE"]),
            descriptor("unrelated", &["WEB_PAGE"], &["LINK"]),
        ]);
        let result = g.resolve(&["CVE".to_string()], &[], &[]);
        assert_eq!(result.status, ResolutionStatus::Ok);
        assert!(!result.selected.contains("unrelated"));
        assert!(!result.selected.contains("web"));
        assert_eq!(result.load_order.len(), 4);
        let pos = |name: &str| result.load_order.iter().position(|m| m == name).unwrap();
        assert!(pos("seed") < pos("resolver"));
        assert!(pos("resolver") < pos("geo"));
        assert!(pos("geo") < pos("vuln"));
    }

    #[test]
    fn resolve_circular_selection_is_classified_with_total_order() {
        let g = graph(&[
            descriptor("a", &["Y"], &["X"]),
            descriptor("b", &["X"], &["Y"]),
        ]);
        let result = g.resolve(&[], &[], &[]);
        assert_eq!(result.status, ResolutionStatus::Circular);
        assert!(!result.cycles.is_empty());
        assert_eq!(result.load_order.len(), 2);
    }

    #[test]
    fn seed_event_is_never_missing() {
        let g = graph(&[descriptor("seeded", &[SEED_EVENT], &["IP"])]);
        let result = g.resolve(&[], &[], &[]);
        assert_eq!(result.status, ResolutionStatus::Ok);
    }

    #[test]
    fn excluded_modules_leave_selection() {
        let g = seeded_chain();
        let result = g.resolve(&["CVE".to_string()], &[], &["geo".to_string()]);
        // GEO still has a producer in the catalogue, so nothing is missing
        assert_eq!(result.status, ResolutionStatus::Ok);
        assert!(!result.selected.contains("geo"));
        assert!(!result.load_order.contains(&"geo".to_string()));
        assert_eq!(result.load_order.len(), 3);
    }

    #[test]
    fn dependencies_never_contain_self() {
        let g = graph(&[descriptor("loop", &["X"], &["X"])]);
        assert!(!g.dependencies_of("loop").contains("loop"));
    }
}
