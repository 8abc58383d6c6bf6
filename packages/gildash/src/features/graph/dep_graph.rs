//! File dependency graph
//!
//! Directed petgraph over file paths: an edge A → B means A depends on B.
//! Built from relation rows, queried for neighbors, reachability, affected
//! sets, fan metrics, and cycles. Self-edges are retained; a file importing
//! itself is a cycle of length one.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet};

use gildash_store::Relation;

/// Options for [`DependencyGraph::cycle_paths`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    /// Stop after producing this many cycles.
    pub max_cycles: Option<usize>,
}

/// Per-file fan counts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FanMetrics {
    pub file: String,
    pub fan_in: usize,
    pub fan_out: usize,
}

pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    path_to_node: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build from relation rows. Every src and dst becomes a node; each
    /// (src, dst) pair contributes at most one edge.
    pub fn build(relations: &[Relation]) -> Self {
        let mut graph = DiGraph::new();
        let mut path_to_node: HashMap<String, NodeIndex> = HashMap::new();
        let mut seen_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();

        let mut intern = |graph: &mut DiGraph<String, ()>,
                          path_to_node: &mut HashMap<String, NodeIndex>,
                          path: &str| {
            *path_to_node
                .entry(path.to_string())
                .or_insert_with(|| graph.add_node(path.to_string()))
        };

        for relation in relations {
            let src = intern(&mut graph, &mut path_to_node, &relation.src_file_path);
            let dst = intern(&mut graph, &mut path_to_node, &relation.dst_file_path);
            if seen_edges.insert((src, dst)) {
                graph.add_edge(src, dst, ());
            }
        }

        Self {
            graph,
            path_to_node,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Outgoing neighbors of `file`. Missing nodes yield an empty set.
    pub fn dependencies(&self, file: &str) -> Vec<String> {
        self.neighbors(file, Direction::Outgoing)
    }

    /// Incoming neighbors of `file`.
    pub fn dependents(&self, file: &str) -> Vec<String> {
        self.neighbors(file, Direction::Incoming)
    }

    fn neighbors(&self, file: &str, direction: Direction) -> Vec<String> {
        let Some(&node) = self.path_to_node.get(file) else {
            return Vec::new();
        };
        let mut paths: Vec<String> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|idx| self.graph[idx].clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Forward reachable set from `file`, excluding `file` itself unless a
    /// cycle leads back to it.
    pub fn transitive_dependencies(&self, file: &str) -> Vec<String> {
        let Some(&start) = self.path_to_node.get(file) else {
            return Vec::new();
        };
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(start, Direction::Outgoing)
            .collect();
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
        }
        visited.remove(&start);
        let mut paths: Vec<String> = visited.into_iter().map(|idx| self.graph[idx].clone()).collect();
        paths.sort();
        paths
    }

    /// The transitive set of dependents of `changed`, inclusive of `changed`.
    pub fn affected(&self, changed: &[String]) -> Vec<String> {
        let mut result: HashSet<String> = changed.iter().cloned().collect();
        let mut stack: Vec<NodeIndex> = changed
            .iter()
            .filter_map(|file| self.path_to_node.get(file))
            .copied()
            .collect();
        let mut visited: HashSet<NodeIndex> = stack.iter().copied().collect();
        while let Some(node) = stack.pop() {
            for dependent in self.graph.neighbors_directed(node, Direction::Incoming) {
                if visited.insert(dependent) {
                    result.insert(self.graph[dependent].clone());
                    stack.push(dependent);
                }
            }
        }
        let mut paths: Vec<String> = result.into_iter().collect();
        paths.sort();
        paths
    }

    /// True iff the graph contains any directed cycle (self-loops included).
    pub fn has_cycle(&self) -> bool {
        if self
            .graph
            .edge_references()
            .any(|edge| edge.source() == edge.target())
        {
            return true;
        }
        tarjan_scc(&self.graph).into_iter().any(|scc| scc.len() > 1)
    }

    /// Enumerate simple cycles as file-path sequences.
    ///
    /// Deterministic: nodes are considered in lexicographic path order and
    /// each cycle is reported exactly once, rooted at its lexicographically
    /// smallest member. Stable across calls for a fixed graph.
    pub fn cycle_paths(&self, options: CycleOptions) -> Vec<Vec<String>> {
        let mut order: Vec<(&String, NodeIndex)> = self
            .path_to_node
            .iter()
            .map(|(path, &idx)| (path, idx))
            .collect();
        order.sort_by(|a, b| a.0.cmp(b.0));
        let rank: HashMap<NodeIndex, usize> = order
            .iter()
            .enumerate()
            .map(|(rank, (_, idx))| (*idx, rank))
            .collect();

        let mut cycles = Vec::new();
        for (start_rank, (_, start)) in order.iter().enumerate() {
            if let Some(max) = options.max_cycles {
                if cycles.len() >= max {
                    return cycles;
                }
            }
            let mut path = vec![*start];
            let mut on_path: HashSet<NodeIndex> = [*start].into_iter().collect();
            self.find_cycles_from(
                *start,
                *start,
                start_rank,
                &rank,
                &mut path,
                &mut on_path,
                &mut cycles,
                options.max_cycles,
            );
        }
        cycles
    }

    /// Rooted DFS restricted to nodes ranked at or above the root, so every
    /// simple cycle appears once, at its smallest member.
    #[allow(clippy::too_many_arguments)]
    fn find_cycles_from(
        &self,
        root: NodeIndex,
        current: NodeIndex,
        root_rank: usize,
        rank: &HashMap<NodeIndex, usize>,
        path: &mut Vec<NodeIndex>,
        on_path: &mut HashSet<NodeIndex>,
        cycles: &mut Vec<Vec<String>>,
        max_cycles: Option<usize>,
    ) {
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(current, Direction::Outgoing)
            .collect();
        neighbors.sort_by_key(|idx| rank[idx]);
        neighbors.dedup();

        for next in neighbors {
            if let Some(max) = max_cycles {
                if cycles.len() >= max {
                    return;
                }
            }
            if next == root {
                cycles.push(path.iter().map(|idx| self.graph[*idx].clone()).collect());
                continue;
            }
            if rank[&next] <= root_rank || on_path.contains(&next) {
                continue;
            }
            path.push(next);
            on_path.insert(next);
            self.find_cycles_from(root, next, root_rank, rank, path, on_path, cycles, max_cycles);
            on_path.remove(&next);
            path.pop();
        }
    }

    /// A copy of the adjacency mapping, never the internal structure.
    pub fn adjacency(&self) -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();
        for (path, &node) in &self.path_to_node {
            let mut neighbors: Vec<String> = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .map(|idx| self.graph[idx].clone())
                .collect();
            neighbors.sort();
            neighbors.dedup();
            map.insert(path.clone(), neighbors);
        }
        map
    }

    pub fn fan_metrics(&self, file: &str) -> FanMetrics {
        FanMetrics {
            file: file.to_string(),
            fan_in: self.dependents(file).len(),
            fan_out: self.dependencies(file).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gildash_store::RelationType;

    fn imports(src: &str, dst: &str) -> Relation {
        Relation {
            project: "p".into(),
            rel_type: RelationType::Imports,
            src_file_path: src.into(),
            src_symbol_name: None,
            dst_file_path: dst.into(),
            dst_symbol_name: None,
            meta: serde_json::Value::Null,
        }
    }

    fn chain() -> DependencyGraph {
        DependencyGraph::build(&[imports("a.ts", "b.ts"), imports("b.ts", "c.ts")])
    }

    #[test]
    fn dependencies_and_dependents_are_directional() {
        let graph = chain();
        assert_eq!(graph.dependencies("a.ts"), vec!["b.ts"]);
        assert_eq!(graph.dependents("b.ts"), vec!["a.ts"]);
        assert!(graph.dependencies("c.ts").is_empty());
    }

    #[test]
    fn missing_nodes_yield_empty_sets() {
        let graph = chain();
        assert!(graph.dependencies("nope.ts").is_empty());
        assert!(graph.dependents("nope.ts").is_empty());
        assert!(graph.transitive_dependencies("nope.ts").is_empty());
    }

    #[test]
    fn transitive_dependencies_exclude_the_start() {
        let graph = chain();
        assert_eq!(graph.transitive_dependencies("a.ts"), vec!["b.ts", "c.ts"]);
    }

    #[test]
    fn transitive_terminates_on_cycles() {
        let graph = DependencyGraph::build(&[
            imports("a.ts", "b.ts"),
            imports("b.ts", "a.ts"),
        ]);
        assert_eq!(graph.transitive_dependencies("a.ts"), vec!["b.ts"]);
    }

    #[test]
    fn affected_includes_the_changed_set() {
        let graph = chain();
        assert_eq!(
            graph.affected(&["c.ts".to_string()]),
            vec!["a.ts", "b.ts", "c.ts"]
        );
        assert_eq!(graph.affected(&["a.ts".to_string()]), vec!["a.ts"]);
    }

    #[test]
    fn acyclic_graph_reports_no_cycles() {
        let graph = chain();
        assert!(!graph.has_cycle());
        assert!(graph.cycle_paths(CycleOptions::default()).is_empty());
    }

    #[test]
    fn three_node_cycle_is_found_once() {
        let graph = DependencyGraph::build(&[
            imports("a.ts", "b.ts"),
            imports("b.ts", "c.ts"),
            imports("c.ts", "a.ts"),
        ]);
        assert!(graph.has_cycle());
        let cycles = graph.cycle_paths(CycleOptions::default());
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a.ts", "b.ts", "c.ts"]);

        let capped = graph.cycle_paths(CycleOptions {
            max_cycles: Some(1),
        });
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn self_import_is_a_cycle_of_length_one() {
        let graph = DependencyGraph::build(&[imports("a.ts", "a.ts")]);
        assert!(graph.has_cycle());
        let cycles = graph.cycle_paths(CycleOptions::default());
        assert_eq!(cycles, vec![vec!["a.ts".to_string()]]);
    }

    #[test]
    fn cycle_enumeration_is_stable() {
        let graph = DependencyGraph::build(&[
            imports("a.ts", "b.ts"),
            imports("b.ts", "a.ts"),
            imports("c.ts", "d.ts"),
            imports("d.ts", "c.ts"),
        ]);
        let first = graph.cycle_paths(CycleOptions::default());
        let second = graph.cycle_paths(CycleOptions::default());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], vec!["a.ts", "b.ts"]);
        assert_eq!(first[1], vec!["c.ts", "d.ts"]);
    }

    #[test]
    fn adjacency_is_a_copy() {
        let graph = chain();
        let mut adjacency = graph.adjacency();
        adjacency.get_mut("a.ts").unwrap().clear();
        assert_eq!(graph.dependencies("a.ts"), vec!["b.ts"]);
    }

    #[test]
    fn fan_metrics_count_neighbors() {
        let graph = DependencyGraph::build(&[
            imports("a.ts", "shared.ts"),
            imports("b.ts", "shared.ts"),
            imports("shared.ts", "util.ts"),
        ]);
        let metrics = graph.fan_metrics("shared.ts");
        assert_eq!(metrics.fan_in, 2);
        assert_eq!(metrics.fan_out, 1);
    }
}
