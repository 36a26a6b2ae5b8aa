//! Dependency graph construction and traversal
//!
//! Resolves raw edges against the parsed node set, validates the
//! result (no dangling references, no cycles), and exposes read-only
//! traversals. Successor lists are kept sorted by node id so renders
//! are reproducible across runs.

use dagbridge_core::{Node, RawEdge, ResourceKind, UpstreamRef};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Graph validation errors; an invalid graph cannot be rendered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Node {node} depends on unknown {reference}")]
    DanglingReference { node: String, reference: String },

    #[error("Dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Validated directed acyclic graph over nodes
///
/// Owned exclusively by the build step; everything downstream reads it
/// through shared references.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
    /// Inverse of `depends_on`, sorted by node id
    successors: BTreeMap<String, Vec<String>>,
}

impl Graph {
    /// Resolve raw edges and validate the graph
    pub fn build(nodes: Vec<Node>, raw_edges: Vec<RawEdge>) -> Result<Self, GraphError> {
        // (kind, name) index for named references
        let mut by_name: BTreeMap<(ResourceKind, &str), &str> = BTreeMap::new();
        for node in &nodes {
            by_name
                .entry((node.kind, node.name.as_str()))
                .or_insert(node.unique_id.as_str());
        }

        let ids: BTreeSet<String> = nodes.iter().map(|n| n.unique_id.clone()).collect();
        let mut resolved: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for edge in &raw_edges {
            if !ids.contains(&edge.node) {
                return Err(GraphError::DanglingReference {
                    node: edge.node.clone(),
                    reference: edge.node.clone(),
                });
            }

            let upstream = match &edge.upstream {
                UpstreamRef::Id(id) => {
                    if !ids.contains(id) {
                        return Err(GraphError::DanglingReference {
                            node: edge.node.clone(),
                            reference: id.clone(),
                        });
                    }
                    id.clone()
                }
                UpstreamRef::Named { kind, name } => match by_name.get(&(*kind, name.as_str())) {
                    Some(id) => (*id).to_string(),
                    None => {
                        return Err(GraphError::DanglingReference {
                            node: edge.node.clone(),
                            reference: edge.upstream.describe(),
                        });
                    }
                },
            };

            resolved.entry(edge.node.clone()).or_default().insert(upstream);
        }

        let mut node_map: BTreeMap<String, Node> = BTreeMap::new();
        for mut node in nodes {
            // Edges carried on the node itself (manifest parses fill
            // them via raw edges instead, so this is usually a no-op)
            let mut deps = std::mem::take(&mut node.depends_on);
            if let Some(extra) = resolved.remove(&node.unique_id) {
                deps.extend(extra);
            }
            for dep in &deps {
                if !ids.contains(dep) {
                    return Err(GraphError::DanglingReference {
                        node: node.unique_id.clone(),
                        reference: dep.clone(),
                    });
                }
            }
            node.depends_on = deps;
            node_map.insert(node.unique_id.clone(), node);
        }

        let mut successors: BTreeMap<String, Vec<String>> =
            node_map.keys().map(|id| (id.clone(), Vec::new())).collect();
        for node in node_map.values() {
            for dep in &node.depends_on {
                if let Some(children) = successors.get_mut(dep) {
                    children.push(node.unique_id.clone());
                }
            }
        }
        for children in successors.values_mut() {
            children.sort();
        }

        let graph = Self {
            nodes: node_map,
            successors,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Depth-first three-color cycle check over `depends_on` edges
    fn check_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: BTreeMap<&str, Color> =
            self.nodes.keys().map(|id| (id.as_str(), Color::White)).collect();

        // Iterative DFS; the stack holds (node, remaining deps) so the
        // gray path can be reconstructed when a back edge appears.
        for start in self.nodes.keys() {
            if colors[start.as_str()] != Color::White {
                continue;
            }

            let mut stack: Vec<(&str, Vec<&str>)> = vec![(
                start.as_str(),
                self.dep_list(start),
            )];
            colors.insert(start.as_str(), Color::Gray);

            while let Some((id, deps)) = stack.last_mut() {
                match deps.pop() {
                    Some(dep) => match colors[dep] {
                        Color::White => {
                            colors.insert(dep, Color::Gray);
                            let next = self.dep_list(dep);
                            stack.push((dep, next));
                        }
                        Color::Gray => {
                            // Back edge: the cycle is the gray path
                            // from `dep` down to the current node
                            let mut path: Vec<String> = stack
                                .iter()
                                .map(|(n, _)| (*n).to_string())
                                .skip_while(|n| n != dep)
                                .collect();
                            path.push(dep.to_string());
                            return Err(GraphError::Cycle { path });
                        }
                        Color::Black => {}
                    },
                    None => {
                        colors.insert(*id, Color::Black);
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    fn dep_list(&self, id: &str) -> Vec<&str> {
        self.nodes
            .get(id)
            .map(|n| n.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All nodes, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All node ids, ordered
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Look up a node by id
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate upstream ids of a node
    pub fn parents(&self, id: &str) -> Vec<&str> {
        self.nodes
            .get(id)
            .map(|n| n.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Immediate downstream ids of a node, sorted
    pub fn children(&self, id: &str) -> &[String] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All transitive ancestors of a node (the node itself excluded)
    pub fn upstream(&self, id: &str) -> BTreeSet<String> {
        self.walk(id, |g, n| g.parents(n))
    }

    /// All transitive descendants of a node (the node itself excluded)
    pub fn downstream(&self, id: &str) -> BTreeSet<String> {
        self.walk(id, |g, n| {
            g.children(n).iter().map(String::as_str).collect()
        })
    }

    fn walk<'a, F>(&'a self, id: &str, neighbours: F) -> BTreeSet<String>
    where
        F: Fn(&'a Self, &str) -> Vec<&'a str>,
    {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = neighbours(self, id).into();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.to_string()) {
                continue;
            }
            for next in neighbours(self, current) {
                if !visited.contains(next) {
                    queue.push_back(next);
                }
            }
        }

        visited
    }

    /// Dependency-respecting order over all nodes (Kahn's algorithm,
    /// lexicographically smallest ready node first)
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.as_str(), node.depends_on.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.iter().next().copied() {
            ready.remove(id);
            order.push(id.to_string());

            for child in self.children(id) {
                if let Some(degree) = in_degree.get_mut(child.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(child.as_str());
                    }
                }
            }
        }

        order
    }
}
