//! Node selection
//!
//! Filters the graph to a sub-graph using tag, path, kind and name
//! predicates plus set-algebra combinators. The string form follows
//! the external tool's select flags: within one expression, comma
//! means intersection and whitespace means union; a leading `+` pulls
//! in all ancestors of the matched nodes and a trailing `+` all
//! descendants.

use dagbridge_core::{Node, ResourceKind};
use dagbridge_dbt::Graph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Selection predicate (closed combinator set)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// Match every node
    All,

    /// Match nodes carrying the tag
    Tag(String),

    /// Match nodes whose path starts with the prefix
    PathPrefix(PathBuf),

    /// Match nodes of the kind
    Kind(ResourceKind),

    /// Match nodes whose name (or unique id) is listed
    Names(Vec<String>),

    /// Nodes matching any inner predicate
    Union(Vec<Predicate>),

    /// Nodes matching every inner predicate
    Intersect(Vec<Predicate>),

    /// Matched nodes plus all their ancestors
    UpstreamClosure(Box<Predicate>),

    /// Matched nodes plus all their descendants
    DownstreamClosure(Box<Predicate>),
}

/// Selector expression errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Empty selector expression")]
    Empty,

    #[error("Unknown resource kind '{0}' in selector")]
    UnknownKind(String),
}

impl Predicate {
    /// Parse an expression in the tool's select syntax
    ///
    /// `tag:nightly`, `path:models/staging`, `kind:transform`, a bare
    /// node name, `+name` (ancestors), `name+` (descendants);
    /// whitespace unions terms, a comma intersects them.
    pub fn parse(expr: &str) -> Result<Self, SelectorError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut terms = Vec::new();
        for term in expr.split_whitespace() {
            let mut atoms = Vec::new();
            for atom in term.split(',') {
                atoms.push(Self::parse_atom(atom)?);
            }
            terms.push(match atoms.len() {
                1 => atoms.into_iter().next().ok_or(SelectorError::Empty)?,
                _ => Predicate::Intersect(atoms),
            });
        }

        Ok(match terms.len() {
            1 => terms.into_iter().next().ok_or(SelectorError::Empty)?,
            _ => Predicate::Union(terms),
        })
    }

    fn parse_atom(atom: &str) -> Result<Self, SelectorError> {
        let atom = atom.trim();
        if atom.is_empty() {
            return Err(SelectorError::Empty);
        }

        if let Some(rest) = atom.strip_prefix('+') {
            return Ok(Predicate::UpstreamClosure(Box::new(Self::parse_atom(rest)?)));
        }
        if let Some(rest) = atom.strip_suffix('+') {
            return Ok(Predicate::DownstreamClosure(Box::new(Self::parse_atom(
                rest,
            )?)));
        }

        if let Some(tag) = atom.strip_prefix("tag:") {
            return Ok(Predicate::Tag(tag.to_string()));
        }
        if let Some(path) = atom.strip_prefix("path:") {
            return Ok(Predicate::PathPrefix(PathBuf::from(path)));
        }
        if let Some(kind) = atom.strip_prefix("kind:") {
            return match kind {
                "transform" => Ok(Predicate::Kind(ResourceKind::Transform)),
                "seed_load" | "seed" => Ok(Predicate::Kind(ResourceKind::SeedLoad)),
                "snapshot" => Ok(Predicate::Kind(ResourceKind::Snapshot)),
                "test" => Ok(Predicate::Kind(ResourceKind::Test)),
                other => Err(SelectorError::UnknownKind(other.to_string())),
            };
        }

        Ok(Predicate::Names(vec![atom.to_string()]))
    }

    fn matches(&self, node: &Node) -> bool {
        match self {
            Self::All => true,
            Self::Tag(tag) => node.has_tag(tag),
            Self::PathPrefix(prefix) => node.path.starts_with(prefix),
            Self::Kind(kind) => node.kind == *kind,
            Self::Names(names) => names
                .iter()
                .any(|n| *n == node.name || *n == node.unique_id),
            // Combinators are handled in eval
            Self::Union(_)
            | Self::Intersect(_)
            | Self::UpstreamClosure(_)
            | Self::DownstreamClosure(_) => false,
        }
    }

    fn eval(&self, graph: &Graph) -> BTreeSet<String> {
        match self {
            Self::Union(inner) => {
                let mut ids = BTreeSet::new();
                for predicate in inner {
                    ids.extend(predicate.eval(graph));
                }
                ids
            }
            Self::Intersect(inner) => {
                let mut sets = inner.iter().map(|p| p.eval(graph));
                let Some(first) = sets.next() else {
                    return BTreeSet::new();
                };
                sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
            }
            Self::UpstreamClosure(inner) => {
                let seeds = inner.eval(graph);
                let mut ids = seeds.clone();
                for seed in &seeds {
                    ids.extend(graph.upstream(seed));
                }
                ids
            }
            Self::DownstreamClosure(inner) => {
                let seeds = inner.eval(graph);
                let mut ids = seeds.clone();
                for seed in &seeds {
                    ids.extend(graph.downstream(seed));
                }
                ids
            }
            _ => graph
                .nodes()
                .filter(|n| self.matches(n))
                .map(|n| n.unique_id.clone())
                .collect(),
        }
    }
}

/// A filtered sub-graph: surviving node ids plus induced edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    node_ids: BTreeSet<String>,
    /// Induced upstream edges: node id -> surviving parents
    parents: BTreeMap<String, BTreeSet<String>>,
}

impl Selection {
    /// Surviving node ids, ordered
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.node_ids.iter().map(String::as_str)
    }

    /// Whether a node survived the predicate
    pub fn contains(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    /// Surviving parents of a selected node
    pub fn parents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Induced edges as (upstream, downstream) pairs, ordered
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .parents
            .iter()
            .flat_map(|(child, parents)| {
                parents.iter().map(move |p| (p.as_str(), child.as_str()))
            })
            .collect();
        edges.sort();
        edges
    }

    /// Number of surviving nodes
    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    /// Whether the predicate matched nothing
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

/// Filter the graph down to the nodes matching the predicate
///
/// An edge survives only when both endpoints survive. A predicate
/// matching zero nodes yields an empty, valid Selection.
pub fn select(graph: &Graph, predicate: &Predicate) -> Selection {
    let node_ids = predicate.eval(graph);

    let parents = node_ids
        .iter()
        .map(|id| {
            let surviving: BTreeSet<String> = graph
                .parents(id)
                .into_iter()
                .filter(|p| node_ids.contains(*p))
                .map(String::from)
                .collect();
            (id.clone(), surviving)
        })
        .collect();

    Selection { node_ids, parents }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagbridge_core::RawEdge;
    use pretty_assertions::assert_eq;

    fn sample_graph() -> Graph {
        // stg_orders -> orders -> report
        //                orders -> audit (tagged nightly)
        let nodes = vec![
            Node::new(ResourceKind::Transform, "shop", "stg_orders", "models/staging/stg_orders.sql")
                .with_tags(["staging"]),
            Node::new(ResourceKind::Transform, "shop", "orders", "models/orders.sql"),
            Node::new(ResourceKind::Transform, "shop", "report", "models/marts/report.sql"),
            Node::new(ResourceKind::Transform, "shop", "audit", "models/marts/audit.sql")
                .with_tags(["nightly"]),
            Node::new(ResourceKind::SeedLoad, "shop", "countries", "seeds/countries.csv"),
        ];
        let edges = vec![
            RawEdge::by_id("transform.shop.orders", "transform.shop.stg_orders"),
            RawEdge::by_id("transform.shop.report", "transform.shop.orders"),
            RawEdge::by_id("transform.shop.audit", "transform.shop.orders"),
        ];
        Graph::build(nodes, edges).unwrap()
    }

    #[test]
    fn match_everything_round_trips_the_graph() {
        let graph = sample_graph();
        let selection = select(&graph, &Predicate::All);

        let selected: Vec<&str> = selection.node_ids().collect();
        let all: Vec<&str> = graph.node_ids().collect();
        assert_eq!(selected, all);
        assert_eq!(selection.edges().len(), 3);
    }

    #[test]
    fn tag_and_kind_predicates() {
        let graph = sample_graph();

        let nightly = select(&graph, &Predicate::Tag("nightly".to_string()));
        assert_eq!(nightly.node_ids().collect::<Vec<_>>(), vec!["transform.shop.audit"]);

        let seeds = select(&graph, &Predicate::Kind(ResourceKind::SeedLoad));
        assert_eq!(seeds.len(), 1);
    }

    #[test]
    fn path_prefix_predicate() {
        let graph = sample_graph();
        let marts = select(&graph, &Predicate::PathPrefix(PathBuf::from("models/marts")));
        assert_eq!(marts.len(), 2);
    }

    #[test]
    fn induced_edges_require_both_endpoints() {
        let graph = sample_graph();
        // orders and report survive; the edge from stg_orders does not
        let selection = select(
            &graph,
            &Predicate::Names(vec!["orders".to_string(), "report".to_string()]),
        );

        assert_eq!(
            selection.edges(),
            vec![("transform.shop.orders", "transform.shop.report")]
        );
    }

    #[test]
    fn upstream_closure_is_reflexive_and_transitive() {
        let graph = sample_graph();
        let selection = select(
            &graph,
            &Predicate::UpstreamClosure(Box::new(Predicate::Names(vec!["report".to_string()]))),
        );

        assert!(selection.contains("transform.shop.report"));
        assert!(selection.contains("transform.shop.orders"));
        assert!(selection.contains("transform.shop.stg_orders"));
        assert!(!selection.contains("transform.shop.audit"));
    }

    #[test]
    fn downstream_closure() {
        let graph = sample_graph();
        let selection = select(
            &graph,
            &Predicate::DownstreamClosure(Box::new(Predicate::Names(vec![
                "orders".to_string()
            ]))),
        );

        assert!(selection.contains("transform.shop.orders"));
        assert!(selection.contains("transform.shop.report"));
        assert!(selection.contains("transform.shop.audit"));
        assert!(!selection.contains("transform.shop.stg_orders"));
    }

    #[test]
    fn zero_matches_is_an_empty_selection() {
        let graph = sample_graph();
        let selection = select(&graph, &Predicate::Tag("no-such-tag".to_string()));
        assert!(selection.is_empty());
        assert!(selection.edges().is_empty());
    }

    #[test]
    fn parse_select_syntax() {
        assert_eq!(
            Predicate::parse("tag:nightly").unwrap(),
            Predicate::Tag("nightly".to_string())
        );
        assert_eq!(
            Predicate::parse("+report").unwrap(),
            Predicate::UpstreamClosure(Box::new(Predicate::Names(vec!["report".to_string()])))
        );
        assert_eq!(
            Predicate::parse("orders+").unwrap(),
            Predicate::DownstreamClosure(Box::new(Predicate::Names(vec!["orders".to_string()])))
        );
        assert_eq!(
            Predicate::parse("tag:nightly,kind:transform").unwrap(),
            Predicate::Intersect(vec![
                Predicate::Tag("nightly".to_string()),
                Predicate::Kind(ResourceKind::Transform),
            ])
        );
        assert_eq!(
            Predicate::parse("orders report").unwrap(),
            Predicate::Union(vec![
                Predicate::Names(vec!["orders".to_string()]),
                Predicate::Names(vec!["report".to_string()]),
            ])
        );
        assert!(matches!(Predicate::parse("  "), Err(SelectorError::Empty)));
        assert!(matches!(
            Predicate::parse("kind:warehouse"),
            Err(SelectorError::UnknownKind(_))
        ));
    }
}
