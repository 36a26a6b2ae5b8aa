//! Node model
//!
//! A `Node` is one transformation unit from the source project: a SQL
//! transform, a seed load, a snapshot, or a data test. Nodes are
//! created once per parse and treated as immutable afterwards; a new
//! parse produces a fresh set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Resource kind of a node (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// SQL transformation materialized into the warehouse
    Transform,

    /// Load of a seed file into a table
    SeedLoad,

    /// Point-in-time snapshot of a mutable table
    Snapshot,

    /// Data test validating an upstream node
    Test,
}

impl ResourceKind {
    /// Get the kind as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::SeedLoad => "seed_load",
            Self::Snapshot => "snapshot",
            Self::Test => "test",
        }
    }

    /// Map the external tool's resource-type label to a kind
    ///
    /// The tool reports `model`, `seed`, `snapshot` and `test`; other
    /// labels (macros, sources, exposures) have no node counterpart.
    pub fn from_tool_label(label: &str) -> Option<Self> {
        match label {
            "model" => Some(Self::Transform),
            "seed" => Some(Self::SeedLoad),
            "snapshot" => Some(Self::Snapshot),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single transformation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier, stable across runs (`kind.subproject.name`)
    pub unique_id: String,

    /// Node name (e.g. `orders`)
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Path to the defining file, relative to the project root
    pub path: PathBuf,

    /// Tags attached to the node
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Scalar configuration overrides (strategy, image, ...)
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Owning sub-project (package) for multi-project composition
    pub subproject: String,

    /// Unique ids of upstream nodes
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl Node {
    /// Create a node with the derived unique id and no metadata
    pub fn new(
        kind: ResourceKind,
        subproject: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let subproject = subproject.into();
        let name = name.into();

        Self {
            unique_id: format!("{}.{}.{}", kind.as_str(), subproject, name),
            name,
            kind,
            path: path.into(),
            tags: BTreeSet::new(),
            config: BTreeMap::new(),
            subproject,
            depends_on: BTreeSet::new(),
        }
    }

    /// Set the tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set a single configuration override
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Set the upstream dependencies by unique id
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Check whether the node carries a tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Reference to an upstream node, before graph resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamRef {
    /// Reference by unique id
    Id(String),

    /// Reference by a (kind, name) pair, resolved against the parse result
    Named { kind: ResourceKind, name: String },
}

impl UpstreamRef {
    /// Human-readable form for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Self::Id(id) => id.clone(),
            Self::Named { kind, name } => format!("{}:{}", kind, name),
        }
    }
}

/// A raw dependency edge produced by the parser
///
/// `node` depends on `upstream`. The graph builder resolves the
/// upstream reference to a node id or rejects it as dangling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEdge {
    /// Unique id of the dependent node
    pub node: String,

    /// Reference to the upstream node
    pub upstream: UpstreamRef,
}

impl RawEdge {
    /// Edge referencing the upstream by unique id
    pub fn by_id(node: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            upstream: UpstreamRef::Id(upstream.into()),
        }
    }

    /// Edge referencing the upstream by kind and name
    pub fn by_name(node: impl Into<String>, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            upstream: UpstreamRef::Named {
                kind,
                name: name.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_derivation() {
        let node = Node::new(ResourceKind::Transform, "analytics", "orders", "models/orders.sql");
        assert_eq!(node.unique_id, "transform.analytics.orders");
        assert_eq!(node.name, "orders");
    }

    #[test]
    fn builder_helpers() {
        let node = Node::new(ResourceKind::SeedLoad, "analytics", "countries", "seeds/countries.csv")
            .with_tags(["nightly", "static"])
            .with_config("strategy", "in-process")
            .with_depends_on(["transform.analytics.orders"]);

        assert!(node.has_tag("nightly"));
        assert_eq!(node.config.get("strategy").map(String::as_str), Some("in-process"));
        assert!(node.depends_on.contains("transform.analytics.orders"));
    }

    #[test]
    fn kind_labels_round_trip() {
        assert_eq!(ResourceKind::from_tool_label("model"), Some(ResourceKind::Transform));
        assert_eq!(ResourceKind::from_tool_label("seed"), Some(ResourceKind::SeedLoad));
        assert_eq!(ResourceKind::from_tool_label("macro"), None);
        assert_eq!(ResourceKind::Test.as_str(), "test");
    }
}
