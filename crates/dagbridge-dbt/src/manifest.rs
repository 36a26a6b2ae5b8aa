//! Precompiled manifest parsing
//!
//! Deserializes the external tool's manifest.json (subset of fields we
//! care about) and converts its records into nodes plus raw edges.
//! The manifest schema is an external contract owned by the upstream
//! tool; unknown fields are ignored rather than rejected.

use dagbridge_core::{Node, RawEdge, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::loader::{ParseError, ParsedProject};

/// Manifest document (subset of the upstream schema)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata about the manifest
    pub metadata: ManifestMetadata,

    /// Model, seed, snapshot and test records keyed by unique id
    pub nodes: HashMap<String, ManifestNode>,
}

/// Manifest metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub dbt_schema_version: String,
    pub dbt_version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub invocation_id: Option<String>,
}

/// A single manifest record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g. `model.my_project.users`)
    pub unique_id: String,

    /// Node name (e.g. `users`)
    pub name: String,

    /// Resource type (model, seed, snapshot, test, ...)
    pub resource_type: String,

    /// Owning package
    pub package_name: String,

    /// Relative path to the defining file
    pub path: String,

    /// Tags attached to the node
    #[serde(default)]
    pub tags: Vec<String>,

    /// Node configuration (scalar entries only are kept)
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,

    /// Dependencies
    #[serde(default)]
    pub depends_on: DependsOn,
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// Unique ids of upstream records
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        if !path.exists() {
            return Err(ParseError::MissingManifest {
                path: path.to_path_buf(),
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ParseError::Io(e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse manifest from JSON string
    pub fn from_str(json: &str) -> Result<Self, ParseError> {
        serde_json::from_str(json).map_err(|e| ParseError::MalformedManifest(e.to_string()))
    }

    /// Get a specific record by unique id
    pub fn get_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }

    /// Convert the manifest into nodes plus raw edges
    ///
    /// Records whose resource type has no node counterpart (sources,
    /// macros, exposures) are dropped, as are dependency references to
    /// them. Node ids are re-derived so they are stable regardless of
    /// the manifest's own id scheme.
    pub fn into_parsed_project(self) -> ParsedProject {
        // External unique id -> internal node id, for records that
        // survive the kind filter.
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut records: Vec<(ManifestNode, ResourceKind)> = Vec::new();

        let mut manifest_nodes: Vec<ManifestNode> = self.nodes.into_values().collect();
        manifest_nodes.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));

        for record in manifest_nodes {
            match ResourceKind::from_tool_label(&record.resource_type) {
                Some(kind) => {
                    let node = Node::new(kind, record.package_name.as_str(), record.name.as_str(), "");
                    id_map.insert(record.unique_id.clone(), node.unique_id);
                    records.push((record, kind));
                }
                None => {
                    tracing::debug!(
                        unique_id = %record.unique_id,
                        resource_type = %record.resource_type,
                        "skipping record with no node counterpart"
                    );
                }
            }
        }

        let mut nodes = Vec::with_capacity(records.len());
        let mut edges = Vec::new();

        for (record, kind) in records {
            let node = Node::new(
                kind,
                record.package_name.as_str(),
                record.name.as_str(),
                PathBuf::from(&record.path),
            )
            .with_tags(record.tags.iter().cloned());

            let node = record
                .config
                .iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
                .fold(node, |node, (k, v)| node.with_config(k, v));

            for dep in &record.depends_on.nodes {
                match id_map.get(dep) {
                    Some(internal) => edges.push(RawEdge::by_id(&node.unique_id, internal)),
                    None => {
                        tracing::debug!(
                            node = %node.unique_id,
                            upstream = %dep,
                            "dropping dependency on a non-schedulable record"
                        );
                    }
                }
            }

            nodes.push(node);
        }

        ParsedProject { nodes, edges }
    }
}

/// Keep scalar config values, stringified; drop nested structures
fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
