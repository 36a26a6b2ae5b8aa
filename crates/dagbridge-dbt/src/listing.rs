//! Tool-invocation listing
//!
//! Runs the external tool's `ls` command with JSON output and converts
//! each emitted record into a node plus raw edges. The subprocess call
//! is the only side effect in the whole parsing layer.

use dagbridge_core::{Node, RawEdge, ResourceKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use crate::loader::{ParseError, ParsedProject};

/// One record of `ls --output json` (subset of emitted fields)
#[derive(Debug, Clone, Deserialize)]
struct ListingRecord {
    name: String,
    resource_type: String,
    package_name: String,
    #[serde(default)]
    original_file_path: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    config: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    depends_on: ListingDependsOn,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListingDependsOn {
    #[serde(default)]
    nodes: Vec<String>,
}

/// Invokes the external tool's listing command
#[derive(Debug, Clone)]
pub struct ToolListing {
    executable: PathBuf,
    project_dir: PathBuf,
}

impl ToolListing {
    /// Listing invocation for a project directory
    pub fn new(executable: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            project_dir: project_dir.into(),
        }
    }

    /// Run the listing command and parse its output
    pub fn run(&self) -> Result<ParsedProject, ParseError> {
        tracing::debug!(
            executable = %self.executable.display(),
            project_dir = %self.project_dir.display(),
            "invoking tool listing"
        );

        let output = Command::new(&self.executable)
            .args(["ls", "--output", "json"])
            .current_dir(&self.project_dir)
            .output()
            .map_err(|e| ParseError::ToolInvocationFailed {
                status: None,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ParseError::ToolInvocationFailed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_output(&stdout)
    }

    /// Parse the line-oriented listing output
    ///
    /// Lines that are not JSON objects are log noise from the tool and
    /// are skipped; a line that looks like JSON but fails to
    /// deserialize is an error.
    pub fn parse_output(stdout: &str) -> Result<ParsedProject, ParseError> {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        // External unique id -> internal id, filled as records stream in;
        // listing output is topologically unordered, so collect first.
        let mut records = Vec::new();

        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if !line.starts_with('{') {
                tracing::debug!(line, "skipping non-record listing line");
                continue;
            }

            let record: ListingRecord =
                serde_json::from_str(line).map_err(|e| ParseError::ToolOutputUnparseable {
                    line: line.to_string(),
                    reason: e.to_string(),
                })?;

            records.push(record);
        }

        let mut id_map = BTreeMap::new();
        let mut kept = Vec::new();

        for record in records {
            let Some(kind) = ResourceKind::from_tool_label(&record.resource_type) else {
                tracing::debug!(
                    name = %record.name,
                    resource_type = %record.resource_type,
                    "skipping listing record with no node counterpart"
                );
                continue;
            };

            let external_id = format!("{}.{}.{}", record.resource_type, record.package_name, record.name);
            let node = Node::new(
                kind,
                record.package_name.as_str(),
                record.name.as_str(),
                record.original_file_path.as_str(),
            )
            .with_tags(record.tags.iter().cloned());

            let node = record
                .config
                .iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::String(s) => Some((k.clone(), s.clone())),
                    serde_json::Value::Bool(b) => Some((k.clone(), b.to_string())),
                    serde_json::Value::Number(n) => Some((k.clone(), n.to_string())),
                    _ => None,
                })
                .fold(node, |node, (k, v)| node.with_config(k, v));

            id_map.insert(external_id, node.unique_id.clone());
            kept.push((node, record.depends_on.nodes));
        }

        for (node, deps) in kept {
            for dep in deps {
                match id_map.get(&dep) {
                    Some(internal) => edges.push(RawEdge::by_id(&node.unique_id, internal)),
                    None => tracing::debug!(
                        node = %node.unique_id,
                        upstream = %dep,
                        "dropping dependency on a non-schedulable record"
                    ),
                }
            }
            nodes.push(node);
        }

        Ok(ParsedProject { nodes, edges })
    }
}
