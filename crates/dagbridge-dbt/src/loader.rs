//! Project loading front door
//!
//! A `ProjectLoader` turns a project root plus a load strategy into a
//! flat set of nodes and raw dependency edges. Loading is pure apart
//! from the external process call in the tool-listing strategy, and
//! idempotent: identical inputs yield identical nodes and edges.

use dagbridge_core::{Node, RawEdge};
use std::path::{Path, PathBuf};

use crate::listing::ToolListing;
use crate::manifest::Manifest;
use crate::project::ProjectFiles;

/// How project metadata is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Deserialize a precompiled manifest document
    Manifest {
        /// Manifest path, relative to the project root
        path: PathBuf,
    },

    /// Invoke the external tool's listing command
    ToolListing {
        /// Tool executable to invoke
        executable: PathBuf,
    },

    /// Scan the project files directly
    ProjectFiles,
}

/// Result of a parse: nodes plus unresolved dependency edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedProject {
    /// Parsed nodes
    pub nodes: Vec<Node>,

    /// Raw edges, resolved later by the graph builder
    pub edges: Vec<RawEdge>,
}

impl ParsedProject {
    /// Number of parsed nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the parse produced no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Parse error taxonomy; every variant is fatal to the whole run
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Manifest not found at {path}")]
    MissingManifest { path: PathBuf },

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Tool invocation failed (exit {status:?}): {stderr}")]
    ToolInvocationFailed {
        status: Option<i32>,
        stderr: String,
    },

    #[error("Unparseable tool output line {line:?}: {reason}")]
    ToolOutputUnparseable { line: String, reason: String },

    #[error("Invalid project file {path}: {reason}")]
    InvalidProjectFile { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Loads project metadata from one of the supported sources
#[derive(Debug, Clone)]
pub struct ProjectLoader {
    root: PathBuf,
}

impl ProjectLoader {
    /// Loader rooted at the project directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load nodes and raw edges using the given strategy
    pub fn load(&self, strategy: &LoadStrategy) -> Result<ParsedProject, ParseError> {
        match strategy {
            LoadStrategy::Manifest { path } => {
                let manifest_path = self.root.join(path);
                let manifest = Manifest::from_file(&manifest_path)?;
                Ok(manifest.into_parsed_project())
            }
            LoadStrategy::ToolListing { executable } => {
                ToolListing::new(executable, &self.root).run()
            }
            LoadStrategy::ProjectFiles => ProjectFiles::new(&self.root).parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_is_fatal() {
        let loader = ProjectLoader::new("/nonexistent/project");
        let err = loader
            .load(&LoadStrategy::Manifest {
                path: PathBuf::from("target/manifest.json"),
            })
            .unwrap_err();

        assert!(matches!(err, ParseError::MissingManifest { .. }));
    }
}
