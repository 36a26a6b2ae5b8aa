//! dbt project parsing and DAG construction
//!
//! This crate handles:
//! - Loading project metadata (precompiled manifest, tool listing, or
//!   a direct scan of the project files)
//! - Building the validated dependency graph (DAG)
//! - Upstream/downstream traversals and topological ordering

pub mod graph;
pub mod listing;
pub mod loader;
pub mod manifest;
pub mod project;

pub use graph::{Graph, GraphError};
pub use listing::ToolListing;
pub use loader::{LoadStrategy, ParseError, ParsedProject, ProjectLoader};
pub use manifest::{DependsOn, Manifest, ManifestMetadata, ManifestNode};
pub use project::ProjectFiles;
