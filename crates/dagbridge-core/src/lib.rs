//! dagbridge core
//!
//! Shared domain model for the graph-construction and rendering
//! pipeline:
//! - Node model (one transformation unit per node)
//! - Configuration surface (dagbridge.toml)
//! - Warning registry (accumulated, never thrown)

pub mod config;
pub mod node;
pub mod warning;

pub use config::{
    Config, ConfigError, ExecutionConfig, StrategyKind, StrategySpec, ValidationMode,
};
pub use node::{Node, RawEdge, ResourceKind, UpstreamRef};
pub use warning::RenderWarning;
