//! Render warning registry
//!
//! Warnings are accumulated on the render result and surfaced to the
//! caller as a list; they are never raised as failures. Codes are
//! stable string identifiers.

use serde::{Deserialize, Serialize};

/// A non-fatal, node-scoped render outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderWarning {
    /// A node's strategy resolution or command build failed; the node
    /// was removed from the plan
    NodeSkipped {
        node_id: String,
        reason: String,
    },

    /// A node was removed because an upstream dependency it requires
    /// was skipped
    DependencySkipped {
        node_id: String,
        missing: String,
    },

    /// The selection matched zero nodes; the plan is empty
    EmptySelection,
}

impl RenderWarning {
    /// Get the warning code as a stable string identifier
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeSkipped { .. } => "NODE_SKIPPED",
            Self::DependencySkipped { .. } => "DEPENDENCY_SKIPPED",
            Self::EmptySelection => "EMPTY_SELECTION",
        }
    }

    /// Node the warning is about, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeSkipped { node_id, .. } | Self::DependencySkipped { node_id, .. } => {
                Some(node_id)
            }
            Self::EmptySelection => None,
        }
    }
}

impl std::fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeSkipped { node_id, reason } => {
                write!(f, "{} skipped: {}", node_id, reason)
            }
            Self::DependencySkipped { node_id, missing } => {
                write!(f, "{} skipped: upstream {} was not rendered", node_id, missing)
            }
            Self::EmptySelection => write!(f, "selection matched no nodes"),
        }
    }
}
