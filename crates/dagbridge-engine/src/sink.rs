//! Task sinks and the plan document (stable v1)
//!
//! A `TaskSink` is the registration boundary to the host orchestrator:
//! it accepts tasks in dependency order and only declares the graph,
//! never executes it. The JSON plan document is the stable output
//! format; breaking changes require a new version.

use dagbridge_core::RenderWarning;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::render::{RenderedTask, TaskPlan};

/// Registration errors reported by a sink
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Task {task_id} rejected: {reason}")]
    Rejected { task_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Accepts rendered tasks for a host orchestrator
pub trait TaskSink {
    /// Register one task; upstream tasks have already been registered
    fn register(&mut self, task: &RenderedTask) -> Result<(), SinkError>;
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Tasks in registration order
    pub registered: Vec<RenderedTask>,

    /// Task id to reject, for failure-path tests
    pub reject: Option<String>,
}

impl TaskSink for MemorySink {
    fn register(&mut self, task: &RenderedTask) -> Result<(), SinkError> {
        if self.reject.as_deref() == Some(task.task_id.as_str()) {
            return Err(SinkError::Rejected {
                task_id: task.task_id.clone(),
                reason: "rejected by sink".to_string(),
            });
        }

        self.registered.push(task.clone());
        Ok(())
    }
}

/// Plan document schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl PlanVersion {
    /// Current plan schema version
    pub const CURRENT: PlanVersion = PlanVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for PlanVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Total number of tasks
    pub total_tasks: usize,

    /// Tasks per resource kind
    pub transforms: usize,
    pub seed_loads: usize,
    pub snapshots: usize,
    pub tests: usize,

    /// Number of warnings (skipped nodes, empty selection)
    pub warnings: usize,
}

/// Plan document (plan.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    /// Schema version
    pub version: PlanVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: PlanSummary,

    /// Tasks in dependency order
    pub tasks: Vec<RenderedTask>,

    /// Accumulated warnings
    pub warnings: Vec<RenderWarning>,
}

impl PlanDocument {
    /// Build the document from a rendered plan
    pub fn from_plan(plan: &TaskPlan) -> Self {
        use dagbridge_core::ResourceKind;

        let count = |kind: ResourceKind| plan.tasks.iter().filter(|t| t.kind == kind).count();

        let summary = PlanSummary {
            total_tasks: plan.tasks.len(),
            transforms: count(ResourceKind::Transform),
            seed_loads: count(ResourceKind::SeedLoad),
            snapshots: count(ResourceKind::Snapshot),
            tests: count(ResourceKind::Test),
            warnings: plan.warnings.len(),
        };

        Self {
            version: PlanVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary,
            tasks: plan.tasks.clone(),
            warnings: plan.warnings.clone(),
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, SinkError> {
        serde_json::to_string_pretty(self).map_err(|e| SinkError::Io(e.to_string()))
    }

    /// Write the document to a file
    pub fn write_to(&self, path: &Path) -> Result<(), SinkError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| SinkError::Io(e.to_string()))
    }
}

/// Sink that accumulates tasks into a plan document
#[derive(Debug, Default)]
pub struct JsonPlanSink {
    tasks: Vec<RenderedTask>,
}

impl JsonPlanSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish registration and produce the versioned document
    pub fn finish(self, warnings: Vec<RenderWarning>) -> PlanDocument {
        let plan = TaskPlan {
            tasks: self.tasks,
            warnings,
        };
        PlanDocument::from_plan(&plan)
    }
}

impl TaskSink for JsonPlanSink {
    fn register(&mut self, task: &RenderedTask) -> Result<(), SinkError> {
        self.tasks.push(task.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Renderer;
    use crate::selector::{select, Predicate};
    use dagbridge_core::{Config, Node, RawEdge, ResourceKind};
    use dagbridge_dbt::Graph;
    use pretty_assertions::assert_eq;

    fn sample_plan() -> TaskPlan {
        let nodes = vec![
            Node::new(ResourceKind::SeedLoad, "shop", "countries", "seeds/countries.csv"),
            Node::new(ResourceKind::Transform, "shop", "orders", "models/orders.sql"),
        ];
        let edges = vec![RawEdge::by_id(
            "transform.shop.orders",
            "seed_load.shop.countries",
        )];
        let graph = Graph::build(nodes, edges).unwrap();
        let selection = select(&graph, &Predicate::All);
        Renderer::new(&graph, &Config::default()).render(&selection)
    }

    #[test]
    fn registration_preserves_dependency_order() {
        let plan = sample_plan();
        let mut sink = MemorySink::default();

        let registered = plan.register_all(&mut sink).unwrap();
        assert_eq!(registered, 2);
        assert_eq!(sink.registered[0].task_id, "seed_load.shop.countries");
        assert_eq!(sink.registered[1].task_id, "transform.shop.orders");
    }

    #[test]
    fn rejection_names_the_task() {
        let plan = sample_plan();
        let mut sink = MemorySink {
            reject: Some("transform.shop.orders".to_string()),
            ..MemorySink::default()
        };

        let err = plan.register_all(&mut sink).unwrap_err();
        assert_eq!(
            err,
            SinkError::Rejected {
                task_id: "transform.shop.orders".to_string(),
                reason: "rejected by sink".to_string(),
            }
        );
    }

    #[test]
    fn plan_document_summarizes_tasks() {
        let plan = sample_plan();
        let mut sink = JsonPlanSink::new();
        plan.register_all(&mut sink).unwrap();

        let doc = sink.finish(plan.warnings.clone());
        assert_eq!(doc.version, PlanVersion::CURRENT);
        assert_eq!(doc.summary.total_tasks, 2);
        assert_eq!(doc.summary.transforms, 1);
        assert_eq!(doc.summary.seed_loads, 1);

        let json = doc.to_json().unwrap();
        assert!(json.contains("seed_load.shop.countries"));
        assert!(json.contains("\"version\""));
    }
}
