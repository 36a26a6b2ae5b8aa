//! Task rendering
//!
//! Walks a selection in dependency order and emits one task per node
//! (plus a paired validation task when configured), with upstream
//! edges mirroring the selection's induced edges. Node-scoped
//! failures remove the node and its selected dependents and are
//! reported as warnings; the rest of the selection still renders.

use dagbridge_core::{Config, Node, RenderWarning, ResourceKind, ValidationMode};
use dagbridge_dbt::Graph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::command::{Command, CommandBuilder};
use crate::selector::Selection;
use crate::sink::{SinkError, TaskSink};
use crate::strategy::{self, ExecutionStrategy};

/// One host-orchestrator task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTask {
    /// Task identifier, unique within the plan
    pub task_id: String,

    /// Node the task was rendered from
    pub node_id: String,

    /// Resource kind the task executes
    pub kind: ResourceKind,

    /// Resolved execution backend
    pub strategy: ExecutionStrategy,

    /// Constructed invocation
    pub command: Command,

    /// Task ids this task must wait for
    pub upstream: Vec<String>,

    /// Organizational group; never affects ordering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Render output: tasks in dependency order plus accumulated warnings
///
/// An empty warning list means the whole selection rendered; a
/// non-empty one means a degraded but usable plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub tasks: Vec<RenderedTask>,
    pub warnings: Vec<RenderWarning>,
}

impl TaskPlan {
    /// Whether any node was skipped
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Look up a task by id
    pub fn get(&self, task_id: &str) -> Option<&RenderedTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Register every task with a sink, in dependency order
    ///
    /// Registration only declares the graph; execution is entirely the
    /// host orchestrator's concern. Returns the number of registered
    /// tasks, or the first rejection.
    pub fn register_all(&self, sink: &mut dyn TaskSink) -> Result<usize, SinkError> {
        for task in &self.tasks {
            sink.register(task)?;
        }
        Ok(self.tasks.len())
    }
}

/// Renders selections against one graph and configuration
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    graph: &'a Graph,
    config: &'a Config,
}

impl<'a> Renderer<'a> {
    pub fn new(graph: &'a Graph, config: &'a Config) -> Self {
        Self { graph, config }
    }

    /// Render the selection into a task plan
    pub fn render(&self, selection: &Selection) -> TaskPlan {
        let mut plan = TaskPlan::default();

        if selection.is_empty() {
            tracing::warn!("selection matched no nodes; rendering an empty plan");
            plan.warnings.push(RenderWarning::EmptySelection);
            return plan;
        }

        let builder = CommandBuilder::new(self.config);
        let mut skipped: BTreeSet<String> = BTreeSet::new();
        // Node id -> the task id successors must wait for
        let mut terminal: BTreeMap<String, String> = BTreeMap::new();

        for node_id in self.graph.topological_order() {
            if !selection.contains(&node_id) {
                continue;
            }
            let Some(node) = self.graph.get(&node_id) else {
                continue;
            };

            // Cascade: a dependent of a skipped node cannot run
            if let Some(missing) = selection
                .parents_of(&node_id)
                .find(|p| skipped.contains(*p))
            {
                tracing::warn!(node = %node_id, missing, "skipping dependent of a skipped node");
                plan.warnings.push(RenderWarning::DependencySkipped {
                    node_id: node_id.clone(),
                    missing: missing.to_string(),
                });
                skipped.insert(node_id);
                continue;
            }

            let strategy = match strategy::resolve(node, self.config) {
                Ok(strategy) => strategy,
                Err(e) => {
                    self.skip(&mut plan, &mut skipped, &node_id, e.to_string());
                    continue;
                }
            };

            let command = match builder.build(node, &strategy) {
                Ok(command) => command,
                Err(e) => {
                    self.skip(&mut plan, &mut skipped, &node_id, e.to_string());
                    continue;
                }
            };

            let wants_validation =
                self.config.validation == ValidationMode::AfterEach && node.kind == ResourceKind::Transform;

            let validation_command = if wants_validation {
                match builder.build_validation(node, &strategy) {
                    Ok(command) => Some(command),
                    Err(e) => {
                        self.skip(&mut plan, &mut skipped, &node_id, e.to_string());
                        continue;
                    }
                }
            } else {
                None
            };

            let upstream: Vec<String> = selection
                .parents_of(&node_id)
                .filter_map(|p| terminal.get(p).cloned())
                .collect();

            let group = group_for(node);

            plan.tasks.push(RenderedTask {
                task_id: node_id.clone(),
                node_id: node_id.clone(),
                kind: node.kind,
                strategy: strategy.clone(),
                command,
                upstream,
                group: group.clone(),
            });

            let terminal_id = match validation_command {
                Some(command) => {
                    let validation_id = format!("{node_id}:validate");
                    plan.tasks.push(RenderedTask {
                        task_id: validation_id.clone(),
                        node_id: node_id.clone(),
                        kind: ResourceKind::Test,
                        strategy,
                        command,
                        upstream: vec![node_id.clone()],
                        group,
                    });
                    validation_id
                }
                None => node_id.clone(),
            };

            terminal.insert(node_id, terminal_id);
        }

        tracing::info!(
            tasks = plan.tasks.len(),
            warnings = plan.warnings.len(),
            "rendered task plan"
        );

        plan
    }

    fn skip(
        &self,
        plan: &mut TaskPlan,
        skipped: &mut BTreeSet<String>,
        node_id: &str,
        reason: String,
    ) {
        tracing::warn!(node = %node_id, %reason, "skipping node");
        plan.warnings.push(RenderWarning::NodeSkipped {
            node_id: node_id.to_string(),
            reason,
        });
        skipped.insert(node_id.to_string());
    }
}

/// Group tasks by subproject, overridable with a `group:<name>` tag
fn group_for(node: &Node) -> Option<String> {
    node.tags
        .iter()
        .find_map(|t| t.strip_prefix("group:"))
        .map(String::from)
        .or_else(|| Some(node.subproject.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{select, Predicate};
    use dagbridge_core::RawEdge;
    use pretty_assertions::assert_eq;

    fn transform(name: &str) -> Node {
        Node::new(ResourceKind::Transform, "shop", name, format!("models/{name}.sql"))
    }

    fn chain_graph(names: [&str; 3]) -> Graph {
        let id = |n: &str| format!("transform.shop.{n}");
        Graph::build(
            vec![transform(names[0]), transform(names[1]), transform(names[2])],
            vec![
                RawEdge::by_id(id(names[1]), id(names[0])),
                RawEdge::by_id(id(names[2]), id(names[1])),
            ],
        )
        .unwrap()
    }

    fn render_all(graph: &Graph, config: &Config) -> TaskPlan {
        let selection = select(graph, &Predicate::All);
        Renderer::new(graph, config).render(&selection)
    }

    #[test]
    fn linear_chain_reproduces_edges() {
        let graph = chain_graph(["a", "b", "c"]);
        let plan = render_all(&graph, &Config::default());

        assert_eq!(plan.tasks.len(), 3);
        assert!(plan.warnings.is_empty());

        let b = plan.get("transform.shop.b").unwrap();
        assert_eq!(b.upstream, vec!["transform.shop.a"]);
        let c = plan.get("transform.shop.c").unwrap();
        assert_eq!(c.upstream, vec!["transform.shop.b"]);

        // Tasks come out in dependency order
        let pos = |id: &str| plan.tasks.iter().position(|t| t.task_id == id).unwrap();
        assert!(pos("transform.shop.a") < pos("transform.shop.b"));
        assert!(pos("transform.shop.b") < pos("transform.shop.c"));
    }

    #[test]
    fn render_is_stable_across_node_iteration_order() {
        // Same chain, nodes declared in reverse
        let forward = render_all(&chain_graph(["a", "b", "c"]), &Config::default());

        let id = |n: &str| format!("transform.shop.{n}");
        let reversed_graph = Graph::build(
            vec![transform("c"), transform("b"), transform("a")],
            vec![
                RawEdge::by_id(id("c"), id("b")),
                RawEdge::by_id(id("b"), id("a")),
            ],
        )
        .unwrap();
        let reversed = render_all(&reversed_graph, &Config::default());

        let forward_ids: Vec<&str> = forward.tasks.iter().map(|t| t.task_id.as_str()).collect();
        let reversed_ids: Vec<&str> = reversed.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(forward_ids, reversed_ids);
    }

    #[test]
    fn failed_middle_node_cascades() {
        // b cannot resolve its strategy; c depends on b
        let id = |n: &str| format!("transform.shop.{n}");
        let graph = Graph::build(
            vec![
                transform("a"),
                transform("b").with_config("strategy", "containerized"),
                transform("c"),
            ],
            vec![
                RawEdge::by_id(id("b"), id("a")),
                RawEdge::by_id(id("c"), id("b")),
            ],
        )
        .unwrap();

        let plan = render_all(&graph, &Config::default());

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].task_id, "transform.shop.a");

        assert_eq!(plan.warnings.len(), 2);
        assert!(matches!(
            &plan.warnings[0],
            RenderWarning::NodeSkipped { node_id, .. } if node_id == "transform.shop.b"
        ));
        assert!(matches!(
            &plan.warnings[1],
            RenderWarning::DependencySkipped { node_id, missing }
                if node_id == "transform.shop.c" && missing == "transform.shop.b"
        ));
    }

    #[test]
    fn staging_scenario_renders_three_ordered_tasks() {
        let nodes = vec![
            Node::new(ResourceKind::Transform, "shop", "stage_orders", "models/stage_orders.sql"),
            Node::new(ResourceKind::Transform, "shop", "clean_orders", "models/clean_orders.sql"),
            Node::new(ResourceKind::Test, "shop", "test_clean_orders", "models/schema.yml"),
        ];
        let edges = vec![
            RawEdge::by_id("transform.shop.clean_orders", "transform.shop.stage_orders"),
            RawEdge::by_id("test.shop.test_clean_orders", "transform.shop.clean_orders"),
        ];
        let graph = Graph::build(nodes, edges).unwrap();

        let plan = render_all(&graph, &Config::default());
        assert_eq!(plan.tasks.len(), 3);
        assert!(plan.warnings.is_empty());

        let clean = plan.get("transform.shop.clean_orders").unwrap();
        assert_eq!(clean.upstream, vec!["transform.shop.stage_orders"]);

        let test = plan.get("test.shop.test_clean_orders").unwrap();
        assert_eq!(test.upstream, vec!["transform.shop.clean_orders"]);
        assert_eq!(test.command.args[0], "test");
    }

    #[test]
    fn validation_pairing_rewires_successors() {
        let graph = chain_graph(["a", "b", "c"]);
        let config = Config {
            validation: ValidationMode::AfterEach,
            ..Config::default()
        };

        let plan = render_all(&graph, &config);

        // Each transform gets a primary plus a validation task
        assert_eq!(plan.tasks.len(), 6);

        let a_validate = plan.get("transform.shop.a:validate").unwrap();
        assert_eq!(a_validate.upstream, vec!["transform.shop.a"]);
        assert_eq!(a_validate.kind, ResourceKind::Test);
        assert_eq!(a_validate.command.args[0], "test");

        // b waits for a's validation, not a itself
        let b = plan.get("transform.shop.b").unwrap();
        assert_eq!(b.upstream, vec!["transform.shop.a:validate"]);
    }

    #[test]
    fn grouping_is_subproject_with_tag_override() {
        let nodes = vec![
            transform("orders"),
            transform("special").with_tags(["group:critical"]),
        ];
        let graph = Graph::build(nodes, vec![]).unwrap();

        let plan = render_all(&graph, &Config::default());

        assert_eq!(
            plan.get("transform.shop.orders").unwrap().group.as_deref(),
            Some("shop")
        );
        assert_eq!(
            plan.get("transform.shop.special").unwrap().group.as_deref(),
            Some("critical")
        );
    }

    #[test]
    fn empty_selection_renders_zero_tasks_with_a_warning() {
        let graph = chain_graph(["a", "b", "c"]);
        let selection = select(&graph, &Predicate::Tag("absent".to_string()));
        let plan = Renderer::new(&graph, &Config::default()).render(&selection);

        assert!(plan.tasks.is_empty());
        assert_eq!(plan.warnings, vec![RenderWarning::EmptySelection]);
    }

    #[test]
    fn skipped_node_edges_are_severed() {
        // a -> b(fails); the sibling d -> b edge must also disappear
        let id = |n: &str| format!("transform.shop.{n}");
        let graph = Graph::build(
            vec![
                transform("a"),
                transform("b").with_config("strategy", "containerized"),
                transform("d"),
            ],
            vec![
                RawEdge::by_id(id("b"), id("a")),
                RawEdge::by_id(id("d"), id("b")),
            ],
        )
        .unwrap();

        let plan = render_all(&graph, &Config::default());
        for task in &plan.tasks {
            assert!(!task.upstream.iter().any(|u| u.contains(".b")));
        }
    }
}
