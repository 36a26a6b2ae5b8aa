//! dagbridge engine
//!
//! The design-time pipeline between a validated graph and the host
//! orchestrator:
//! - Selection (tag/path/kind predicates with closure combinators)
//! - Execution strategy resolution (node > subproject > global)
//! - Command construction for the external tool
//! - Task rendering and registration through a task sink

pub mod command;
pub mod render;
pub mod selector;
pub mod sink;
pub mod strategy;

pub use command::{Command, CommandBuilder, CommandError};
pub use render::{RenderedTask, Renderer, TaskPlan};
pub use selector::{select, Predicate, Selection, SelectorError};
pub use sink::{JsonPlanSink, MemorySink, PlanDocument, SinkError, TaskSink};
pub use strategy::{resolve, ExecutionStrategy};
