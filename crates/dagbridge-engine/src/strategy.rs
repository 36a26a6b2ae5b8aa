//! Execution strategy resolution
//!
//! Maps a node to the backend that will run its command. Resolution
//! applies the configured precedence (node > subproject > global) and
//! validates strategy parameters, so a rendered task never carries an
//! under-specified backend.

use dagbridge_core::{Config, ConfigError, Node, StrategyKind, StrategySpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A fully validated execution backend choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Run in the orchestrator worker's own environment
    InProcess,

    /// Run through a dedicated executable, e.g. a virtualenv binary
    IsolatedEnvironment { executable: PathBuf },

    /// Run inside a container image
    Containerized { image: String },

    /// Run on a remote cluster
    RemoteCluster {
        cluster: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },
}

impl ExecutionStrategy {
    /// The strategy's kind
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::InProcess => StrategyKind::InProcess,
            Self::IsolatedEnvironment { .. } => StrategyKind::IsolatedEnvironment,
            Self::Containerized { .. } => StrategyKind::Containerized,
            Self::RemoteCluster { .. } => StrategyKind::RemoteCluster,
        }
    }

    /// Validate a spec into a typed strategy
    pub fn from_spec(spec: &StrategySpec) -> Result<Self, ConfigError> {
        match spec.kind {
            StrategyKind::InProcess => Ok(Self::InProcess),
            StrategyKind::IsolatedEnvironment => {
                let executable = require(spec, "executable")?;
                Ok(Self::IsolatedEnvironment {
                    executable: PathBuf::from(executable),
                })
            }
            StrategyKind::Containerized => {
                let image = require(spec, "image")?;
                Ok(Self::Containerized {
                    image: image.to_string(),
                })
            }
            StrategyKind::RemoteCluster => {
                let cluster = require(spec, "cluster")?;
                Ok(Self::RemoteCluster {
                    cluster: cluster.to_string(),
                    namespace: spec.params.get("namespace").cloned(),
                })
            }
        }
    }
}

fn require<'a>(spec: &'a StrategySpec, parameter: &'static str) -> Result<&'a str, ConfigError> {
    spec.params
        .get(parameter)
        .map(String::as_str)
        .ok_or(ConfigError::MissingParameter {
            strategy: spec.kind,
            parameter,
        })
}

/// Resolve the execution strategy for one node
///
/// Failures are node-scoped: the caller skips the node and keeps
/// resolving its siblings.
pub fn resolve(node: &Node, config: &Config) -> Result<ExecutionStrategy, ConfigError> {
    let spec = config.strategy_spec(&node.subproject, &node.config)?;
    ExecutionStrategy::from_spec(&spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagbridge_core::ResourceKind;
    use pretty_assertions::assert_eq;

    fn node() -> Node {
        Node::new(ResourceKind::Transform, "shop", "orders", "models/orders.sql")
    }

    #[test]
    fn global_default_applies() {
        let config = Config::default();
        let strategy = resolve(&node(), &config).unwrap();
        assert_eq!(strategy, ExecutionStrategy::InProcess);
    }

    #[test]
    fn subproject_override_beats_global() {
        let mut config = Config::default();
        config.execution.subprojects.insert(
            "shop".to_string(),
            StrategySpec::new(StrategyKind::Containerized).with_param("image", "tool:1.4"),
        );

        let strategy = resolve(&node(), &config).unwrap();
        assert_eq!(
            strategy,
            ExecutionStrategy::Containerized {
                image: "tool:1.4".to_string()
            }
        );
    }

    #[test]
    fn node_override_beats_subproject() {
        let mut config = Config::default();
        config.execution.subprojects.insert(
            "shop".to_string(),
            StrategySpec::new(StrategyKind::Containerized).with_param("image", "tool:1.4"),
        );

        let node = node()
            .with_config("strategy", "isolated-environment")
            .with_config("executable", "/opt/venv/bin/tool");

        let strategy = resolve(&node, &config).unwrap();
        assert_eq!(
            strategy,
            ExecutionStrategy::IsolatedEnvironment {
                executable: PathBuf::from("/opt/venv/bin/tool")
            }
        );
    }

    #[test]
    fn missing_parameter_is_node_scoped() {
        let node = node().with_config("strategy", "containerized");
        let err = resolve(&node, &Config::default()).unwrap_err();

        assert_eq!(
            err,
            ConfigError::MissingParameter {
                strategy: StrategyKind::Containerized,
                parameter: "image",
            }
        );
    }

    #[test]
    fn remote_cluster_namespace_is_optional() {
        let spec = StrategySpec::new(StrategyKind::RemoteCluster).with_param("cluster", "etl");
        let strategy = ExecutionStrategy::from_spec(&spec).unwrap();
        assert_eq!(
            strategy,
            ExecutionStrategy::RemoteCluster {
                cluster: "etl".to_string(),
                namespace: None,
            }
        );
    }
}
