//! Configuration schema (dagbridge.toml)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Execution strategy kind (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Run the tool in the orchestrator worker's own environment
    InProcess,

    /// Run through a dedicated executable (e.g. a virtualenv binary)
    IsolatedEnvironment,

    /// Run inside a container image
    Containerized,

    /// Run on a remote cluster
    RemoteCluster,
}

impl StrategyKind {
    /// Get the kind as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProcess => "in-process",
            Self::IsolatedEnvironment => "isolated-environment",
            Self::Containerized => "containerized",
            Self::RemoteCluster => "remote-cluster",
        }
    }

    /// Parse the kebab-case form used in configuration values
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in-process" => Some(Self::InProcess),
            "isolated-environment" => Some(Self::IsolatedEnvironment),
            "containerized" => Some(Self::Containerized),
            "remote-cluster" => Some(Self::RemoteCluster),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An unvalidated strategy choice plus its parameters
///
/// Parameter requirements are checked at resolution time, not here,
/// so a config file with an incomplete override still loads and only
/// the affected nodes fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    /// Strategy kind
    pub kind: StrategyKind,

    /// Strategy-specific parameters (executable, image, cluster, ...)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Default for StrategySpec {
    fn default() -> Self {
        Self {
            kind: StrategyKind::InProcess,
            params: BTreeMap::new(),
        }
    }
}

impl StrategySpec {
    /// Spec with a kind and no parameters
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Execution strategy configuration with override levels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Global default strategy
    #[serde(default)]
    pub default: StrategySpec,

    /// Per-subproject overrides, keyed by subproject name
    #[serde(default)]
    pub subprojects: HashMap<String, StrategySpec>,
}

/// Whether transforms get a paired validation task after each run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    /// No paired validation tasks
    Disabled,

    /// Each transform is followed by a validation task its
    /// successors depend on
    AfterEach,
}

impl Default for ValidationMode {
    fn default() -> Self {
        Self::Disabled
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// External tool executable (overridden per node by the
    /// isolated-environment strategy)
    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    /// Profile name passed to the external tool
    #[serde(default)]
    pub profile: Option<String>,

    /// Target name passed to the external tool
    #[serde(default)]
    pub target: Option<String>,

    /// Directory holding the tool's connection profiles; exported as
    /// an environment variable so user settings cannot supersede it
    #[serde(default)]
    pub profiles_dir: Option<PathBuf>,

    /// Variables forwarded to the external tool (`--vars`)
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Validation pairing mode
    #[serde(default)]
    pub validation: ValidationMode,

    /// Execution strategy defaults and overrides
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_executable() -> PathBuf {
    PathBuf::from("dbt")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            profile: None,
            target: None,
            profiles_dir: None,
            vars: BTreeMap::new(),
            validation: ValidationMode::default(),
            execution: ExecutionConfig::default(),
            project_root: PathBuf::new(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        // Resolve the project root to the config file's directory
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Strategy spec for a node, applying the override precedence
    ///
    /// Node-level `strategy` config > subproject override > global
    /// default. The first matching level wins outright; parameters are
    /// never merged across levels.
    pub fn strategy_spec(
        &self,
        subproject: &str,
        node_config: &BTreeMap<String, String>,
    ) -> Result<StrategySpec, ConfigError> {
        if let Some(value) = node_config.get("strategy") {
            let kind = StrategyKind::parse(value).ok_or_else(|| ConfigError::UnknownStrategy {
                value: value.clone(),
            })?;

            let mut params = node_config.clone();
            params.remove("strategy");

            return Ok(StrategySpec { kind, params });
        }

        if let Some(spec) = self.execution.subprojects.get(subproject) {
            return Ok(spec.clone());
        }

        Ok(self.execution.default.clone())
    }
}

/// Config error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Unknown execution strategy '{value}'")]
    UnknownStrategy { value: String },

    #[error("Strategy '{strategy}' requires parameter '{parameter}'")]
    MissingParameter {
        strategy: StrategyKind,
        parameter: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.execution.default.kind, StrategyKind::InProcess);
        assert_eq!(config.validation, ValidationMode::Disabled);
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config {
            profile: Some("warehouse".to_string()),
            target: Some("prod".to_string()),
            ..Config::default()
        };

        let toml = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(parsed.profile.as_deref(), Some("warehouse"));
        assert_eq!(parsed.target.as_deref(), Some("prod"));
    }

    #[test]
    fn parse_execution_overrides() {
        let toml = r#"
            profile = "warehouse"

            [execution.default]
            kind = "in-process"

            [execution.subprojects.finance]
            kind = "containerized"

            [execution.subprojects.finance.params]
            image = "warehouse-tool:1.4"
        "#;

        let config = Config::from_toml(toml).unwrap();
        let finance = &config.execution.subprojects["finance"];
        assert_eq!(finance.kind, StrategyKind::Containerized);
        assert_eq!(finance.params.get("image").map(String::as_str), Some("warehouse-tool:1.4"));
    }

    #[test]
    fn strategy_precedence_node_wins() {
        let mut config = Config::default();
        config.execution.subprojects.insert(
            "analytics".to_string(),
            StrategySpec::new(StrategyKind::Containerized).with_param("image", "tool:1"),
        );

        let mut node_config = BTreeMap::new();
        node_config.insert("strategy".to_string(), "isolated-environment".to_string());
        node_config.insert("executable".to_string(), "/opt/venv/bin/tool".to_string());

        let spec = config.strategy_spec("analytics", &node_config).unwrap();
        assert_eq!(spec.kind, StrategyKind::IsolatedEnvironment);
        // Node level replaces the subproject spec wholesale
        assert!(spec.params.get("image").is_none());
        assert_eq!(
            spec.params.get("executable").map(String::as_str),
            Some("/opt/venv/bin/tool")
        );
    }

    #[test]
    fn strategy_precedence_subproject_then_global() {
        let mut config = Config::default();
        config.execution.subprojects.insert(
            "finance".to_string(),
            StrategySpec::new(StrategyKind::RemoteCluster).with_param("cluster", "etl"),
        );

        let empty = BTreeMap::new();
        let finance = config.strategy_spec("finance", &empty).unwrap();
        assert_eq!(finance.kind, StrategyKind::RemoteCluster);

        let other = config.strategy_spec("analytics", &empty).unwrap();
        assert_eq!(other.kind, StrategyKind::InProcess);
    }

    #[test]
    fn unknown_strategy_value() {
        let config = Config::default();
        let mut node_config = BTreeMap::new();
        node_config.insert("strategy".to_string(), "bare-metal".to_string());

        let err = config.strategy_spec("analytics", &node_config).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownStrategy {
                value: "bare-metal".to_string()
            }
        );
    }
}
