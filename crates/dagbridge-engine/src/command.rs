//! Command construction for the external tool
//!
//! Builds the exact invocation for one node: subcommand by resource
//! kind, a `--select` scoped to the node, profile/target/vars flags
//! from configuration, and the environment the chosen strategy needs.
//! Node identifiers are validated before they reach an argument list.

use dagbridge_core::{Config, Node, ResourceKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::strategy::ExecutionStrategy;

/// A fully constructed external-tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Executable to run
    pub program: PathBuf,

    /// Arguments, in order
    pub args: Vec<String>,

    /// Environment variables the invocation requires
    pub env: BTreeMap<String, String>,

    /// Working directory
    pub cwd: PathBuf,
}

impl Command {
    /// Render as a display string for logs and plan output
    pub fn display_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Command construction errors (node-scoped, never fatal to siblings)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Identifier {identifier:?} contains characters unsafe for invocation")]
    UnsafeIdentifier { identifier: String },

    #[error("Could not encode vars: {0}")]
    VarsEncoding(String),
}

fn safe_identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("static identifier pattern is valid")
    })
}

/// Builds commands against one configuration
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    config: &'a Config,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build the primary command for a node
    pub fn build(&self, node: &Node, strategy: &ExecutionStrategy) -> Result<Command, CommandError> {
        let subcommand = match node.kind {
            ResourceKind::Transform => "run",
            ResourceKind::SeedLoad => "seed",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Test => "test",
        };

        self.build_with_subcommand(node, strategy, subcommand)
    }

    /// Build the paired validation command for a node (a `test` run
    /// scoped to the same identifier)
    pub fn build_validation(
        &self,
        node: &Node,
        strategy: &ExecutionStrategy,
    ) -> Result<Command, CommandError> {
        self.build_with_subcommand(node, strategy, "test")
    }

    fn build_with_subcommand(
        &self,
        node: &Node,
        strategy: &ExecutionStrategy,
        subcommand: &str,
    ) -> Result<Command, CommandError> {
        if !safe_identifier().is_match(&node.name) {
            return Err(CommandError::UnsafeIdentifier {
                identifier: node.name.clone(),
            });
        }

        let mut args = vec![subcommand.to_string()];
        args.push("--select".to_string());
        args.push(node.name.clone());

        args.push("--project-dir".to_string());
        if self.config.project_root.as_os_str().is_empty() {
            args.push(".".to_string());
        } else {
            args.push(self.config.project_root.display().to_string());
        }

        if let Some(profile) = &self.config.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if let Some(target) = &self.config.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if !self.config.vars.is_empty() {
            let encoded = serde_json::to_string(&self.config.vars)
                .map_err(|e| CommandError::VarsEncoding(e.to_string()))?;
            args.push("--vars".to_string());
            args.push(encoded);
        }

        if node.kind == ResourceKind::SeedLoad
            && node.config.get("full_refresh").map(String::as_str) == Some("true")
        {
            args.push("--full-refresh".to_string());
        }

        let mut env = BTreeMap::new();
        if let Some(profiles_dir) = &self.config.profiles_dir {
            // Pinned so user settings cannot supersede it
            env.insert(
                "DBT_PROFILES_DIR".to_string(),
                profiles_dir.display().to_string(),
            );
        }

        let program = match strategy {
            ExecutionStrategy::IsolatedEnvironment { executable } => {
                if let Some(dir) = executable.parent() {
                    let ambient = std::env::var("PATH").unwrap_or_default();
                    env.insert("PATH".to_string(), format!("{}:{}", dir.display(), ambient));
                }
                executable.clone()
            }
            _ => self.config.executable.clone(),
        };

        Ok(Command {
            program,
            args,
            env,
            cwd: if self.config.project_root.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                self.config.project_root.clone()
            },
        })
    }
}
