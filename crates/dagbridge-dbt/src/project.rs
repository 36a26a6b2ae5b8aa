//! Direct project-file parsing
//!
//! Scans a project tree without any precompiled artifacts: model and
//! snapshot SQL files (dependencies recovered from their `ref()` /
//! `source()` template calls), seed CSV files, `schema.yml` model
//! configs, and the directory-level config tree in the project file.
//!
//! Configuration precedence is most specific wins: config in the SQL
//! file itself, then `schema.yml` entries, then the project file.
//! Tags accumulate across all three levels. Transforms that end up
//! with no materialization get `view`, so selection by
//! `materialized:view` behaves like the external tool's own default.

use dagbridge_core::{Node, RawEdge, ResourceKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::loader::{ParseError, ParsedProject};

const PROJECT_FILE: &str = "dbt_project.yml";

/// Scans project files into nodes and raw edges
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: PathBuf,
}

/// Template metadata pulled out of one SQL file
#[derive(Debug, Default, Clone, PartialEq)]
struct TemplateMeta {
    refs: Vec<String>,
    sources: Vec<(String, String)>,
    tags: Vec<String>,
    materialized: Option<String>,
    schema: Option<String>,
}

impl ProjectFiles {
    /// Parser rooted at the project directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Parse the project tree
    pub fn parse(&self) -> Result<ParsedProject, ParseError> {
        let project_file = self.root.join(PROJECT_FILE);
        let project_doc = read_yaml(&project_file)?;

        let subproject = project_doc
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParseError::InvalidProjectFile {
                path: project_file.clone(),
                reason: "missing 'name' field".to_string(),
            })?
            .to_string();

        let mut nodes: Vec<Node> = Vec::new();
        // Per-node ref lists, keyed by unique id
        let mut refs: BTreeMap<String, Vec<String>> = BTreeMap::new();

        self.scan_models(&subproject, &mut nodes, &mut refs)?;
        self.scan_snapshots(&subproject, &mut nodes, &mut refs)?;
        self.scan_seeds(&subproject, &mut nodes)?;

        self.apply_schema_files(&mut nodes)?;
        self.apply_project_config(&project_doc, &subproject, &mut nodes);

        // The tool defaults models to views when nothing is configured
        for node in nodes.iter_mut() {
            if node.kind == ResourceKind::Transform && !node.config.contains_key("materialized") {
                node.config
                    .insert("materialized".to_string(), "view".to_string());
            }
        }

        nodes.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        let edges = resolve_refs(&nodes, &refs);

        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            subproject = %subproject,
            "parsed project files"
        );

        Ok(ParsedProject { nodes, edges })
    }

    fn scan_models(
        &self,
        subproject: &str,
        nodes: &mut Vec<Node>,
        refs: &mut BTreeMap<String, Vec<String>>,
    ) -> Result<(), ParseError> {
        for path in sql_files(&self.root.join("models")) {
            let code = read_file(&path)?;
            let meta = extract_template_meta(&code);

            let name = file_stem(&path);
            let mut node = Node::new(
                ResourceKind::Transform,
                subproject,
                name,
                relative_path(&self.root, &path),
            );

            apply_meta(&mut node, &meta);
            for (source_name, table) in &meta.sources {
                tracing::debug!(
                    node = %node.unique_id,
                    source = %source_name,
                    table = %table,
                    "source reference is not schedulable; ignored"
                );
            }

            refs.insert(node.unique_id.clone(), meta.refs);
            nodes.push(node);
        }

        Ok(())
    }

    fn scan_snapshots(
        &self,
        subproject: &str,
        nodes: &mut Vec<Node>,
        refs: &mut BTreeMap<String, Vec<String>>,
    ) -> Result<(), ParseError> {
        for path in sql_files(&self.root.join("snapshots")) {
            let code = read_file(&path)?;

            // `{% snapshot orders_snapshot %}` names the node; the body
            // between the block markers carries the refs.
            let Some((name, body)) = split_snapshot_block(&code) else {
                return Err(ParseError::InvalidProjectFile {
                    path,
                    reason: "no snapshot block found".to_string(),
                });
            };

            let meta = extract_template_meta(body);
            let mut node = Node::new(
                ResourceKind::Snapshot,
                subproject,
                name,
                relative_path(&self.root, &path),
            );

            apply_meta(&mut node, &meta);
            refs.insert(node.unique_id.clone(), meta.refs);
            nodes.push(node);
        }

        Ok(())
    }

    fn scan_seeds(&self, subproject: &str, nodes: &mut Vec<Node>) -> Result<(), ParseError> {
        for entry in WalkDir::new(self.root.join("seeds"))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "csv") {
                nodes.push(Node::new(
                    ResourceKind::SeedLoad,
                    subproject,
                    file_stem(path),
                    relative_path(&self.root, path),
                ));
            }
        }

        Ok(())
    }

    /// Fold `schema.yml` model entries into already-scanned nodes
    fn apply_schema_files(&self, nodes: &mut [Node]) -> Result<(), ParseError> {
        for entry in WalkDir::new(self.root.join("models"))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|e| e == "yml" || e == "yaml");
            if !is_yaml {
                continue;
            }

            let doc = read_yaml(path)?;
            let Some(models) = doc.get("models").and_then(|v| v.as_sequence()) else {
                continue;
            };

            for model in models {
                let Some(name) = model.get("name").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some(node) = nodes
                    .iter_mut()
                    .find(|n| n.kind == ResourceKind::Transform && n.name == name)
                else {
                    continue;
                };

                let config = model.get("config");
                apply_yaml_config(node, config);
            }
        }

        Ok(())
    }

    /// Walk the project file's `models:` tree, applying directory-level
    /// config to every node underneath that directory
    fn apply_project_config(
        &self,
        project_doc: &serde_yaml::Value,
        subproject: &str,
        nodes: &mut [Node],
    ) {
        let Some(tree) = project_doc
            .get("models")
            .and_then(|m| m.get(subproject))
            .and_then(|v| v.as_mapping())
        else {
            return;
        };

        apply_project_level(nodes, PathBuf::from("models"), tree);
    }
}

/// Apply one directory level of the project config tree, then recurse
fn apply_project_level(
    nodes: &mut [Node],
    dir: PathBuf,
    level: &serde_yaml::Mapping,
) {
    // Children first, so deeper (more specific) settings land before
    // this level's
    for (key, value) in level {
        let Some(name) = key.as_str() else { continue };
        if !name.starts_with('+') {
            if let Some(child) = value.as_mapping() {
                apply_project_level(nodes, dir.join(name), child);
            }
        }
    }

    let materialized = level
        .get("+materialized")
        .and_then(|v| v.as_str())
        .map(String::from);
    let schema = level
        .get("+schema")
        .and_then(|v| v.as_str())
        .map(String::from);
    let tags = yaml_string_list(level.get("+tags"));

    if materialized.is_none() && schema.is_none() && tags.is_empty() {
        return;
    }

    for node in nodes.iter_mut().filter(|n| n.path.starts_with(&dir)) {
        if let Some(m) = &materialized {
            node.config
                .entry("materialized".to_string())
                .or_insert_with(|| m.clone());
        }
        if let Some(s) = &schema {
            node.config
                .entry("schema".to_string())
                .or_insert_with(|| s.clone());
        }
        node.tags.extend(tags.iter().cloned());
    }
}

/// Fold a `schema.yml` config block into a node (yml loses to the SQL
/// file's own config, tags accumulate)
fn apply_yaml_config(node: &mut Node, config: Option<&serde_yaml::Value>) {
    let Some(config) = config else { return };

    if let Some(m) = config.get("materialized").and_then(|v| v.as_str()) {
        node.config
            .entry("materialized".to_string())
            .or_insert_with(|| m.to_string());
    }
    if let Some(s) = config.get("schema").and_then(|v| v.as_str()) {
        node.config
            .entry("schema".to_string())
            .or_insert_with(|| s.to_string());
    }
    node.tags.extend(yaml_string_list(config.get("tags")));
}

fn apply_meta(node: &mut Node, meta: &TemplateMeta) {
    node.tags.extend(meta.tags.iter().cloned());
    if let Some(m) = &meta.materialized {
        node.config.insert("materialized".to_string(), m.clone());
    }
    if let Some(s) = &meta.schema {
        node.config.insert("schema".to_string(), s.clone());
    }
}

/// Resolve parsed `ref()` names against the scanned node set
///
/// A ref can target a transform, a seed, or a snapshot; a name that
/// matches nothing is still emitted so the graph builder reports it as
/// a dangling reference.
fn resolve_refs(nodes: &[Node], refs: &BTreeMap<String, Vec<String>>) -> Vec<RawEdge> {
    let mut edges = Vec::new();

    for (node_id, ref_names) in refs {
        for name in ref_names {
            let target = [
                ResourceKind::Transform,
                ResourceKind::SeedLoad,
                ResourceKind::Snapshot,
            ]
            .into_iter()
            .find(|kind| nodes.iter().any(|n| n.kind == *kind && n.name == *name));

            let kind = target.unwrap_or(ResourceKind::Transform);
            edges.push(RawEdge::by_name(node_id, kind, name));
        }
    }

    edges
}

/// Extract `ref()`, `source()` and `config()` calls from templated SQL
fn extract_template_meta(code: &str) -> TemplateMeta {
    let mut meta = TemplateMeta::default();

    let mut start = 0;
    while let Some(open) = code[start..].find("{{") {
        let open_pos = start + open;
        let Some(close) = code[open_pos..].find("}}") else {
            break;
        };
        let close_pos = open_pos + close;
        let content = code[open_pos + 2..close_pos].trim();

        if let Some(name) = parse_single_arg_call(content, "ref") {
            meta.refs.push(name);
        } else if let Some((source, table)) = parse_two_arg_call(content, "source") {
            meta.sources.push((source, table));
        } else if let Some(inner) = content.strip_prefix("config(").and_then(|c| c.strip_suffix(')')) {
            parse_config_kwargs(inner, &mut meta);
        }

        start = close_pos + 2;
    }

    meta
}

/// Parse `name('arg')`
fn parse_single_arg_call(content: &str, name: &str) -> Option<String> {
    let inner = content
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    string_literal(inner).map(String::from)
}

/// Parse `name('a', 'b')`
fn parse_two_arg_call(content: &str, name: &str) -> Option<(String, String)> {
    let inner = content
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;

    let mut parts = inner.splitn(2, ',');
    let first = string_literal(parts.next()?)?;
    let second = string_literal(parts.next()?)?;
    Some((first.to_string(), second.to_string()))
}

/// Pull materialized/schema/tags kwargs out of a `config(...)` call
fn parse_config_kwargs(inner: &str, meta: &mut TemplateMeta) {
    for part in split_top_level(inner) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "materialized" => meta.materialized = string_literal(value).map(String::from),
            "schema" => meta.schema = string_literal(value).map(String::from),
            "tags" => {
                if let Some(single) = string_literal(value) {
                    meta.tags.push(single.to_string());
                } else if let Some(list) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
                    meta.tags.extend(
                        list.split(',')
                            .filter_map(|item| string_literal(item).map(String::from)),
                    );
                }
            }
            _ => {}
        }
    }
}

/// Split on commas that are not inside brackets or quotes
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    let mut last = 0;

    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => match in_quote {
                Some(q) if q == c => in_quote = None,
                None => in_quote = Some(c),
                _ => {}
            },
            '[' | '(' if in_quote.is_none() => depth += 1,
            ']' | ')' if in_quote.is_none() => depth = depth.saturating_sub(1),
            ',' if in_quote.is_none() && depth == 0 => {
                parts.push(&s[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }

    parts.push(&s[last..]);
    parts
}

/// Strip matching single or double quotes
fn string_literal(s: &str) -> Option<&str> {
    let trimmed = s.trim();

    trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// Extract the snapshot name and body from `{% snapshot X %} ... {% endsnapshot %}`
fn split_snapshot_block(code: &str) -> Option<(&str, &str)> {
    let open = code.find("{%")?;
    let open_end = code[open..].find("%}")? + open;

    let header = code[open + 2..open_end].trim();
    let mut words = header.split_whitespace();
    if words.next() != Some("snapshot") {
        return None;
    }
    let name = words.next()?;

    let body_start = open_end + 2;
    let body_end = code[body_start..]
        .find("{%")
        .map(|i| body_start + i)
        .unwrap_or(code.len());

    Some((name, &code[body_start..body_end]))
}

fn sql_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "sql"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn relative_path(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn read_file(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|e| ParseError::Io(e.to_string()))
}

fn read_yaml(path: &Path) -> Result<serde_yaml::Value, ParseError> {
    if !path.exists() {
        return Err(ParseError::InvalidProjectFile {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }

    let contents = read_file(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ParseError::InvalidProjectFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn yaml_string_list(value: Option<&serde_yaml::Value>) -> Vec<String> {
    match value {
        Some(serde_yaml::Value::String(s)) => vec![s.clone()],
        Some(serde_yaml::Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}
