use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

use dagbridge_core::Config;
use dagbridge_dbt::{Graph, LoadStrategy, ParsedProject, ProjectLoader};
use dagbridge_engine::{select, JsonPlanSink, Predicate, Renderer};

/// dagbridge - render a transformation project into an orchestrator task plan
#[derive(Parser)]
#[command(name = "dagbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dagbridge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root directory
    #[arg(short, long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where project metadata comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Precompiled manifest document
    Manifest,

    /// Invoke the external tool's ls command
    Listing,

    /// Scan the project files directly
    Files,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the selected sub-graph into a task plan
    Plan {
        /// Selector expressions (e.g. "tag:nightly", "+orders")
        #[arg(short, long)]
        select: Vec<String>,

        /// Metadata source
        #[arg(long, value_enum, default_value_t = Source::Manifest)]
        source: Source,

        /// Manifest path, relative to the project root
        #[arg(long, default_value = "target/manifest.json")]
        manifest: PathBuf,

        /// Output file for the plan document
        #[arg(short, long, default_value = "plan.json")]
        output: PathBuf,
    },

    /// List parsed nodes
    List {
        /// Metadata source
        #[arg(long, value_enum, default_value_t = Source::Manifest)]
        source: Source,

        /// Manifest path, relative to the project root
        #[arg(long, default_value = "target/manifest.json")]
        manifest: PathBuf,
    },

    /// Evaluate selector expressions and print surviving node ids
    Select {
        /// Selector expressions
        expressions: Vec<String>,

        /// Metadata source
        #[arg(long, value_enum, default_value_t = Source::Manifest)]
        source: Source,

        /// Manifest path, relative to the project root
        #[arg(long, default_value = "target/manifest.json")]
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.verbose {
        eprintln!(
            "{} {}",
            "Project root:".cyan(),
            config.project_root.display()
        );
    }

    match &cli.command {
        Commands::Plan {
            select,
            source,
            manifest,
            output,
        } => plan_command(&config, select, *source, manifest, output, cli.verbose),
        Commands::List { source, manifest } => {
            list_command(&config, *source, manifest, cli.verbose)
        }
        Commands::Select {
            expressions,
            source,
            manifest,
        } => select_command(&config, expressions, *source, manifest),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        let default_path = cli.project_dir.join("dagbridge.toml");
        if default_path.exists() {
            Config::from_file(&default_path)?
        } else {
            if cli.verbose {
                eprintln!("{}", "No config file found, using defaults".yellow());
            }
            Config::default()
        }
    };

    if config.project_root.as_os_str().is_empty() {
        config.project_root = cli.project_dir.clone();
    }

    Ok(config)
}

fn load_project(
    config: &Config,
    source: Source,
    manifest: &Path,
    verbose: bool,
) -> Result<ParsedProject> {
    let strategy = match source {
        Source::Manifest => LoadStrategy::Manifest {
            path: manifest.to_path_buf(),
        },
        Source::Listing => LoadStrategy::ToolListing {
            executable: config.executable.clone(),
        },
        Source::Files => LoadStrategy::ProjectFiles,
    };

    let loader = ProjectLoader::new(&config.project_root);
    let parsed = loader.load(&strategy)?;

    if verbose {
        eprintln!(
            "{} {} nodes, {} raw edges",
            "Parsed".cyan(),
            parsed.nodes.len(),
            parsed.edges.len()
        );
    }

    Ok(parsed)
}

fn combined_predicate(expressions: &[String]) -> Result<Predicate> {
    if expressions.is_empty() {
        return Ok(Predicate::All);
    }

    let mut parsed = Vec::new();
    for expr in expressions {
        parsed.push(Predicate::parse(expr)?);
    }

    Ok(match parsed.len() {
        1 => parsed.remove(0),
        _ => Predicate::Union(parsed),
    })
}

fn plan_command(
    config: &Config,
    expressions: &[String],
    source: Source,
    manifest: &Path,
    output: &Path,
    verbose: bool,
) -> Result<()> {
    let parsed = load_project(config, source, manifest, verbose)?;
    let graph = Graph::build(parsed.nodes, parsed.edges)?;

    let predicate = combined_predicate(expressions)?;
    let selection = select(&graph, &predicate);

    if verbose {
        eprintln!("{} {} of {} nodes", "Selected".cyan(), selection.len(), graph.len());
    }

    let plan = Renderer::new(&graph, config).render(&selection);

    for warning in &plan.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }

    if verbose {
        for task in &plan.tasks {
            eprintln!("  {} {}", task.task_id.cyan(), task.command.display_line().dimmed());
        }
    }

    let mut sink = JsonPlanSink::new();
    plan.register_all(&mut sink)?;
    let document = sink.finish(plan.warnings.clone());
    document.write_to(output)?;

    println!(
        "{} {} tasks -> {}",
        "Rendered".green().bold(),
        document.summary.total_tasks,
        output.display()
    );
    if plan.is_degraded() {
        println!(
            "{} {} warning(s); plan is degraded but usable",
            "Note:".yellow().bold(),
            plan.warnings.len()
        );
    }

    Ok(())
}

fn list_command(config: &Config, source: Source, manifest: &Path, verbose: bool) -> Result<()> {
    let parsed = load_project(config, source, manifest, verbose)?;

    for node in &parsed.nodes {
        let tags = if node.tags.is_empty() {
            String::new()
        } else {
            let tags: Vec<&str> = node.tags.iter().map(String::as_str).collect();
            format!(" [{}]", tags.join(", "))
        };

        println!(
            "{:<10} {}{}",
            node.kind.to_string().cyan(),
            node.unique_id,
            tags.dimmed()
        );
    }

    Ok(())
}

fn select_command(
    config: &Config,
    expressions: &[String],
    source: Source,
    manifest: &Path,
) -> Result<()> {
    let parsed = load_project(config, source, manifest, false)?;
    let graph = Graph::build(parsed.nodes, parsed.edges)?;

    let predicate = combined_predicate(expressions)?;
    let selection = select(&graph, &predicate);

    if selection.is_empty() {
        eprintln!("{}", "Selection matched no nodes".yellow());
        return Ok(());
    }

    for id in selection.node_ids() {
        println!("{id}");
    }

    Ok(())
}
