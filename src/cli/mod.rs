//! CLI command definitions and handlers

mod build;
mod init;
mod query;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::ProgressStyle;
use kubegraph::config::Config;
use kubegraph::{AttackGraphService, GraphContext, Response};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// kubegraph - attack graphs for Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "kubegraph")]
#[command(
    version,
    about = "Build a property graph from a cluster snapshot and search it for privilege escalation paths",
    after_help = "\
Examples:
  kubegraph build snapshot.json                   Build the graph from a snapshot
  kubegraph paths --source Service --target ClusterRole --max-depth 4
  kubegraph risk --format json                    Risk assessment as JSON
  kubegraph viz --namespace prod -o graph.json    Visualization projection
  kubegraph analyze snapshot.json                 Build + visualize + assess in one go"
)]
pub struct Cli {
    /// Graph database directory (overrides config and KUBEGRAPH_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (default: ./kubegraph.toml, then ~/.config/kubegraph/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace), RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a kubegraph.toml config file with example settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Replace the graph with the resources of a snapshot file
    Build {
        /// Snapshot JSON file
        snapshot: PathBuf,
    },

    /// Build, then print snapshot stats, visualization and risk assessment
    Analyze {
        /// Snapshot JSON file
        snapshot: PathBuf,

        /// Restrict the visualization to one namespace
        #[arg(long, short = 'n')]
        namespace: Option<String>,
    },

    /// Search for attack paths
    #[command(after_help = "\
Examples:
  kubegraph paths                                  Paths of exactly 5 hops from any vertex
  kubegraph paths --source Pod --target ClusterRole
  kubegraph paths --source Service --max-depth 2")]
    Paths {
        /// Start vertex type (Namespace, Pod, Service, Deployment, ClusterRole)
        #[arg(long)]
        source: Option<String>,

        /// Stop at vertices of this type
        #[arg(long)]
        target: Option<String>,

        /// Maximum hops per path
        #[arg(long)]
        max_depth: Option<String>,
    },

    /// List vertices
    Vertices {
        /// Vertex type
        #[arg(long = "type", short = 't')]
        vertex_type: Option<String>,

        /// Namespace
        #[arg(long, short = 'n')]
        namespace: Option<String>,
    },

    /// Show the edges of one vertex, in both directions
    Edges {
        /// Vertex id
        id: String,
    },

    /// Risk assessment of the current graph
    Risk,

    /// Vertex and edge counts per type
    Stats,

    /// Bounded node/edge projection for rendering
    Viz {
        /// Restrict to one namespace
        #[arg(long, short = 'n')]
        namespace: Option<String>,

        /// Write JSON to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Store reachability and graph generation
    Status,
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        return init::run(cli.config.as_deref(), force);
    }

    let config = Config::load(cli.config.as_deref())?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path());
    let json = cli.format == "json";

    let ctx = GraphContext::open(&db_path, config.analysis.clone())
        .with_context(|| format!("Cannot open graph store at {}", db_path.display()))?;
    let service = AttackGraphService::new(ctx);

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Build { snapshot } => build::run(service, &snapshot, json),
        Commands::Analyze {
            snapshot,
            namespace,
        } => build::run_full(service, &snapshot, namespace.as_deref(), json),
        Commands::Paths {
            source,
            target,
            max_depth,
        } => query::paths(
            &service,
            source.as_deref(),
            target.as_deref(),
            max_depth.as_deref(),
            json,
        ),
        Commands::Vertices {
            vertex_type,
            namespace,
        } => query::vertices(&service, vertex_type.as_deref(), namespace.as_deref(), json),
        Commands::Edges { id } => query::edges(&service, &id, json),
        Commands::Risk => query::risk(&service, json),
        Commands::Stats => query::stats(&service, json),
        Commands::Viz { namespace, output } => {
            query::viz(&service, namespace.as_deref(), output.as_deref(), json)
        }
        Commands::Status => status::run(&service, &db_path, json),
    }
}

/// Print the whole response envelope as JSON
fn print_json<T: Serialize>(response: &Response<T>) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(response).context("Failed to serialize response")?
    );
    Ok(())
}

/// Turn a failed response into an error, warn on a concurrent rebuild
fn take_data<T>(response: Response<T>) -> Result<T> {
    if !response.consistent {
        eprintln!(
            "{} graph was rebuilt during this query, results may be mixed",
            style("warning:").yellow().bold()
        );
    }
    response.into_result().map_err(anyhow::Error::msg)
}

/// Emit `response` as JSON, or hand its data to `render`
fn emit<T: Serialize>(response: Response<T>, json: bool, render: impl FnOnce(T)) -> Result<()> {
    if json {
        print_json(&response)?;
        if !response.success {
            anyhow::bail!(
                "{}",
                response.error.unwrap_or_else(|| "request failed".to_string())
            );
        }
        return Ok(());
    }
    render(take_data(response)?);
    Ok(())
}

/// Spinner style shared by long-running commands
fn create_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn display_path(path: &Path) -> String {
    style(path.display()).cyan().to_string()
}
