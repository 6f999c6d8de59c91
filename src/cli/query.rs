//! Read-only graph queries: paths, vertices, edges, risk, stats, viz

use super::build::print_risk;
use super::{display_path, emit, take_data};
use anyhow::{Context, Result};
use console::style;
use kubegraph::analysis::Direction;
use kubegraph::AttackGraphService;
use std::path::Path;

/// Cap on rows printed in text mode
const MAX_ROWS: usize = 50;

pub fn paths(
    service: &AttackGraphService,
    source: Option<&str>,
    target: Option<&str>,
    max_depth: Option<&str>,
    json: bool,
) -> Result<()> {
    emit(service.find_paths(source, target, max_depth), json, |search| {
        println!(
            "\n{} Attack paths ({} from {} sources)\n",
            style("▸").cyan(),
            search.paths.len(),
            search.sources_examined
        );
        for (i, path) in search.paths.iter().take(MAX_ROWS).enumerate() {
            println!("  {:>3}. {}", i + 1, path.describe());
        }
        if search.paths.len() > MAX_ROWS {
            println!("  ... and {} more", search.paths.len() - MAX_ROWS);
        }
        if search.truncated {
            println!(
                "\n  {}",
                style("Query budget ran out, results are partial").yellow()
            );
        }
    })
}

pub fn vertices(
    service: &AttackGraphService,
    vertex_type: Option<&str>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    emit(service.vertices(vertex_type, namespace), json, |vertices| {
        println!("\n{} Vertices ({})\n", style("▸").cyan(), vertices.len());
        for v in vertices.iter().take(MAX_ROWS) {
            println!(
                "  {:>6}  {:<12} {}{}  [{}]",
                style(v.id).dim(),
                v.label.to_string(),
                v.namespace
                    .as_deref()
                    .map(|ns| format!("{}/", ns))
                    .unwrap_or_default(),
                style(v.name.as_deref().unwrap_or("?")).cyan(),
                v.risk_level
            );
        }
        if vertices.len() > MAX_ROWS {
            println!("  ... and {} more", vertices.len() - MAX_ROWS);
        }
    })
}

pub fn edges(service: &AttackGraphService, id: &str, json: bool) -> Result<()> {
    emit(service.vertex_edges(id), json, |edges| {
        println!("\n{} Edges of vertex {} ({})\n", style("▸").cyan(), id, edges.len());
        for e in &edges {
            let arrow = match e.direction {
                Direction::Outgoing => "->",
                Direction::Incoming => "<-",
            };
            println!(
                "  {} {:<22} {} {} {}",
                arrow,
                e.label.to_string(),
                e.peer.label,
                style(e.peer.name.as_deref().unwrap_or("?")).cyan(),
                style(format!("#{}", e.peer.id)).dim()
            );
        }
    })
}

pub fn risk(service: &AttackGraphService, json: bool) -> Result<()> {
    emit(service.risk_assessment(), json, |risk| {
        println!("\n{} Risk assessment\n", style("▸").cyan());
        print_risk(&risk);
    })
}

pub fn stats(service: &AttackGraphService, json: bool) -> Result<()> {
    emit(service.graph_statistics(), json, |stats| {
        println!(
            "\n{} Graph: {} vertices, {} edges\n",
            style("▸").cyan(),
            style(stats.total_vertices).cyan(),
            style(stats.total_edges).cyan()
        );
        for (label, count) in &stats.vertex_types {
            println!("    {:<22} {}", label.to_string(), count);
        }
        for (label, count) in &stats.edge_types {
            println!("    {:<22} {}", label.to_string(), count);
        }
    })
}

pub fn viz(
    service: &AttackGraphService,
    namespace: Option<&str>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let response = service.visualization(namespace);

    if let Some(output) = output {
        let viz = take_data(response)?;
        let text = serde_json::to_string_pretty(&viz).context("Failed to serialize visualization")?;
        std::fs::write(output, text)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!(
            "{} Wrote {} nodes and {} edges to {}",
            style("✓").green(),
            viz.statistics.node_count,
            viz.statistics.edge_count,
            display_path(output)
        );
        return Ok(());
    }

    emit(response, json, |viz| {
        println!(
            "\n{} Visualization: {} nodes, {} edges\n",
            style("▸").cyan(),
            viz.statistics.node_count,
            viz.statistics.edge_count
        );
        for (label, count) in &viz.statistics.node_types {
            println!("    {:<22} {}", label.to_string(), count);
        }
        if viz.statistics.truncated {
            println!("\n  {}", style("Node limit reached, projection is partial").yellow());
        }
        println!("\n  Use {} for the full projection", style("--format json").cyan());
    })
}
