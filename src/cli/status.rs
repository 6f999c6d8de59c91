//! Status command - store reachability and graph size

use super::display_path;
use anyhow::{Context, Result};
use console::style;
use kubegraph::{AttackGraphService, GraphStatistics, Health, Response};
use serde_json::{json, Value};
use std::path::Path;

/// Run the status command
pub fn run(service: &AttackGraphService, db_path: &Path, json: bool) -> Result<()> {
    let health = service.health();
    let stats = service.graph_statistics();

    if json {
        let doc = status_document(db_path, &health, &stats);
        println!(
            "{}",
            serde_json::to_string_pretty(&doc).context("Failed to serialize status")?
        );
    } else {
        print_status(db_path, &health, &stats);
    }

    match stats.error {
        Some(e) => anyhow::bail!("graph statistics unavailable: {}", e),
        None => Ok(()),
    }
}

fn status_document(db_path: &Path, health: &Health, stats: &Response<GraphStatistics>) -> Value {
    let mut doc = json!({
        "db_path": db_path,
        "health": health,
        "statistics": stats.data,
    });
    if let Some(e) = &stats.error {
        doc["error"] = json!(e);
    }
    doc
}

fn print_status(db_path: &Path, health: &Health, stats: &Response<GraphStatistics>) {
    println!("\nkubegraph status\n");
    println!("  Database: {}", display_path(db_path));

    if health.store_reachable {
        println!("  {} Graph store reachable", style("[OK]").green());
    } else {
        println!(
            "  {} Graph store unreachable: {}",
            style("[!!]").red(),
            health.error.as_deref().unwrap_or("unknown error")
        );
    }

    match (&stats.data, &stats.error) {
        (_, Some(e)) => println!("  {} Cannot read graph: {}", style("[!!]").red(), e),
        (Some(s), None) if s.total_vertices > 0 => println!(
            "      {} vertices, {} edges",
            style(s.total_vertices).cyan(),
            style(s.total_edges).cyan()
        ),
        _ => println!(
            "  {} Graph is empty. Run {}",
            style("[--]").dim(),
            style("kubegraph build <snapshot>").cyan()
        ),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegraph::GraphVersion;

    fn health() -> Health {
        Health {
            store_reachable: true,
            generation: 0,
            rebuilding: false,
            error: None,
        }
    }

    #[test]
    fn test_failed_statistics_are_reported() {
        let stats: Response<GraphStatistics> = Response {
            success: false,
            data: None,
            error: Some("graph_statistics: store read failed".to_string()),
            version: GraphVersion::default(),
            consistent: true,
        };

        let doc = status_document(Path::new("db"), &health(), &stats);
        assert_eq!(doc["error"], "graph_statistics: store read failed");
        assert!(doc["statistics"].is_null());
    }

    #[test]
    fn test_successful_statistics_have_no_error() {
        let stats = Response {
            success: true,
            data: Some(GraphStatistics {
                total_vertices: 4,
                total_edges: 4,
                ..Default::default()
            }),
            error: None,
            version: GraphVersion::default(),
            consistent: true,
        };

        let doc = status_document(Path::new("db"), &health(), &stats);
        assert_eq!(doc["statistics"]["total_vertices"], 4);
        assert!(doc.get("error").is_none());
    }
}
