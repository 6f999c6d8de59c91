//! Build and analyze commands

use super::{create_spinner_style, display_path, emit, print_json, take_data};
use anyhow::{Context, Result};
use console::style;
use indicatif::ProgressBar;
use kubegraph::models::{Snapshot, SnapshotSummary};
use kubegraph::{AttackGraphService, BuildReport, RiskAssessment};
use std::path::Path;
use std::time::Duration;

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let load = Snapshot::from_json(&text)
        .with_context(|| format!("Failed to decode snapshot {}", path.display()))?;
    if load.rejected > 0 {
        eprintln!(
            "{} {} malformed snapshot records skipped",
            style("warning:").yellow().bold(),
            load.rejected
        );
    }
    Ok(load.snapshot)
}

fn spinner(json: bool, msg: &str) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(create_spinner_style());
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Run the build command
pub fn run(service: AttackGraphService, snapshot_path: &Path, json: bool) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path)?;

    let spinner = spinner(json, "Building graph...");
    let response = service.build(&snapshot);
    spinner.finish_and_clear();

    service
        .into_context()
        .shutdown()
        .context("Failed to persist graph")?;

    emit(response, json, |report| {
        println!(
            "\n{} Built graph from {}\n",
            style("✓").green(),
            display_path(snapshot_path)
        );
        print_report(&report);
    })
}

/// Run the analyze command (build + visualization + risk)
pub fn run_full(
    service: AttackGraphService,
    snapshot_path: &Path,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let snapshot = load_snapshot(snapshot_path)?;

    let spinner = spinner(json, "Building and analyzing graph...");
    let response = service.full_process(&snapshot, namespace);
    spinner.finish_and_clear();

    service
        .into_context()
        .shutdown()
        .context("Failed to persist graph")?;

    if json {
        print_json(&response)?;
        if !response.success {
            anyhow::bail!("{}", response.error.unwrap_or_default());
        }
        return Ok(());
    }

    let report = take_data(response)?;
    println!("\n{} Snapshot {}\n", style("▸").cyan(), display_path(snapshot_path));
    print_summary(&report.snapshot);
    println!();
    print_report(&report.build);
    println!(
        "\n  Visualization: {} nodes, {} edges{}",
        style(report.visualization.statistics.node_count).cyan(),
        style(report.visualization.statistics.edge_count).cyan(),
        if report.visualization.statistics.truncated {
            style(" (node limit reached)").dim().to_string()
        } else {
            String::new()
        }
    );
    println!();
    print_risk(&report.risk_assessment);
    Ok(())
}

fn print_summary(summary: &SnapshotSummary) {
    println!(
        "  {} namespaces, {} pods, {} services, {} deployments, {} cluster roles",
        style(summary.namespaces).cyan(),
        style(summary.pods).cyan(),
        style(summary.services).cyan(),
        style(summary.deployments).cyan(),
        style(summary.cluster_roles).cyan()
    );
}

pub(super) fn print_report(report: &BuildReport) {
    println!(
        "  Generation {}: {} vertices, {} edges",
        style(report.generation).bold(),
        style(report.total_vertices()).cyan(),
        style(report.total_edges()).cyan()
    );
    for (label, count) in &report.vertices {
        println!("    {:<22} {}", label.to_string(), count);
    }
    for (label, count) in &report.edges {
        println!("    {:<22} {}", label.to_string(), count);
    }
    if report.high_risk_pods > 0 {
        println!(
            "  {} {} pods tagged high risk",
            style("!").red().bold(),
            report.high_risk_pods
        );
    }
    if report.duplicates + report.skipped_records + report.failed_edges > 0 {
        println!(
            "  {}",
            style(format!(
                "{} duplicate records, {} skipped records, {} failed edges",
                report.duplicates, report.skipped_records, report.failed_edges
            ))
            .dim()
        );
    }
}

pub(super) fn print_risk(risk: &RiskAssessment) {
    println!(
        "  High risk vertices: {}   Privileged pods: {}   Exposed services: {}   Total vertices: {}",
        style(risk.high_risk_count).red(),
        style(risk.privileged_pod_count).red(),
        style(risk.exposed_service_count).yellow(),
        risk.total_vertices
    );
    if risk.risk_factors.is_empty() {
        println!("  {} No risk factors found", style("✓").green());
        return;
    }
    for factor in &risk.risk_factors {
        println!(
            "  [{}] {} x{} - {}",
            style(factor.severity.as_str().to_uppercase()).bold(),
            style(&factor.factor).cyan(),
            factor.count,
            factor.description
        );
    }
}
