//! Init command - write an example config file

use anyhow::{Context, Result};
use console::style;
use kubegraph::config::{Config, CONFIG_FILE};
use std::path::{Path, PathBuf};

/// Run the init command
pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    if path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            style("✓").green(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, Config::example())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "{} Created {}",
        style("✓").green(),
        style(path.display()).cyan()
    );
    println!(
        "\nNext: {}",
        style("kubegraph build <snapshot.json>").cyan()
    );
    Ok(())
}
