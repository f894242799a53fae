//! Stats command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use dejavu_core::{CheckerConfig, ScanStrategy};
use serde::Serialize;
use tracing::debug;

use crate::{exit_codes, utils};

#[derive(Serialize)]
struct StatsOutput {
    index: String,
    entries: usize,
    fingerprint_width: u32,
    match_threshold: u32,
    scan_strategy: String,
}

/// Execute the stats command.
pub async fn execute(index_path: PathBuf, json: bool, quiet: bool) -> Result<i32> {
    let config = CheckerConfig::from_env();
    let index = utils::load_index(&index_path, config.fingerprint_width, ScanStrategy::default())?;
    debug!(entries = index.len(), "Loaded known-fake index");

    if json {
        let output = StatsOutput {
            index: index_path.display().to_string(),
            entries: index.len(),
            fingerprint_width: config.fingerprint_width,
            match_threshold: config.match_threshold,
            scan_strategy: index.strategy().to_string(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize output")?
        );
    } else if !quiet {
        println!();
        println!("   {} {}", "Index:".dimmed(), index_path.display());
        println!("   {} {}", "Entries:".dimmed(), index.len());
        println!(
            "   {} {} bits",
            "Fingerprint width:".dimmed(),
            config.fingerprint_width
        );
        println!(
            "   {} {} bits",
            "Match threshold:".dimmed(),
            config.match_threshold
        );
        println!("   {} {}", "Scan strategy:".dimmed(), index.strategy());
    }

    Ok(exit_codes::SUCCESS)
}
