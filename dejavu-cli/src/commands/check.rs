//! Check command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use dejavu_core::{CheckResult, CheckerBuilder, CheckerConfig, ScanStrategy, SimilarityMatch};
use serde::Serialize;
use tracing::{debug, info};

use crate::{exit_codes, utils};

#[derive(Serialize)]
struct CheckOutput<'a> {
    file: String,
    recycled: bool,
    matches: &'a [SimilarityMatch],
    warnings: &'a [String],
}

/// Execute the check command.
pub async fn execute(
    file: PathBuf,
    threshold: Option<u32>,
    index_path: PathBuf,
    json: bool,
    quiet: bool,
) -> Result<i32> {
    let content = utils::read_file(&file)?;
    info!(path = %file.display(), bytes = content.len(), "Read file");

    let mut config = CheckerConfig::from_env();
    if let Some(threshold) = threshold {
        config.match_threshold = threshold;
    }

    let index = utils::load_index(&index_path, config.fingerprint_width, ScanStrategy::default())?;
    debug!(entries = index.len(), "Loaded known-fake index");

    let checker = CheckerBuilder::new()
        .with_config(config)
        .with_index(Arc::new(index))
        .build()
        .context("Failed to build checker")?;

    let result = checker.check(&content).await.context("Check failed")?;

    if json {
        let output = CheckOutput {
            file: file.display().to_string(),
            recycled: result.is_recycled(),
            matches: &result.matches,
            warnings: &result.warnings,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize output")?
        );
    } else if !quiet {
        render_verdict(&result);
    }

    Ok(if result.is_recycled() {
        exit_codes::MATCH_FOUND
    } else {
        exit_codes::SUCCESS
    })
}

fn render_verdict(result: &CheckResult) {
    if let Some(best) = result.best_match() {
        println!();
        println!("{}", "╔════════════════════════════════════════╗".red());
        println!(
            "{}",
            "║               KNOWN FAKE               ║".red().bold()
        );
        println!("{}", "╚════════════════════════════════════════╝".red());
        println!();
        println!("   {} {}", "Entry id:".dimmed(), best.entry_id);
        println!("   {} {} bits", "Distance:".dimmed(), best.distance);
        println!(
            "   {} {}",
            "Similarity:".dimmed(),
            format!("{}%", best.similarity_percent).red()
        );
        if !best.provenance.original_url.is_empty() {
            println!(
                "   {} {}",
                "Original:".dimmed(),
                best.provenance.original_url
            );
        }
        println!(
            "   {} {}",
            "Published:".dimmed(),
            best.provenance.original_date
        );
        println!(
            "   {} {}",
            "Details:".dimmed(),
            best.provenance.description
        );
        if result.matches.len() > 1 {
            println!(
                "   {} {} entries within threshold",
                "Matches:".dimmed(),
                result.matches.len()
            );
        }
    } else {
        println!();
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!(
            "{}",
            "║                NO MATCH                ║".green().bold()
        );
        println!("{}", "╚════════════════════════════════════════╝".green());
        println!();
        println!(
            "   {} {}",
            "Corpus:".dimmed(),
            "no known fake within threshold".green()
        );
    }

    for warning in &result.warnings {
        println!("   {} {}", "Warning:".dimmed(), warning.yellow());
    }
}
