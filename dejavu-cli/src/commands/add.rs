//! Add command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use dejavu_core::{
    BlockhashCodec, CheckerConfig, ImageCodec, KnownFakeEntry, Provenance, ScanStrategy,
};
use tracing::info;

use crate::{exit_codes, utils};

/// Execute the add command.
pub async fn execute(
    file: PathBuf,
    date: String,
    description: String,
    url: String,
    index_path: PathBuf,
    quiet: bool,
) -> Result<i32> {
    utils::validate_iso_date(&date)?;

    let content = utils::read_file(&file)?;
    info!(path = %file.display(), bytes = content.len(), "Read file");

    let codec = BlockhashCodec::new();
    let fingerprint = codec
        .fingerprint(&content)
        .context("Failed to fingerprint image")?;

    let config = CheckerConfig::from_env();
    let index = utils::load_index(&index_path, config.fingerprint_width, ScanStrategy::default())?;

    let provenance = Provenance {
        original_url: url,
        original_date: date,
        description,
    };
    let id = index
        .add(fingerprint.clone(), provenance.clone())
        .context("Failed to add entry to index")?;

    let entry = KnownFakeEntry {
        id,
        fingerprint,
        provenance,
    };
    utils::append_entry(&index_path, &entry)?;

    info!(entry_id = id, index = %index_path.display(), "Recorded known fake");

    if !quiet {
        println!();
        println!("{}", "Known fake recorded".green().bold());
        println!();
        println!("   {} {}", "Entry id:".dimmed(), id);
        println!("   {} {}", "Fingerprint:".dimmed(), entry.fingerprint);
        println!("   {} {}", "Index:".dimmed(), index_path.display());
    }

    Ok(exit_codes::SUCCESS)
}
