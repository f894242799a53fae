//! Shared helpers for index-file I/O and input validation.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use dejavu_core::{KnownFakeEntry, ScanStrategy, SimilarityIndex};
use tracing::debug;

/// Read an input file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Load a JSON Lines index file into a similarity index.
///
/// A missing file is an empty corpus, not an error: checking against an
/// index nobody has populated yet reports "no match".
pub fn load_index(path: &Path, width: u32, strategy: ScanStrategy) -> Result<SimilarityIndex> {
    if !path.exists() {
        debug!(path = %path.display(), "Index file absent, starting empty");
        return SimilarityIndex::new(width, strategy).context("Failed to create index");
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index file: {}", path.display()))?;

    let mut entries = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: KnownFakeEntry = serde_json::from_str(line).with_context(|| {
            format!(
                "Invalid index entry at {}:{}",
                path.display(),
                line_number + 1
            )
        })?;
        entries.push(entry);
    }

    debug!(path = %path.display(), entries = entries.len(), "Loaded index file");
    SimilarityIndex::from_entries(width, strategy, entries)
        .with_context(|| format!("Rejected index file: {}", path.display()))
}

/// Append one entry to a JSON Lines index file, creating the file if needed.
pub fn append_entry(path: &Path, entry: &KnownFakeEntry) -> Result<()> {
    let line = serde_json::to_string(entry).context("Failed to serialize index entry")?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to write index file: {}", path.display()))?;
    writeln!(file, "{line}")
        .with_context(|| format!("Failed to write index file: {}", path.display()))?;
    Ok(())
}

/// Validate an ISO 8601 date, either date-only or a full RFC 3339 timestamp.
pub fn validate_iso_date(raw: &str) -> Result<()> {
    if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(raw).is_ok()
    {
        return Ok(());
    }
    bail!("Invalid --date {raw:?}: expected ISO 8601, e.g. 2018-07-05")
}
