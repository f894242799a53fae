//! Hash command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use dejavu_core::{BlockhashCodec, ImageCodec};
use serde::Serialize;
use tracing::info;

use crate::{exit_codes, utils};

#[derive(Serialize)]
struct HashOutput {
    file: String,
    digest: String,
    algorithm: String,
    fingerprint: String,
}

/// Execute the hash command.
pub async fn execute(file: PathBuf, json: bool, quiet: bool) -> Result<i32> {
    let content = utils::read_file(&file)?;
    info!(path = %file.display(), bytes = content.len(), "Read file");

    let codec = BlockhashCodec::new();
    let digest = codec.digest(&content);
    let fingerprint = codec
        .fingerprint(&content)
        .context("Failed to fingerprint image")?;

    if json {
        let output = HashOutput {
            file: file.display().to_string(),
            digest: digest.to_hex(),
            algorithm: fingerprint.algorithm.to_string(),
            fingerprint: fingerprint.to_hex(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize output")?
        );
    } else if !quiet {
        println!();
        println!("   {} {}", "File:".dimmed(), file.display());
        println!("   {} {}", "Digest:".dimmed(), digest.to_hex());
        println!("   {} {}", "Fingerprint:".dimmed(), fingerprint);
    }

    Ok(exit_codes::SUCCESS)
}
