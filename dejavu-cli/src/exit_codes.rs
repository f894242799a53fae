//! Exit codes following sysexits.h conventions.
//!
//! These codes give scripts and CI pipelines a stable way to distinguish
//! "no match" from "known fake found" from operational failures.

/// Successful execution; for `check`, no known fake matched.
pub const SUCCESS: i32 = 0;

/// General error (catch-all, including undecodable images).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// The checked image matched a known fake.
/// Maps to EX_DATAERR from sysexits.h.
pub const MATCH_FOUND: i32 = 65;

/// Cannot open an input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error (cannot write the index file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Classify a command failure by inspecting the error chain.
pub fn from_error(err: &anyhow::Error) -> i32 {
    let message = format!("{err:#}");

    if message.contains("Failed to read") {
        INPUT_ERROR
    } else if message.contains("Invalid --date") {
        USAGE_ERROR
    } else if message.contains("Failed to write") || message.contains("serialize") {
        IO_ERROR
    } else {
        GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_read_failures_classified_as_input_error() {
        let err = anyhow!("No such file or directory")
            .context("Failed to read file: missing.png");
        assert_eq!(from_error(&err), INPUT_ERROR);

        let err = anyhow!("Permission denied")
            .context("Failed to read index file: corpus.jsonl");
        assert_eq!(from_error(&err), INPUT_ERROR);
    }

    #[test]
    fn test_date_validation_classified_as_usage_error() {
        let err = anyhow!("Invalid --date \"yesterday\": expected ISO 8601, e.g. 2018-07-05");
        assert_eq!(from_error(&err), USAGE_ERROR);
    }

    #[test]
    fn test_write_failures_classified_as_io_error() {
        let err = anyhow!("Read-only file system")
            .context("Failed to write index file: corpus.jsonl");
        assert_eq!(from_error(&err), IO_ERROR);
    }

    #[test]
    fn test_unclassified_errors_are_general() {
        let err = anyhow!("Image decode error: unsupported format");
        assert_eq!(from_error(&err), GENERAL_ERROR);
    }
}
