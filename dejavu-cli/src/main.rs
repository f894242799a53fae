//! Dejavu CLI - near-duplicate detection against a known-fake image corpus.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

const DEFAULT_INDEX_FILE: &str = "dejavu-index.jsonl";

const EXIT_CODE_HELP: &str = "\
Exit codes:
  0   success; for check: no known fake matched
  1   general error (undecodable image, invalid index data)
  64  command line usage error
  65  check matched a known fake
  66  an input file is missing or unreadable
  74  the index file could not be written";

#[derive(Parser)]
#[command(name = "dejavu")]
#[command(author, version, about = "Near-duplicate detection for recycled media", long_about = None)]
#[command(after_help = EXIT_CODE_HELP)]
struct Cli {
    /// Suppress human-readable output (--json output is still printed)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// When to color the output
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content digest and perceptual fingerprint of an image
    Hash {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Fingerprint an image and record it in the known-fake index
    Add {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Date the original was first published (ISO 8601)
        #[arg(short, long)]
        date: String,

        /// What the original actually shows
        #[arg(long)]
        description: String,

        /// URL of the earliest known publication
        #[arg(short, long, default_value = "")]
        url: String,

        /// Path to the known-fake index file
        #[arg(short, long, default_value = DEFAULT_INDEX_FILE)]
        index: PathBuf,
    },

    /// Check an image against the known-fake index
    Check {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Maximum Hamming distance counted as a match
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Path to the known-fake index file
        #[arg(short, long, default_value = DEFAULT_INDEX_FILE)]
        index: PathBuf,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index size and checker configuration
    Stats {
        /// Path to the known-fake index file
        #[arg(short, long, default_value = DEFAULT_INDEX_FILE)]
        index: PathBuf,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and exit 0; everything else is a
            // usage error.
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_logging(cli.verbose);
    apply_color_mode(cli.color);

    let outcome = match cli.command {
        Commands::Hash { file, json } => commands::hash::execute(file, json, cli.quiet).await,
        Commands::Add {
            file,
            date,
            description,
            url,
            index,
        } => commands::add::execute(file, date, description, url, index, cli.quiet).await,
        Commands::Check {
            file,
            threshold,
            index,
            json,
        } => commands::check::execute(file, threshold, index, json, cli.quiet).await,
        Commands::Stats { index, json } => commands::stats::execute(index, json, cli.quiet).await,
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            std::process::exit(exit_codes::from_error(&err));
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dejavu=debug,dejavu_core=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr so --json output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_color_mode(mode: ColorMode) {
    match mode {
        ColorMode::Auto => {}
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
    }
}
