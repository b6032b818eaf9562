//! Fable CLI - Command-line tool for Fable III BNK archives.
//!
//! This is the main entry point for the `fable` command-line application.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use fable::bnk::{collect_extracted, Error as BnkError, EXTRACT_STAGE};
use fable::prelude::*;

/// Fable - Fable III BNK archive tool
#[derive(Parser)]
#[command(name = "fable")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files from a BNK archive
    BnkExtract {
        /// Path to the BNK header file
        #[arg(long, env = "FABLE_BNK_HEADER")]
        header: PathBuf,

        /// Path to the BNK data file
        #[arg(long, env = "FABLE_BNK_DATA")]
        data: PathBuf,

        /// Output directory
        #[arg(short, long, env = "FABLE_OUTPUT")]
        output: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Worker threads (defaults to one per core)
        #[arg(short, long, env = "FABLE_THREADS")]
        threads: Option<usize>,
    },

    /// List contents of a BNK archive
    BnkList {
        /// Path to the BNK header file
        #[arg(long, env = "FABLE_BNK_HEADER")]
        header: PathBuf,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,

        /// Print the listing as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Pack a directory tree into a BNK archive
    BnkPack {
        /// Directory to pack
        #[arg(short, long)]
        input: PathBuf,

        /// Path of the BNK header file to write
        #[arg(long, env = "FABLE_BNK_HEADER")]
        header: PathBuf,

        /// Path of the BNK data file to write
        #[arg(long, env = "FABLE_BNK_DATA")]
        data: PathBuf,

        /// Store file data without compression
        #[arg(long)]
        no_compress: bool,

        /// Payload bytes per header chunk
        #[arg(long, default_value_t = BnkBuilder::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// DEFLATE level (0-9)
        #[arg(long, default_value_t = 6)]
        level: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::BnkExtract {
            header,
            data,
            output,
            filter,
            threads,
        } => {
            cmd_bnk_extract(&header, &data, &output, filter.as_deref(), threads)?;
        }
        Commands::BnkList {
            header,
            filter,
            detailed,
            json,
        } => {
            cmd_bnk_list(&header, filter.as_deref(), detailed, json)?;
        }
        Commands::BnkPack {
            input,
            header,
            data,
            no_compress,
            chunk_size,
            level,
        } => {
            cmd_bnk_pack(&input, &header, &data, !no_compress, chunk_size, level)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn cmd_bnk_extract(
    header_path: &Path,
    data_path: &Path,
    output: &Path,
    filter: Option<&str>,
    threads: Option<usize>,
) -> Result<()> {
    println!("Opening BNK archive: {}", header_path.display());

    let start = Instant::now();
    let archive = BnkArchive::open(header_path, data_path).context("Failed to open BNK archive")?;

    println!("Loaded {} entries in {:?}", archive.entry_count(), start.elapsed());

    let filter = compile_filter(filter)?;
    let indices: Vec<usize> = archive
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| filter.as_ref().map_or(true, |p| matches_filter(p, &e.full_path)))
        .map(|(i, _)| i)
        .collect();

    println!("Extracting {} entries...", indices.len());

    let pb = progress_bar(indices.len())?;
    pb.set_message(EXTRACT_STAGE);
    let progress = |_: f32, _: &str| pb.inc(1);

    let start = Instant::now();
    let options = ExtractOptions { threads };
    let results = archive
        .extract_indices_with(&options, &indices, Some(&progress), &CancelToken::new())
        .context("Failed to start extraction")?;
    pb.finish_with_message("Done");

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    match collect_extracted(archive.entries(), &indices, results) {
        Ok(files) => {
            write_files(output, &files)?;
            println!("Extracted {} files in {:?}", files.len(), start.elapsed());
            Ok(())
        }
        Err(BnkError::Extraction(partial)) => {
            write_files(output, &partial.extracted)?;
            for failure in &partial.failures {
                error!(index = failure.index, path = %failure.path, "{}", failure.error);
            }
            println!(
                "Extracted {} files in {:?} ({} errors)",
                partial.extracted.len(),
                start.elapsed(),
                partial.failures.len()
            );
            anyhow::bail!(
                "{} of {} entries failed to extract",
                partial.failures.len(),
                partial.total()
            )
        }
        Err(e) => Err(anyhow::Error::new(e).context("Extraction failed")),
    }
}

fn write_files(output: &Path, files: &[ExtractedFile]) -> Result<()> {
    files.par_iter().try_for_each(|file| -> Result<()> {
        let relative = file
            .output_path()
            .with_context(|| format!("Refusing to write {}", file.path))?;
        let output_path = output.join(relative);

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&output_path, &file.data)
            .with_context(|| format!("Failed to write {}", output_path.display()))
    })
}

fn cmd_bnk_list(header_path: &Path, filter: Option<&str>, detailed: bool, json: bool) -> Result<()> {
    let header = read_header_file(header_path, &Deflate).context("Failed to read BNK header")?;

    let filter = compile_filter(filter)?;
    let entries: Vec<(usize, &FileEntry)> = header
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| filter.as_ref().map_or(true, |p| matches_filter(p, &e.full_path)))
        .collect();

    if json {
        let listing = serde_json::json!({
            "summary": ArchiveSummary::of(&header),
            "entries": entries.iter().map(|(_, e)| e).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for (index, entry) in &entries {
        if detailed {
            let compressed = header
                .compression()
                .get(*index)
                .map_or_else(|| "-".to_string(), |info| info.compressed_size.to_string());
            println!(
                "{:08X} {:>12} {:>12} {:>12} {}",
                entry.content_hash, entry.data_offset, entry.uncompressed_size, compressed, entry.full_path
            );
        } else {
            println!("{}", entry.full_path);
        }
    }

    println!("\nTotal: {} entries", entries.len());

    Ok(())
}

fn cmd_bnk_pack(
    input: &Path,
    header_path: &Path,
    data_path: &Path,
    compress: bool,
    chunk_size: usize,
    level: u32,
) -> Result<()> {
    println!("Packing: {}", input.display());

    let start = Instant::now();
    let mut builder = BnkBuilder::new()
        .compress(compress)
        .chunk_size(chunk_size)
        .level(level);

    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.context("Failed to walk input directory")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(input)?;
        let name = archive_path(relative)
            .with_context(|| format!("Cannot store {} in a BNK archive", relative.display()))?;
        debug!(path = %name, "adding file");

        let data = fs::read(entry.path()).with_context(|| format!("Failed to read {}", entry.path().display()))?;
        builder.add_file(name, data);
    }

    builder
        .write(header_path, data_path)
        .context("Failed to write BNK archive")?;

    println!("Packed {} files in {:?}", builder.len(), start.elapsed());

    Ok(())
}

/// Archive path for a file relative to the packed directory.
fn archive_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().filter(|s| s.is_ascii())?),
            _ => return None,
        }
    }
    Some(parts.join("\\"))
}

/// Compile a filter pattern. Patterns without wildcards match as substrings.
fn compile_filter(pattern: Option<&str>) -> Result<Option<Pattern>> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };

    let pattern = pattern.replace('\\', "/");
    let pattern = if pattern.contains(['*', '?', '[']) {
        pattern
    } else {
        format!("*{pattern}*")
    };

    Pattern::new(&pattern)
        .map(Some)
        .with_context(|| format!("Invalid filter pattern: {pattern}"))
}

fn matches_filter(pattern: &Pattern, path: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    pattern.matches_with(&path.replace('\\', "/"), options)
}
