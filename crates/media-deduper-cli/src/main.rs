use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use media_deduper_core::logging::{init_logger, LOG_ENV_VAR};
use media_deduper_core::{
    Config, DuplicateReport, MediaDeduper, MediaFilter, ScanEvent, ScanRequest, ScanStatus,
};

#[derive(Parser)]
#[command(name = "media-deduper")]
#[command(about = "Find and safely remove near-duplicate images and videos")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write rotating log files here instead of logging to stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory and report near-duplicates
    Scan {
        /// Directory to scan
        directory: PathBuf,

        /// Media to include: image, video or both
        #[arg(long, default_value = "both")]
        filter: MediaFilter,

        /// Maximum Hamming distance for a pair
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Discard all cached fingerprints first
        #[arg(long)]
        clear_cache: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report near-duplicates among already scanned files
    Duplicates {
        /// Directory that was scanned
        directory: PathBuf,

        /// Maximum Hamming distance for a pair
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Media to include: image, video or both
        #[arg(long)]
        filter: Option<MediaFilter>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one file, refusing anything outside the scanned directory
    Delete {
        /// File to delete
        file: PathBuf,

        /// Directory the file was scanned under
        #[arg(long)]
        root: PathBuf,
    },

    /// Show fingerprint cache statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached fingerprint
    ClearCache,

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "media-deduper.json")]
        path: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    // Parse command line arguments
    let cli = Cli::parse();

    if let Commands::GenerateConfig { path } = &cli.command {
        let config = Config::default();
        config.save_to_file(path)?;
        println!("Configuration file generated at: {}", path.display());
        return Ok(());
    }

    // Set up configuration
    let config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => Config::default(),
    };
    config.validate()?;

    // Set log level based on verbosity
    let level = match cli.verbose {
        0 => config.log_level.to_level_filter(),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    init_logging(cli.log_dir.as_deref(), level)?;

    let deduper = Arc::new(MediaDeduper::new(config).context("failed to open fingerprint cache")?);

    match cli.command {
        Commands::Scan {
            directory,
            filter,
            threshold,
            clear_cache,
            json,
        } => {
            let mut request = ScanRequest::new(&directory)
                .with_filter(filter)
                .with_clear_cache(clear_cache);
            if let Some(threshold) = threshold {
                request = request.with_threshold(threshold);
            }

            let status = run_scan(&deduper, request)?;
            print_scan_summary(&status);

            let root = status.root_path.clone().unwrap_or(directory);
            let report = deduper.find_duplicates(&root, None, None)?;
            print_report(&report, json)?;
            Ok(())
        }

        Commands::Duplicates {
            directory,
            threshold,
            filter,
            json,
        } => {
            let report = deduper.find_duplicates(&directory, threshold, filter)?;
            print_report(&report, json)?;
            Ok(())
        }

        Commands::Delete { file, root } => {
            let deleted = deduper.delete_file(&file, &root)?;
            println!("Deleted {}", deleted.display());
            Ok(())
        }

        Commands::Stats { json } => {
            let stats = deduper.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Files cached:  {}", stats.total_files_cached);
                println!("  images:      {}", stats.total_images);
                println!("  videos:      {}", stats.total_videos);
                println!("Total size:    {}", format_bytes(stats.total_size_bytes));
                match stats.cache_created_at {
                    Some(created) => println!("Oldest entry:  {}", created.to_rfc3339()),
                    None => println!("Oldest entry:  -"),
                }
            }
            Ok(())
        }

        Commands::ClearCache => {
            let removed = deduper.clear_cache()?;
            println!("Removed {} cached fingerprints", removed);
            Ok(())
        }

        Commands::GenerateConfig { .. } => Ok(()),
    }
}

fn init_logging(log_dir: Option<&Path>, level: LevelFilter) -> anyhow::Result<()> {
    match log_dir {
        Some(dir) => init_logger(dir, level)
            .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e)),
        None => {
            env_logger::Builder::new()
                .filter_level(level)
                .parse_env(LOG_ENV_VAR)
                .init();
            Ok(())
        }
    }
}

/// Start a scan and follow its events until it finishes
fn run_scan(deduper: &Arc<MediaDeduper>, request: ScanRequest) -> anyhow::Result<ScanStatus> {
    let events = deduper.subscribe();

    let cancel_target = Arc::clone(deduper);
    ctrlc::set_handler(move || {
        if cancel_target.cancel_scan().is_ok() {
            eprintln!("Cancelling scan after the current file...");
        }
    })
    .context("failed to install Ctrl-C handler")?;

    let started = deduper.start_scan(request)?;
    info!(
        "Scanning {}",
        started
            .root_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_message("Discovering media files...");

    for event in events.iter() {
        match event {
            ScanEvent::Started { .. } => {}
            ScanEvent::Discovered { total } => {
                progress_bar.set_length(total as u64);
                progress_bar.set_style(
                    ProgressStyle::default_bar()
                        .template("[{eta}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("##-"),
                );
            }
            ScanEvent::Progress {
                processed, current, ..
            } => {
                progress_bar.set_position(processed as u64);
                let name = Path::new(&current)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or(current);
                progress_bar.set_message(name);
            }
            ScanEvent::FileFailed { message } => {
                progress_bar.suspend(|| warn!("{}", message));
            }
            ScanEvent::Finished(_) => break,
        }
    }
    progress_bar.finish_and_clear();

    Ok(deduper.wait_for_scan())
}

fn print_scan_summary(status: &ScanStatus) {
    let elapsed = match (status.start_time, status.end_time) {
        (Some(start), Some(end)) => format!("{:.1}s", (end - start).num_milliseconds() as f64 / 1000.0),
        _ => "-".to_string(),
    };

    println!(
        "Scanned {} of {} files in {} ({} fingerprinted, {} from cache, {} skipped, {} pruned)",
        status.processed_files,
        status.total_files,
        elapsed,
        status.fingerprinted,
        status.cache_hits,
        status.skipped_files,
        status.pruned_files
    );
    if status.cancelled {
        println!("Scan was cancelled; results are partial");
    }
    if !status.errors.is_empty() {
        println!("{} errors:", status.errors.len());
        for error in &status.errors {
            println!("  {}", error);
        }
    }
}

fn print_report(report: &DuplicateReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.pairs.is_empty() {
        println!("No duplicates found");
        return Ok(());
    }

    // Closest matches first
    let mut pairs: Vec<_> = report.pairs.iter().collect();
    pairs.sort_by_key(|p| p.similarity_score);

    for pair in pairs {
        println!(
            "{:>6.2}%  {}  <->  {}  (save {})",
            pair.similarity_percentage,
            pair.file1.path.display(),
            pair.file2.path.display(),
            format_bytes(pair.potential_savings())
        );
    }
    println!(
        "{} pairs, up to {} recoverable",
        report.total_pairs,
        format_bytes(report.total_potential_savings_bytes)
    );
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(500 * 1024 * 1024), "500.0 MB");
    }

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from([
            "media-deduper",
            "scan",
            "/photos",
            "--filter",
            "image",
            "-t",
            "8",
        ])
        .unwrap();

        match cli.command {
            Commands::Scan {
                directory,
                filter,
                threshold,
                clear_cache,
                ..
            } => {
                assert_eq!(directory, PathBuf::from("/photos"));
                assert_eq!(filter, MediaFilter::Image);
                assert_eq!(threshold, Some(8));
                assert!(!clear_cache);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_filter() {
        assert!(Cli::try_parse_from(["media-deduper", "scan", "/photos", "--filter", "audio"]).is_err());
    }
}
