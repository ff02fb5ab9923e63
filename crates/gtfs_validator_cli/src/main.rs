use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tracing::{info, warn, Level};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use gtfs_sieve_core::rules::default_registry;
use gtfs_sieve_core::{
    CancellationToken, FeedSource, ProgressEvent, RunState, ValidationConfig, ValidationMode,
};
use gtfs_sieve_report::{validate_feed, JsonFormat, ValidationReport};

const DEFAULT_REPORT_NAME: &str = "report.json";

#[derive(Debug, Parser)]
#[command(name = "gtfs-sieve")]
#[command(about = "Streaming GTFS feed validator", version)]
struct Args {
    /// Zip archive or directory holding the feed.
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Download the feed from this URL instead of reading --input.
    #[arg(short = 'u', long = "url")]
    url: Option<String>,

    #[arg(short = 's', long = "storage_directory", alias = "storage-directory")]
    storage_directory: Option<PathBuf>,

    #[arg(short = 'o', long = "output", alias = "output_base")]
    output: PathBuf,

    #[arg(short = 'c', long = "country-code", alias = "country_code")]
    country_code: Option<String>,

    /// Validation date, YYYY-MM-DD or YYYYMMDD. Defaults to today.
    #[arg(short = 'd', long = "date", alias = "date-for-validation")]
    date: Option<String>,

    /// Worker threads. Values below 1 fall back to 1.
    #[arg(long = "threads", allow_negative_numbers = true)]
    threads: Option<i64>,

    /// performance, default or comprehensive.
    #[arg(short = 'm', long = "mode", default_value = "default")]
    mode: ValidationMode,

    /// Notices retained per code; 0 keeps all. Defaults to the mode's cap.
    #[arg(long = "max-notices-per-type", allow_negative_numbers = true)]
    max_notices_per_type: Option<i64>,

    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Advisory memory budget in bytes.
    #[arg(long = "max-memory", allow_negative_numbers = true)]
    max_memory: Option<i64>,

    #[arg(short = 'p', long = "pretty")]
    pretty: bool,

    #[arg(short = 'r', long = "report-name", alias = "validation_report_name")]
    report_name: Option<String>,

    #[arg(long = "validated-at")]
    validated_at: Option<String>,

    /// Show a progress bar while validators run.
    #[arg(long = "progress")]
    progress: bool,

    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();

    let resolved = resolve_input(&args)?;
    info!("input {} detected", resolved.label);
    let feed = FeedSource::Path(resolved.path.clone())
        .open()
        .with_context(|| format!("open feed {}", resolved.path.display()))?;

    let progress_bar = args.progress.then(progress_bar);
    let config = build_config(&args, progress_bar.clone())?;

    let mut report = validate_feed(
        feed.as_ref(),
        &config,
        &CancellationToken::new(),
        Arc::new(default_registry()),
    )
    .context("validate feed")?;
    if let Some(bar) = progress_bar {
        bar.finish_with_message("validation complete");
    }

    report.summary.gtfs_input = Some(resolved.label);
    if let Some(validated_at) = args.validated_at.as_deref() {
        report.summary.validated_at = Some(validated_at.to_string());
    }
    match report.summary.state {
        Some(RunState::TimedOut) => warn!("validation timed out, report is partial"),
        Some(RunState::Cancelled) => warn!("validation cancelled, report is partial"),
        _ => {}
    }

    write_report(&args, &report)?;
    info!(
        errors = report.error_count(),
        warnings = report.warning_count(),
        infos = report.info_count(),
        elapsed_secs = report.summary.elapsed_seconds(),
        "done"
    );
    Ok(())
}

fn build_config(args: &Args, progress: Option<ProgressBar>) -> anyhow::Result<ValidationConfig> {
    let mut builder = ValidationConfig::builder().mode(args.mode);
    if let Some(country_code) = args.country_code.as_deref() {
        builder = builder.country_code(country_code);
    }
    if let Some(date) = args.date.as_deref() {
        builder = builder.current_date(parse_validation_date(date)?);
    }
    if let Some(threads) = args.threads {
        builder = builder.parallel_workers(threads);
    }
    if let Some(cap) = args.max_notices_per_type {
        builder = builder.max_notices_per_type(cap);
    }
    if let Some(seconds) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(seconds));
    }
    if let Some(bytes) = args.max_memory {
        builder = builder.max_memory_bytes(bytes);
    }
    if let Some(bar) = progress {
        builder = builder.progress_handler(move |event: &ProgressEvent| {
            bar.set_length(event.total as u64);
            bar.set_position(event.completed as u64);
            bar.set_message(event.validator);
        });
    }
    Ok(builder.build())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.magenta/magenta} {pos}/{len} {msg}",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message("waiting to validate...");
    bar
}

fn write_report(args: &Args, report: &ValidationReport) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("create output dir {}", args.output.display()))?;
    let name = args.report_name.as_deref().unwrap_or(DEFAULT_REPORT_NAME);
    let path = args.output.join(name);
    let format = if args.pretty {
        JsonFormat::Pretty
    } else {
        JsonFormat::Compact
    };
    report
        .write_json_with_format(&path, format)
        .with_context(|| format!("write report {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}

struct ResolvedInput {
    path: PathBuf,
    label: String,
}

fn resolve_input(args: &Args) -> anyhow::Result<ResolvedInput> {
    match (&args.input, &args.url) {
        (Some(_), Some(_)) => {
            bail!("--input and --url cannot be provided at the same time");
        }
        (None, None) => {
            bail!("one of --input or --url must be provided");
        }
        (Some(path), None) => {
            if args.storage_directory.is_some() {
                bail!("--storage_directory requires --url");
            }
            Ok(ResolvedInput {
                path: path.clone(),
                label: path.display().to_string(),
            })
        }
        (None, Some(url)) => {
            if url.trim().is_empty() {
                bail!("--url must not be empty");
            }
            if let Some(storage_directory) = args.storage_directory.as_ref() {
                std::fs::create_dir_all(storage_directory).with_context(|| {
                    format!("create storage directory {}", storage_directory.display())
                })?;
            }
            let (download_dir, file_name) = match args.storage_directory.clone() {
                Some(dir) => (dir, download_file_name(url)),
                None => (
                    std::env::temp_dir(),
                    format!("gtfs_download_{}_{}.zip", std::process::id(), unique_suffix()),
                ),
            };
            let download_path = download_dir.join(file_name);
            download_url_to_path(url, &download_path)?;
            Ok(ResolvedInput {
                path: download_path,
                label: url.clone(),
            })
        }
    }
}

fn download_file_name(url: &str) -> String {
    let trimmed = url.split('?').next().unwrap_or(url);
    let candidate = trimmed
        .rsplit('/')
        .next()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("gtfs.zip");
    if candidate.to_ascii_lowercase().ends_with(".zip") {
        candidate.to_string()
    } else {
        format!("{candidate}.zip")
    }
}

fn download_url_to_path(url: &str, path: &Path) -> anyhow::Result<()> {
    let client = Client::builder()
        .user_agent(format!("gtfs-sieve/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;
    let mut response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("download gtfs from {url}"))?;
    let mut file =
        std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    std::io::copy(&mut response, &mut file).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn unique_suffix() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

fn parse_validation_date(value: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("--date cannot be empty");
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .with_context(|| format!("invalid --date {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(parse_validation_date("2024-06-01").unwrap(), expected);
        assert_eq!(parse_validation_date(" 20240601 ").unwrap(), expected);
        assert!(parse_validation_date("June 1st").is_err());
        assert!(parse_validation_date("").is_err());
    }

    #[test]
    fn download_names_end_in_zip() {
        assert_eq!(
            download_file_name("https://example.com/feeds/metro.zip?key=1"),
            "metro.zip"
        );
        assert_eq!(download_file_name("https://example.com/gtfs"), "gtfs.zip");
        assert_eq!(download_file_name("https://example.com/"), "gtfs.zip");
    }

    #[test]
    fn flags_map_onto_sanitized_config() {
        let args = Args::parse_from([
            "gtfs-sieve",
            "--input",
            "feed.zip",
            "--output",
            "out",
            "--threads",
            "-3",
            "--mode",
            "performance",
            "--max-notices-per-type",
            "50000",
            "--country-code",
            "de",
            "--date",
            "20240601",
        ]);

        let config = build_config(&args, None).unwrap();

        assert_eq!(config.parallel_workers(), 1);
        assert_eq!(config.mode(), ValidationMode::Performance);
        assert_eq!(config.max_notices_per_type(), Some(10_000));
        assert_eq!(config.country_code(), "DE");
        assert_eq!(
            config.current_date(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn input_and_url_are_exclusive() {
        let args = Args::parse_from([
            "gtfs-sieve",
            "--input",
            "feed.zip",
            "--url",
            "https://example.com/feed.zip",
            "--output",
            "out",
        ]);
        assert!(resolve_input(&args).is_err());
    }
}
