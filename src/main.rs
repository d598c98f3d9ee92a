use clap::Parser;
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uploadguard::cli::{Args, Command};
use uploadguard::{
    ArchiveBombDetector, ArchiveKind, GuardConfig, GuardError, GuardResult, QuickFilter, SqliteAuditLog,
    UploadDecision, UploadGate, UploadRequest, UploadScanner,
};
use walkdir::WalkDir;

/// Exit status when at least one file was rejected.
const EXIT_REJECTED: i32 = 2;

#[derive(Serialize)]
struct FileOutcome {
    path: PathBuf,
    #[serde(flatten)]
    decision: UploadDecision,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level()))
        .format_timestamp_millis()
        .init();

    log::debug!("Uploadguard starting with args: {:?}", args);

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> GuardResult<i32> {
    let config = match &args.config {
        Some(path) => GuardConfig::from_json_file(path)?,
        None => GuardConfig::default(),
    };

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .map_err(|e| GuardError::external("thread pool", e.to_string()))?;
    }

    let scanner = if args.no_lsb {
        UploadScanner::without_pixel_decoder(config.limits.clone())
    } else {
        UploadScanner::new(config.limits.clone())
    };
    if !scanner.has_pixel_decoder() {
        log::info!("LSB analysis disabled");
    }

    match args.command.clone() {
        Command::Scan {
            paths,
            mime,
            room,
            max_depth,
            follow_symlinks,
            delete_rejected,
        } => {
            let mut gate = UploadGate::new(
                QuickFilter::new(config.filter.clone()),
                ArchiveBombDetector::new(config.limits.archive.clone()),
                scanner,
            );
            if let Some(db) = &args.audit_db {
                gate = gate.with_audit(Arc::new(SqliteAuditLog::open(db)?));
            }
            if !delete_rejected {
                gate = gate.keep_rejected();
            }

            let files = collect_files(&paths, max_depth, follow_symlinks);
            log::info!("Discovered {} files for analysis", files.len());

            let show_progress = !args.quiet && !args.json && files.len() > 1;
            let outcomes = tokio::task::spawn_blocking(move || {
                scan_files(&gate, files, mime.as_deref(), room.as_deref(), show_progress)
            })
            .await?;

            let rejected = outcomes.iter().filter(|o| !o.decision.accepted).count();
            if args.json {
                print_json(&outcomes, args.pretty)?;
            } else {
                for outcome in &outcomes {
                    print_outcome(outcome);
                }
                println!(
                    "\n{} checked, {} accepted, {} rejected",
                    style(outcomes.len()).bold(),
                    style(outcomes.len() - rejected).green(),
                    style(rejected).red().bold()
                );
            }
            Ok(if rejected > 0 { EXIT_REJECTED } else { 0 })
        }

        Command::Diagnose { file } => {
            let verdict = tokio::task::spawn_blocking(move || scanner.detect_steganography(&file)).await?;
            print_json(&verdict, args.pretty || !args.json)?;
            Ok(if verdict.safe { 0 } else { EXIT_REJECTED })
        }

        Command::Bomb { archive } => {
            let ext = archive
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            let kind = ArchiveKind::from_extension(&ext).ok_or(GuardError::UnsupportedArchive(ext))?;
            let detector = ArchiveBombDetector::new(config.limits.archive.clone());
            let report = detector.detect_archive_bomb(&archive, kind)?;
            if args.json {
                print_json(&report, args.pretty)?;
            } else if report.is_bomb {
                println!(
                    "{} {} ({} entries, {} bytes uncompressed, ratio {:.1})",
                    style("BOMB").red().bold(),
                    archive.display(),
                    report.entry_count,
                    report.total_uncompressed_bytes,
                    report.compression_ratio
                );
                if let Some(error) = &report.error {
                    println!("    {}", style(error).dim());
                }
            } else {
                println!(
                    "{} {} ({} entries, ratio {:.1})",
                    style("OK").green().bold(),
                    archive.display(),
                    report.entry_count,
                    report.compression_ratio
                );
            }
            Ok(if report.is_bomb { EXIT_REJECTED } else { 0 })
        }

        Command::Quick { mime, filename } => {
            let check = QuickFilter::new(config.filter.clone()).quick_validation(&mime, &filename);
            if args.json {
                print_json(&check, args.pretty)?;
            } else if check.safe {
                println!("{} {}", style("PASS").green().bold(), filename);
            } else {
                println!(
                    "{} {}: {}",
                    style("BLOCK").red().bold(),
                    filename,
                    check.reason.as_deref().unwrap_or_default()
                );
            }
            Ok(if check.safe { 0 } else { EXIT_REJECTED })
        }
    }
}

/// Expand directories into the regular files beneath them.
fn collect_files(paths: &[PathBuf], max_depth: usize, follow_symlinks: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        let walker = WalkDir::new(path).max_depth(max_depth).follow_links(follow_symlinks);
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    log::trace!("Found entry: {:?}", entry.path());
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => log::warn!("Error accessing entry: {}", e),
            }
        }
    }
    files
}

fn scan_files(
    gate: &UploadGate,
    files: Vec<PathBuf>,
    mime: Option<&str>,
    room: Option<&str>,
    show_progress: bool,
) -> Vec<FileOutcome> {
    let progress = if show_progress {
        let bar = ProgressBar::new(files.len() as u64);
        if let Ok(bar_style) =
            ProgressStyle::with_template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(bar_style.progress_chars("=>-"));
        }
        bar.set_prefix(style("SCAN").cyan().bold().to_string());
        bar
    } else {
        ProgressBar::hidden()
    };

    let outcomes: Vec<FileOutcome> = files
        .into_par_iter()
        .map(|path| {
            let request = upload_request(&path, mime, room);
            let decision = gate.decide(&request);
            progress.inc(1);
            FileOutcome { path, decision }
        })
        .collect();

    progress.finish_and_clear();
    outcomes
}

fn upload_request(path: &Path, mime: Option<&str>, room: Option<&str>) -> UploadRequest {
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = mime
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());
    UploadRequest {
        path: path.to_path_buf(),
        original_name,
        mime_type,
        room: room.map(str::to_string),
    }
}

fn print_outcome(outcome: &FileOutcome) {
    let decision = &outcome.decision;
    if decision.accepted {
        println!("{} {}", style("ACCEPT").green().bold(), outcome.path.display());
        return;
    }
    println!(
        "{} {}: {}",
        style("REJECT").red().bold(),
        outcome.path.display(),
        style(decision.reason.as_deref().unwrap_or_default()).yellow()
    );
    if let Some(details) = &decision.details {
        println!("    {}", style(details).dim());
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> GuardResult<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
