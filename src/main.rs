use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use photosync_engine::config::{PlatformDirs, StorageConfig, StorageOverrides};
use photosync_engine::core::fingerprint::fingerprint_files;
use photosync_engine::core::reconcile::{Catalog, Reconciler};
use photosync_engine::core::similarity::{SimilarityComparator, DEFAULT_THRESHOLD};
use photosync_engine::database::{self, repositories::FileRepository};
use photosync_engine::services::cleanup::{CleanupReport, GroupOutcome};
use photosync_engine::services::integrity::StoreIntegrityReport;
use photosync_engine::services::similar::{scan_store, SimilarityScan};
use photosync_engine::services::{DuplicateCleanup, IntegrityService};
use photosync_engine::EngineError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "photosync", version, about = "Maintenance tools for the PhotoSync backup server")]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Base data directory (uploads and database live underneath)
    #[arg(long, global = true, env = "PHOTOSYNC_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Upload directory containing one folder per device
    #[arg(long, global = true, env = "UPLOAD_DIR", value_name = "DIR")]
    upload_dir: Option<PathBuf>,

    /// Path to the backup database
    #[arg(long, global = true, env = "DB_PATH", value_name = "FILE")]
    db_path: Option<PathBuf>,
}

impl StorageArgs {
    fn resolve(&self) -> Result<StorageConfig> {
        let overrides = StorageOverrides {
            data_dir: self.data_dir.clone(),
            upload_dir: self.upload_dir.clone(),
            db_path: self.db_path.clone(),
        };
        let config = StorageConfig::resolve(&overrides, &PlatformDirs::detect())
            .context("Failed to resolve storage locations")?;
        tracing::debug!(?config, "resolved storage configuration");
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare database records with the files on disk
    Integrity {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove duplicate records, keeping the newest per device and filename
    Cleanup {
        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute perceptual fingerprints of image files
    Fingerprint {
        /// Image files to fingerprint
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Compare two hex fingerprints
    Compare {
        a: String,
        b: String,
        /// Maximum distance still treated as the same photo
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u32,
    },

    /// Plan uploads and downloads between two catalog listings (JSON)
    Reconcile {
        /// Device inventory
        #[arg(long, value_name = "FILE")]
        local: PathBuf,
        /// Server listing
        #[arg(long, value_name = "FILE")]
        remote: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored records whose fingerprints look like the same photo
    Similar {
        /// Limit to one device
        #[arg(long)]
        owner: Option<String>,
        /// Maximum distance still treated as the same photo
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u32,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<EngineError>() {
                Some(EngineError::StorageUnavailable { what, path }) => {
                    println!("❌ {} does not exist: {}", what, path.display());
                }
                _ => eprintln!("❌ {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Integrity { json } => {
            let config = cli.storage.resolve()?;
            if !json {
                println!("\n🔍 ===== PHOTOSYNC INTEGRITY CHECK =====\n");
                print_paths(&config);
            }
            let report = IntegrityService::new(&config).run()?;
            if json {
                print_json(&report)?;
            } else {
                print_integrity(&report);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Cleanup { dry_run, yes, json } => {
            let config = cli.storage.resolve()?;
            if !json {
                println!("🔍 Checking for duplicate filenames in database...\n");
                print_paths(&config);
            }
            let mut cleanup = DuplicateCleanup::open(&config)?;

            let planned = cleanup.plan()?;
            if planned.is_empty() {
                if json {
                    print_json(&cleanup.run(true)?)?;
                } else {
                    println!("✅ No duplicate filenames found!");
                }
                return Ok(ExitCode::SUCCESS);
            }

            if !json {
                println!("⚠️  Found {} duplicate filename(s):\n", planned.len());
                for group in &planned {
                    println!(
                        "  - \"{}\" (user_id: {}): {} entries",
                        group.filename,
                        group.owner,
                        group.record_count()
                    );
                }
            }

            let proceed = dry_run
                || yes
                || Confirm::new()
                    .with_prompt(format!("Remove {} duplicate group(s)?", planned.len()))
                    .default(false)
                    .interact()
                    .context("Confirmation failed; pass --yes to run non-interactively")?;
            if !proceed {
                println!("Aborted; nothing was changed.");
                return Ok(ExitCode::SUCCESS);
            }

            let report = cleanup.run(dry_run)?;
            if json {
                print_json(&report)?;
            } else {
                print_cleanup(&report);
            }

            if !report.dry_run && !report.is_clean() {
                return Ok(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Fingerprint { files } => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            spinner.set_message(format!("Fingerprinting {} file(s)…", files.len()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let results = benchmark("fingerprinting", || fingerprint_files(&files));
            spinner.finish_and_clear();

            let mut failed = 0;
            for (path, result) in results {
                match result {
                    Ok(fp) => println!("{}  {}", fp, path.display()),
                    Err(err) => {
                        failed += 1;
                        eprintln!("⚠️  {}: {}", path.display(), err);
                    }
                }
            }
            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Compare { a, b, threshold } => {
            let comparator = SimilarityComparator::new(threshold)?;
            let result = comparator.compare_hex(&a, &b)?;
            println!("Hamming distance: {} bits", result.distance);
            println!("Classification:   {:?}", result.class);
            println!(
                "Within threshold ({} bits): {}",
                comparator.threshold(),
                if result.is_match() { "YES ✓" } else { "NO ✗" }
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Reconcile {
            local,
            remote,
            json,
        } => {
            let local = read_catalog(&local)?;
            let remote = read_catalog(&remote)?;
            let plan = Reconciler::default().reconcile(&local, &remote);

            if json {
                print_json(&plan)?;
                return Ok(ExitCode::SUCCESS);
            }

            println!("✅ Already synchronized: {}", plan.synchronized);
            println!("⬆️  To upload ({}):", plan.to_upload.len());
            for entry in &plan.to_upload {
                println!("   {}  {}", entry.created_at.to_rfc3339(), entry.filename);
            }
            println!("⬇️  To download ({}):", plan.to_download.len());
            for entry in &plan.to_download {
                println!("   {}", entry.filename);
            }
            if !plan.suspect_conflicts.is_empty() {
                println!(
                    "\n⚠️  {} filename(s) exist on both sides with different content:",
                    plan.suspect_conflicts.len()
                );
                for name in &plan.suspect_conflicts {
                    println!("   - {}", name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Similar {
            owner,
            threshold,
            json,
        } => {
            let config = cli.storage.resolve()?;
            let comparator = SimilarityComparator::new(threshold)?;
            let repo = FileRepository::new(database::open_read_only(&config.db_path)?);
            let scan = benchmark("similarity scan", || {
                scan_store(&repo, owner.as_deref(), &comparator)
            })?;
            if json {
                print_json(&scan)?;
            } else {
                print_similar(&scan);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_paths(config: &StorageConfig) {
    println!("📁 Upload directory: {}", config.upload_dir.display());
    println!("💾 Database: {}", config.db_path.display());
    println!("🏠 Base directory: {} ({:?})", config.base_dir.display(), config.source);
    println!("🖥️  Platform: {}", std::env::consts::OS);
    println!();
}

fn print_integrity(report: &StoreIntegrityReport) {
    println!("✅ Paths exist\n");
    println!("💾 Database entries: {}", report.db_total);
    println!("👥 Owner scopes: {}\n", report.scopes.len());

    for scope in &report.scopes {
        println!(
            "  📂 {}: {} files, {} records",
            scope.owner, scope.disk_count, scope.db_count
        );
        for violation in scope.violations() {
            println!("     ⚠️  {}", violation);
        }
    }

    println!("\n📊 Total files on disk: {}", report.disk_total);
    println!("\n🔍 Integrity Check:");
    if report.is_consistent() {
        println!("✅ Database and filesystem match!");
    } else {
        if report.db_total != report.disk_total {
            println!(
                "⚠️  Mismatch: DB has {} entries, filesystem has {} files",
                report.db_total, report.disk_total
            );
            println!("   Difference: {}", report.db_total.abs_diff(report.disk_total));
        }
        println!(
            "⚠️  {} issue(s) found; nothing was changed",
            report.violation_count()
        );
    }

    println!("\n✅ ===== INTEGRITY CHECK COMPLETE =====\n");
}

fn print_cleanup(report: &CleanupReport) {
    if report.dry_run {
        println!("\n🧹 Planned cleanup (dry-run):\n");
    } else {
        println!("\n🧹 Cleaning up duplicates...\n");
    }

    for result in &report.groups {
        let group = &result.group;
        println!("  📄 {} ({}):", group.filename, group.owner);
        println!(
            "     ✓ Keeping: ID {} (hash: {})",
            group.keep.id,
            short_hash(group.keep.file_hash.as_deref())
        );
        for record in &group.remove {
            let hash = short_hash(record.file_hash.as_deref());
            match &result.outcome {
                GroupOutcome::Planned => {
                    println!("     📦 [dry-run] DELETE ID {} (hash: {})", record.id, hash)
                }
                GroupOutcome::Resolved { .. } => {
                    println!("     ✗ Deleted: ID {} (hash: {})", record.id, hash)
                }
                GroupOutcome::Conflict { .. } => {
                    println!("     ⏸  Kept for retry: ID {} (hash: {})", record.id, hash)
                }
            }
        }
        if let GroupOutcome::Conflict { reason } = &result.outcome {
            println!("     ⚠️  Group left untouched: {}", reason);
        }
    }

    if report.dry_run {
        println!("\n⚠️  Dry-run only; no records were changed.");
        return;
    }

    println!(
        "\n✅ Cleanup complete! Removed {} duplicate entries.",
        report.removed
    );
    if report.is_clean() {
        println!("✅ No duplicates remaining!");
    } else {
        println!(
            "⚠️  Warning: {} duplicate group(s) still remain",
            report.remaining.len()
        );
        for dup in &report.remaining {
            println!(
                "   - \"{}\" (user_id: {}): {} entries",
                dup.filename, dup.owner, dup.count
            );
        }
    }
}

fn print_similar(scan: &SimilarityScan) {
    println!(
        "🔍 Compared {} fingerprint(s), skipped {} record(s) without one",
        scan.compared, scan.skipped
    );
    if scan.pairs.is_empty() {
        println!("No similar photos found.");
        return;
    }
    println!("Found {} similar pair(s):", scan.pairs.len());
    for pair in &scan.pairs {
        println!(
            "   {:>2} bits  {}/{}  ↔  {}/{}",
            pair.comparison.distance,
            pair.first.owner,
            pair.first.filename,
            pair.second.owner,
            pair.second.filename
        );
    }
}

fn short_hash(hash: Option<&str>) -> String {
    match hash {
        Some(h) => format!("{}...", h.chars().take(8).collect::<String>()),
        None => "none".to_string(),
    }
}

fn read_catalog(path: &Path) -> Result<Catalog> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse catalog {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    tracing::info!("{} took {:.2?}", label, start.elapsed());
    result
}
