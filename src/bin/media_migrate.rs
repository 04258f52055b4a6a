//! One-shot media reconciliation tool.
//!
//! Usage:
//!   cargo run --bin media-migrate -- mirror
//!   cargo run --bin media-migrate -- migrate [--batch-size <n>]
//!   cargo run --bin media-migrate -- verify
//!   cargo run --bin media-migrate -- rewrite [--dry-run] [--batch-size <n>]
//!   cargo run --bin media-migrate -- all

use std::env;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use community_media_lib::config::Config;
use community_media_lib::db::DbPool;
use community_media_lib::services::migration::{JobMode, JobOptions, JobReport, run_migration};
use community_media_lib::services::mirror::mirror_categories;
use community_media_lib::services::rewriter::{
    CONTENT_COLUMNS, RewriteOptions, RewriteReport, rewrite_all,
};
use community_media_lib::services::{CategoryRegistry, Normalizer, Storage};

struct CliOptions {
    batch_size: Option<usize>,
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: tracing subscriber already installed");
    }

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }
    if !matches!(command, "mirror" | "migrate" | "verify" | "rewrite" | "all") {
        eprintln!("Unknown command: {}", command);
        print_usage();
        std::process::exit(1);
    }

    let options = parse_options(&args[2..]);

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    let batch_size = options.batch_size.unwrap_or(config.media.batch_size);
    let registry = CategoryRegistry::builtin();

    // A category or column that could not be processed at all
    let mut failed = false;

    if matches!(command, "mirror" | "all") {
        failed |= !run_mirror(&config, &registry).await;
    }

    if command == "mirror" {
        exit_on_failure(failed);
        return;
    }

    let pool = match DbPool::new(&config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pool.run_migrations().await {
        eprintln!("Error running database migrations: {}", e);
        std::process::exit(1);
    }

    if matches!(command, "migrate" | "verify" | "all") {
        let storage = match Storage::new(&config.storage).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error initializing storage: {}", e);
                std::process::exit(1);
            }
        };
        let mode = if command == "verify" {
            JobMode::VerifyOnly
        } else {
            JobMode::Migrate
        };
        let job_options = JobOptions { batch_size, mode };

        match run_migration(
            &pool,
            &storage,
            &config.media.production_root,
            &registry,
            job_options,
        )
        .await
        {
            Ok(report) => print_job_report(&report),
            Err(e) => {
                eprintln!("Error running migration job: {}", e);
                std::process::exit(1);
            }
        }
    }

    if matches!(command, "rewrite" | "all") {
        let normalizer = Normalizer::new(registry, config.media.storage_hosts.clone());
        let rewrite_options = RewriteOptions {
            batch_size,
            dry_run: options.dry_run,
        };
        let reports = rewrite_all(&pool, &normalizer, CONTENT_COLUMNS, rewrite_options).await;
        print_rewrite_reports(&reports, options.dry_run);
        failed |= reports.iter().any(|r| r.scan_error.is_some());
    }

    exit_on_failure(failed);
}

fn exit_on_failure(failed: bool) {
    if failed {
        eprintln!("Error: some categories or columns could not be processed, see output above");
        std::process::exit(1);
    }
}

fn parse_options(args: &[String]) -> CliOptions {
    let mut options = CliOptions {
        batch_size: None,
        dry_run: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dry-run" | "-n" => options.dry_run = true,
            "--batch-size" | "-b" if i + 1 < args.len() => {
                match args[i + 1].parse::<usize>() {
                    Ok(n) if n > 0 => options.batch_size = Some(n),
                    _ => {
                        eprintln!("Error: --batch-size must be a positive integer");
                        std::process::exit(1);
                    }
                }
                i += 1;
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    options
}

/// Mirror every category. Returns false when a category could not be mirrored.
async fn run_mirror(config: &Config, registry: &CategoryRegistry) -> bool {
    let reports = mirror_categories(
        &config.media.legacy_root,
        &config.media.production_root,
        registry,
    )
    .await;

    println!();
    println!(
        "{:<16} {:>8} {:>8} {:>10} {:>8}",
        "CATEGORY", "L->P", "P->L", "CONFLICTS", "FAILED"
    );
    println!("{}", "-".repeat(54));
    for entry in &reports {
        match (&entry.report, &entry.error) {
            (Some(r), _) => {
                println!(
                    "{:<16} {:>8} {:>8} {:>10} {:>8}",
                    entry.category,
                    r.copied_a_to_b,
                    r.copied_b_to_a,
                    r.conflicts.len(),
                    r.failed
                );
                for conflict in &r.conflicts {
                    println!("  conflict: {}/{}", entry.category, conflict);
                }
            }
            (None, Some(e)) => println!("{:<16} error: {}", entry.category, e),
            (None, None) => println!("{:<16} skipped", entry.category),
        }
    }
    println!();

    reports.iter().all(|entry| entry.error.is_none())
}

fn print_job_report(report: &JobReport) {
    println!();
    println!("Migration job:");
    println!("  discovered     {}", report.discovered);
    println!("  uploaded       {}", report.uploaded);
    println!("  skipped        {}", report.skipped);
    println!("  failed         {}", report.failed);
    println!("  retried        {}", report.retried);
    println!("  collisions     {}", report.collisions);
    println!("  verified       {}", report.verified);
    println!("  verify failed  {}", report.verify_failed);
    println!();
}

fn print_rewrite_reports(reports: &[RewriteReport], dry_run: bool) {
    println!();
    if dry_run {
        println!("Reference rewrite (dry run, nothing written):");
    } else {
        println!("Reference rewrite:");
    }
    println!(
        "{:<36} {:>8} {:>8} {:>8} {:>10}",
        "COLUMN", "SCANNED", "UPDATED", "FAILED", "UNRESOLVED"
    );
    println!("{}", "-".repeat(74));
    for r in reports {
        let name = format!("{}.{}", r.table, r.column);
        if let Some(e) = &r.scan_error {
            println!("{:<36} error: {}", name, e);
            continue;
        }
        println!(
            "{:<36} {:>8} {:>8} {:>8} {:>10}",
            name, r.records_scanned, r.records_updated, r.records_failed, r.unresolved
        );
    }
    println!();
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: media-migrate <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  mirror                Mirror legacy and production media directories");
    eprintln!("  migrate               Upload production media to object storage, then verify");
    eprintln!("  verify                Verify migrated objects without uploading");
    eprintln!("  rewrite               Rewrite stored media references to canonical paths");
    eprintln!("  all                   mirror, migrate and rewrite in order");
    eprintln!("  help                  Show this help");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --batch-size, -b <n>  Items processed together (default CM_MEDIA_BATCH_SIZE)");
    eprintln!("  --dry-run, -n         Count reference changes without writing them");
    eprintln!();
}
