use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use elemsync::catalog::{Catalog, RecordFilter, Resolution};
use elemsync::config::Config;
use elemsync::filemeta::EmbeddedStore;
use elemsync::logging;
use elemsync::reconcile::{AssumeYes, AuditLog, Confirm, Reconciler, RunOutcome, RunSummary, TerminalPrompt};
use elemsync::thumbnails::ThumbnailCache;

const DEFAULT_THUMBNAIL_SIZE: (u32, u32) = (160, 120);

enum Command {
    Check,
    Update,
    TagPath(i64),
    TagFind(String),
    TagEnsure(String),
    Locate(PathBuf),
    Inspect(String),
    Thumbnail { media_id: i64, output: PathBuf },
}

struct Cli {
    command: Command,
    config_path: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
    filter: RecordFilter,
    yes: bool,
    size: (u32, u32),
}

fn main() -> Result<()> {
    let cli = parse_args();

    let _ = logging::init(None, logging::Console::Warnings);

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let catalog_path = cli.catalog_path.clone().unwrap_or_else(|| config.catalog_path.clone());

    match cli.command {
        Command::Check => run_reconcile(&config, &catalog_path, false, cli.filter, cli.yes),
        Command::Update => run_reconcile(&config, &catalog_path, true, cli.filter, cli.yes),
        Command::TagPath(tag_id) => {
            let catalog = Catalog::open(&catalog_path)?;
            let path = catalog.lookup_ancestry(tag_id)?;
            if path.is_empty() {
                eprintln!("No tag with id {}", tag_id);
                std::process::exit(1);
            }
            println!("{}", path.join(config.reconcile.keyword_delimiter.as_str()));
            Ok(())
        }
        Command::TagFind(path) => {
            let catalog = Catalog::open(&catalog_path)?;
            let segments = split_tag_path(&path, &config.reconcile.keyword_delimiter);
            match catalog.resolve_strict(segments.as_slice())? {
                Some(tag_id) => {
                    println!("{}", tag_id);
                    Ok(())
                }
                None => {
                    eprintln!("Tag path not found: {}", path);
                    std::process::exit(1);
                }
            }
        }
        Command::TagEnsure(path) => {
            let catalog = Catalog::open(&catalog_path)?;
            let segments = split_tag_path(&path, &config.reconcile.keyword_delimiter);
            match catalog.resolve_or_create(segments.as_slice())? {
                Resolution::Resolved { tag_id, created } => {
                    println!("{} ({} created)", tag_id, created);
                    Ok(())
                }
                Resolution::Incomplete { created, missing_at } => {
                    eprintln!(
                        "Refusing to create top-level tag '{}' ({} created)",
                        segments.get(missing_at).map(String::as_str).unwrap_or(""),
                        created
                    );
                    std::process::exit(1);
                }
            }
        }
        Command::Locate(path) => {
            let catalog = Catalog::open(&catalog_path)?;
            locate(&catalog, &path)
        }
        Command::Inspect(target) => {
            let catalog = Catalog::open(&catalog_path)?;
            inspect(&catalog, &config, &target)
        }
        Command::Thumbnail { media_id, output } => {
            let cache = ThumbnailCache::open(&config.thumbnail_cache_path())?;
            let (width, height) = cli.size;
            let Some(image) = cache.load_image(media_id, width, height)? else {
                eprintln!("No {}x{} thumbnail for media {}", width, height, media_id);
                std::process::exit(1);
            };
            image
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {}", output.display());
            Ok(())
        }
    }
}

fn run_reconcile(config: &Config, catalog_path: &Path, update: bool, filter: RecordFilter, yes: bool) -> Result<()> {
    let catalog = Catalog::open(catalog_path)?;
    let store = EmbeddedStore;
    let reconciler = Reconciler::new(&catalog, &store, config.reconcile_options(update, filter));
    let mut audit = AuditLog::open_append(&config.audit_log_path)?;

    let mut confirm: Box<dyn Confirm> = if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalPrompt::stdio())
    };

    let mut print_progress = |summary: &RunSummary| {
        eprintln!(
            "Processed {} - {} matched, {} unreadable, {} mismatched",
            summary.processed, summary.matched, summary.unreadable, summary.mismatched
        );
    };

    match reconciler.run(confirm.as_mut(), &mut audit, &mut print_progress)? {
        RunOutcome::Cancelled => println!("Cancelled."),
        RunOutcome::Completed(summary) => {
            println!(
                "Total count: {}\nTotal matches: {}\nUnreadable files: {}\nMismatches: {}",
                summary.processed, summary.matched, summary.unreadable, summary.mismatched
            );
            if update {
                println!("Updated: {}\nWrite failures: {}", summary.updated, summary.write_failures);
            }
            info!("Audit log at {:?}", config.audit_log_path);
        }
    }
    Ok(())
}

fn locate(catalog: &Catalog, path: &Path) -> Result<()> {
    if path.is_dir() {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                print_location(catalog, entry.path())?;
            }
        }
        Ok(())
    } else {
        print_location(catalog, path)
    }
}

fn print_location(catalog: &Catalog, path: &Path) -> Result<()> {
    let shown = path.display().to_string();
    match catalog.locate_record_by_path(&shown)? {
        Some(id) => println!("{}\t{}", id, shown),
        None => println!("-\t{}", shown),
    }
    Ok(())
}

/// Print what a check would conclude for one record, as JSON.
fn inspect(catalog: &Catalog, config: &Config, target: &str) -> Result<()> {
    let record_id = match target.parse::<i64>() {
        Ok(id) => id,
        Err(_) => match catalog.locate_record_by_path(target)? {
            Some(id) => id,
            None => bail!("No catalog record for {}", target),
        },
    };
    let Some(record) = catalog.record(record_id)? else {
        bail!("No catalog record with id {}", record_id);
    };

    let store = EmbeddedStore;
    let reconciler = Reconciler::new(catalog, &store, config.reconcile_options(false, RecordFilter::default()));
    let check = reconciler.check_record(&record)?;
    println!("{}", serde_json::to_string_pretty(&check)?);
    Ok(())
}

fn split_tag_path(path: &str, delimiter: &str) -> Vec<String> {
    path.split(delimiter)
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut catalog_path = None;
    let mut filter = RecordFilter::default();
    let mut yes = false;
    let mut size = DEFAULT_THUMBNAIL_SIZE;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("elemsync {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(option_value(&args, i)));
                i += 1;
            }
            "--catalog" => {
                catalog_path = Some(PathBuf::from(option_value(&args, i)));
                i += 1;
            }
            "--since" => {
                let value = option_value(&args, i);
                match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                    Ok(date) => filter.taken_after = Some(date),
                    Err(_) => usage_error(&format!("--since expects YYYY-MM-DD, got '{}'", value)),
                }
                i += 1;
            }
            "--start" => {
                filter.start = parse_number(&args, i);
                i += 1;
            }
            "--limit" => {
                filter.limit = Some(parse_number(&args, i));
                i += 1;
            }
            "--size" => {
                let value = option_value(&args, i);
                size = match value.split_once('x').map(|(w, h)| (w.parse(), h.parse())) {
                    Some((Ok(w), Ok(h))) => (w, h),
                    _ => usage_error(&format!("--size expects WIDTHxHEIGHT, got '{}'", value)),
                };
                i += 1;
            }
            "--yes" | "-y" => yes = true,
            arg if arg.starts_with('-') => usage_error(&format!("Unknown argument: {}", arg)),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("check") => Command::Check,
        Some("update") => Command::Update,
        Some("tag-path") => match positional.get(1).map(|id| id.parse::<i64>()) {
            Some(Ok(id)) => Command::TagPath(id),
            _ => usage_error("tag-path requires a numeric tag id"),
        },
        Some("tag-find") => Command::TagFind(required(&positional, "tag-find", "a tag path")),
        Some("tag-ensure") => Command::TagEnsure(required(&positional, "tag-ensure", "a tag path")),
        Some("locate") => Command::Locate(PathBuf::from(required(&positional, "locate", "a path"))),
        Some("inspect") => Command::Inspect(required(&positional, "inspect", "a media id or path")),
        Some("thumbnail") => {
            let media_id = match positional.get(1).map(|id| id.parse::<i64>()) {
                Some(Ok(id)) => id,
                _ => usage_error("thumbnail requires a numeric media id"),
            };
            let output = match positional.get(2) {
                Some(output) => PathBuf::from(output),
                None => usage_error("thumbnail requires an output file"),
            };
            Command::Thumbnail { media_id, output }
        }
        Some(other) => usage_error(&format!("Unknown command: {}", other)),
        None => usage_error("No command given"),
    };

    Cli {
        command,
        config_path,
        catalog_path,
        filter,
        yes,
        size,
    }
}

fn option_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => usage_error(&format!("{} requires a value", args[i])),
    }
}

fn parse_number(args: &[String], i: usize) -> usize {
    let value = option_value(args, i);
    match value.parse() {
        Ok(n) => n,
        Err(_) => usage_error(&format!("{} expects a number, got '{}'", args[i], value)),
    }
}

fn required(positional: &[String], command: &str, what: &str) -> String {
    match positional.get(1) {
        Some(value) => value.clone(),
        None => usage_error(&format!("{} requires {}", command, what)),
    }
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"elemsync - reconcile a Photoshop Elements catalog with embedded photo metadata

USAGE:
    elemsync [OPTIONS] <COMMAND>

COMMANDS:
    check                   Compare every catalog record with its file and log mismatches
    update                  As check, but rewrite mismatching files to match the catalog
    tag-path ID             Print the full path of a tag
    tag-find PATH           Print the id of a tag path such as "People|Family|Smith"
    tag-ensure PATH         Find a tag path, creating missing tags below a category
    locate PATH             Print the catalog record id for a file, or each file in a directory
    inspect ID|PATH         Show catalog and file metadata for one record as JSON
    thumbnail ID OUTPUT     Save a cached thumbnail of a media record

OPTIONS:
    --config, -c PATH       Path to config file
    --catalog PATH          Catalog database (overrides config)
    --since YYYY-MM-DD      Only records taken after this date
    --start N               Skip the first N records
    --limit N               Process at most N records
    --size WxH              Thumbnail size (default: 160x120)
    --yes, -y               Do not ask before updating files
    --version, -V           Show version
    --help, -h              Show this help message

ENVIRONMENT:
    ELEMSYNC_CONFIG         Path to config file (overrides default location)
    ELEMSYNC_LOG            Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/elemsync/config.toml"#
    );
}
