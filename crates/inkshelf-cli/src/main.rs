mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use inkshelf_core::folders::{self, FolderNode};
use inkshelf_core::{AppConfig, AutoLinkOptions, AutoLinkOutcome, ScanEngine};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match inkshelf_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Scan {
            library,
            apply,
            yes,
        }) => run_scan(&config, &library, apply, yes),
        Some(Commands::Stats) => run_stats(&config),
        Some(Commands::Folders {
            library,
            path,
            depth,
        }) => run_folders(&config, &library, path.as_deref(), depth),
        Some(Commands::Recalculate { library }) => run_recalculate(&config, &library),
        Some(Commands::Prune { library }) => run_prune(&config, &library),
        Some(Commands::RenameFolder {
            library,
            path,
            new_name,
        }) => run_rename_folder(&config, &library, &path, &new_name),
        Some(Commands::Link { file_id, relink }) => run_link(&config, file_id, relink),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Some(Commands::TruncateDb) => run_truncate(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_engine(config: &AppConfig) -> Result<ScanEngine> {
    let engine = ScanEngine::open(config.clone())
        .with_context(|| format!("failed to open catalog at {}", config.database_path))?;
    engine
        .sync_libraries()
        .context("failed to register configured libraries")?;
    Ok(engine)
}

fn library_id(engine: &ScanEngine, name: &str) -> Result<i64> {
    let library = engine
        .library_by_name(name)
        .with_context(|| format!("library '{}' is not configured", name))?;
    Ok(library.id)
}

fn run_scan(config: &AppConfig, library: &str, apply: bool, yes: bool) -> Result<()> {
    let engine = open_engine(config)?.with_reporter(Arc::new(CliReporter::new()));
    let library_id = library_id(&engine, library)?;

    let result = engine
        .scan_library(library_id)
        .with_context(|| format!("scan of '{}' failed", library))?;

    println!();
    info!(
        "{} new, {} moved, {} missing, {} unchanged in {}",
        format!("{}", result.new_files.len()).green(),
        format!("{}", result.moved.len()).cyan(),
        format!("{}", result.orphaned.len()).red(),
        result.unchanged.len(),
        format!("{:.2}s", result.duration.as_secs_f64()).green(),
    );
    for moved in &result.moved {
        println!("  {} {} -> {}", "moved".cyan(), moved.old_relative_path, moved.new_relative_path);
    }
    for orphan in &result.orphaned {
        println!("  {} {}", "remove".red(), orphan.relative_path);
    }
    for err in &result.errors {
        warn!("{}: {}", err.path, err.message);
    }

    if !apply {
        if result.has_changes() {
            println!("Run again with {} to write these changes.", "--apply".bold());
        }
        return Ok(());
    }
    if !result.has_changes() {
        println!("Nothing to apply.");
        return Ok(());
    }

    if !result.orphaned.is_empty() && !yes {
        let prompt = format!(
            "{} cataloged files are missing from disk and will be removed. Continue?",
            result.orphaned.len()
        );
        if !prompt_confirm(&prompt, Some(false))? {
            println!("Aborted; the catalog was not changed.");
            return Ok(());
        }
    }

    let applied = engine
        .apply_scan_results(&result)
        .context("failed to apply scan results")?;
    let outcome = &applied.outcome;
    info!(
        "{} added, {} moved, {} removed, {} re-added, {} series archived",
        format!("{}", outcome.added).green(),
        format!("{}", outcome.moved).cyan(),
        format!("{}", outcome.total_removed()).red(),
        outcome.readded,
        outcome.series_archived,
    );
    for err in &outcome.errors {
        warn!("{}: {}", err.path, err.message);
    }

    match applied.linking.join() {
        Some(summary) => info!(
            "{} indexed, {} linked, {} series created, {} need confirmation, {} failed",
            summary.indexed,
            format!("{}", summary.linked).green(),
            format!("{}", summary.created).green(),
            format!("{}", summary.needs_confirmation).yellow(),
            format!("{}", summary.failed).red(),
        ),
        None => warn!("Series linking stopped unexpectedly"),
    }

    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let engine = open_engine(config)?;
    let stats = engine
        .all_library_stats()
        .context("failed to read library stats")?;

    for s in stats {
        println!("{}", s.name.bold());
        println!(
            "  {} files ({} bytes) in {} folders, {} series",
            s.total_files, s.total_bytes, s.folders, s.series
        );
        println!(
            "  pending {}  indexed {}  orphaned {}  quarantined {}",
            s.pending,
            format!("{}", s.indexed).green(),
            format!("{}", s.orphaned).yellow(),
            format!("{}", s.quarantined).red(),
        );
    }
    Ok(())
}

fn run_folders(config: &AppConfig, library: &str, path: Option<&str>, depth: i64) -> Result<()> {
    let engine = open_engine(config)?;
    let library_id = library_id(&engine, library)?;
    engine
        .prepare_library(library_id)
        .context("failed to build the folder tree")?;

    let trees = engine
        .with_db(|db| {
            let starts = match path {
                Some(path) => vec![folders::folder_at_path(db, library_id, path)?],
                None => folders::root_folders(db, library_id)?,
            };
            starts
                .into_iter()
                .map(|folder| folders::folder_subtree(db, folder.id, depth))
                .collect::<Result<Vec<_>, _>>()
        })
        .context("failed to load folders")?;

    if trees.is_empty() {
        println!("No folders in '{}'.", library);
    }
    for tree in &trees {
        print_tree(tree, 0);
    }
    Ok(())
}

fn print_tree(node: &FolderNode, indent: usize) {
    println!(
        "{}{} {}",
        "  ".repeat(indent),
        node.folder.name.bold(),
        format!("({} / {})", node.folder.file_count, node.folder.total_files).dimmed(),
    );
    for child in &node.children {
        print_tree(child, indent + 1);
    }
}

fn run_recalculate(config: &AppConfig, library: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let library_id = library_id(&engine, library)?;
    let updated = engine
        .with_db(|db| folders::recalculate_library_counts(db, library_id))
        .context("failed to recalculate folder counts")?;
    info!("{} folders recalculated", format!("{}", updated).green());
    Ok(())
}

fn run_prune(config: &AppConfig, library: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let library_id = library_id(&engine, library)?;
    let removed = engine
        .with_db(|db| folders::prune_empty_folders(db, library_id))
        .context("failed to prune empty folders")?;
    info!("{} empty folders removed", format!("{}", removed).red());
    Ok(())
}

fn run_rename_folder(config: &AppConfig, library: &str, path: &str, new_name: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let library_id = library_id(&engine, library)?;
    let renamed = engine
        .with_db(|db| {
            let folder = folders::folder_at_path(db, library_id, path)?;
            folders::rename_folder(db, folder.id, new_name)
        })
        .with_context(|| format!("failed to rename '{}'", path))?;
    info!("Renamed {} -> {}", path, renamed.path.green());
    Ok(())
}

fn run_link(config: &AppConfig, file_id: i64, relink: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let options = AutoLinkOptions {
        relink,
        ..AutoLinkOptions::from(config.linking.clone())
    };
    let outcome = engine
        .auto_link_file(file_id, Some(options))
        .with_context(|| format!("failed to link file {}", file_id))?;

    match outcome {
        AutoLinkOutcome::Linked {
            series_id,
            match_type,
            confidence,
        } => println!(
            "{} to series {} ({:?}, {:.2})",
            "Linked".green(),
            series_id,
            match_type,
            confidence
        ),
        AutoLinkOutcome::Created { series_id } => {
            println!("{} series {}", "Created".green(), series_id)
        }
        AutoLinkOutcome::AlreadyLinked { series_id } => println!(
            "Already linked to series {}; pass --relink to match again",
            series_id
        ),
        AutoLinkOutcome::NeedsConfirmation {
            candidate,
            suggestions,
        } => {
            println!("{} for '{}':", "Needs confirmation".yellow(), candidate.name);
            for s in suggestions {
                println!(
                    "  [{}] {} {} {:?} {:.2}",
                    s.series_id,
                    s.name,
                    s.start_year.map(|y| y.to_string()).unwrap_or_default(),
                    s.match_type,
                    s.confidence
                );
            }
        }
        AutoLinkOutcome::NoMatch { candidate } => {
            println!("No series matches '{}'", candidate.name)
        }
        AutoLinkOutcome::NoSeriesName => println!("No series name could be derived"),
    }
    Ok(())
}

fn run_truncate(config: &AppConfig) -> Result<()> {
    if !prompt_confirm(
        "Are you SURE you want to COMPLETELY DELETE the Database?",
        Some(false),
    )? {
        return Ok(());
    }
    let db = inkshelf_core::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path))?;
    db.truncate_all().context("failed to truncate tables")?;
    println!("All tables truncated");
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
