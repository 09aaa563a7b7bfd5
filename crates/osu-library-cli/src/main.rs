//! osu-library - load a beatmap/score library and print diagnostics
//!
//! Usage:
//!   osu-library <osu-folder> [options]
//!
//! Options:
//!   --data-dir <dir>   Where the native database files live (default: cwd)
//!   --player <name>    Player name for the stats summary
//!   --import <file>    Queue an external database file for import
//!   --json             Print the load report as JSON
//!   --no-stable        Skip the external installation's databases
//!   --save             Write the native databases back after loading

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use osu_library_core::{Database, DatabaseConfig};
use tracing_subscriber::EnvFilter;

struct Options {
    osu_folder: PathBuf,
    data_dir: PathBuf,
    player_name: String,
    imports: Vec<PathBuf>,
    json: bool,
    database_enabled: bool,
    save: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options {
        osu_folder: PathBuf::new(),
        data_dir: PathBuf::from("."),
        player_name: "Guest".to_string(),
        imports: Vec::new(),
        json: false,
        database_enabled: true,
        save: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--data-dir" => {
                options.data_dir = iter
                    .next()
                    .context("--data-dir needs a value")?
                    .into();
            }
            "--player" => {
                options.player_name = iter.next().context("--player needs a value")?.clone();
            }
            "--import" => {
                options
                    .imports
                    .push(iter.next().context("--import needs a value")?.into());
            }
            "--json" => options.json = true,
            "--no-stable" => options.database_enabled = false,
            "--save" => options.save = true,
            other if !other.starts_with("--") && options.osu_folder.as_os_str().is_empty() => {
                options.osu_folder = other.into();
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    if options.osu_folder.as_os_str().is_empty() {
        // Fall back to the usual install location if there is one.
        options.osu_folder = dirs::data_local_dir()
            .map(|d| d.join("osu!"))
            .unwrap_or_default();
    }
    Ok(options)
}

fn print_help() {
    println!("osu-library - load a beatmap/score library and print diagnostics");
    println!();
    println!("Usage: osu-library <osu-folder> [--data-dir <dir>] [--player <name>]");
    println!("                   [--import <file>] [--json] [--no-stable] [--save]");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let options = parse_args(&args)?;

    let config = DatabaseConfig {
        osu_folder: options.osu_folder.clone(),
        data_dir: options.data_dir.clone(),
        database_enabled: options.database_enabled,
        player_name: options.player_name.clone(),
        ..Default::default()
    };

    let db = Arc::new(Database::new(config));
    for path in options.imports {
        db.queue_import(path);
    }

    let started = Instant::now();
    db.load();
    // Stand in for the host frame loop: drive raw-scan slices and poll.
    while !db.is_finished() || db.raw_scan_pending() {
        db.update();
        std::thread::sleep(Duration::from_millis(10));
    }

    let report = db.load_report();
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Loaded {} beatmaps in {} sets, {} scores across {} beatmaps ({:.2}s)",
            db.beatmaps().difficulty_count(),
            db.beatmaps().set_count(),
            db.scores().score_count(),
            db.scores().beatmap_count(),
            started.elapsed().as_secs_f64(),
        );
        println!(
            "  native scores: {}  legacy: {}  stable: {}  skipped: {}",
            report.native_scores, report.legacy_scores, report.stable_scores, report.scores_skipped,
        );
        println!(
            "  native maps: {}  stable maps: {}  skipped: {}  overrides: {}",
            report.native_maps, report.stable_maps, report.maps_skipped, report.overrides,
        );
        println!("  collections: {}", report.collections);
        if db.raw_found_changes() {
            println!("  raw scan: {} new set(s)", db.raw_new_set_count());
        }
        for notice in &report.notices {
            println!("  notice: {}", notice);
        }

        let stats = db.calculate_player_stats(&options.player_name);
        if stats.num_scores_with_pp > 0 {
            println!(
                "Player {}: {:.0}pp, {:.2}% acc, level {} ({} ranked scores)",
                stats.name,
                stats.pp,
                stats.accuracy * 100.0,
                stats.level,
                stats.num_scores_with_pp,
            );
        }
    }

    if options.save {
        db.save()?;
        tracing::info!("Native databases written to {}", options.data_dir.display());
    }

    Ok(())
}
