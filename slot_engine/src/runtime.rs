use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use slot_context::{describe_table, LiveTableHost, OwnerNames, SlotContextConfig, TableDump};

use crate::cli::RunArgs;
use crate::engine::Engine;
use crate::report::RunReport;
use crate::scenario::Scenario;

const RING_DEMO_FRAME: u32 = 1;

/// Slot events kept for `--events-json` when the config leaves the trail off.
const EVENT_LOG_TRAIL: usize = 4096;

pub fn execute(args: RunArgs) -> Result<()> {
    let RunArgs {
        scenario,
        config,
        owner_names,
        frames,
        spawn_ring_demo,
        report_json,
        events_json,
        verbose,
    } = args;

    let mut config = SlotContextConfig::from_json_file(config.as_deref())
        .context("loading slot context config")?;
    if events_json.is_some() && config.event_trail == 0 {
        config.event_trail = EVENT_LOG_TRAIL;
    }
    let file_names =
        OwnerNames::from_json_file(owner_names.as_deref()).context("loading owner names")?;

    let mut scenario = match scenario.as_ref() {
        Some(path) => Scenario::from_json_file(path)?,
        None => Scenario::demo(),
    };
    if spawn_ring_demo {
        if scenario.frames <= RING_DEMO_FRAME && frames.is_none() {
            eprintln!(
                "[slot_engine] warning: --spawn-ring-demo fires on frame {RING_DEMO_FRAME}; \
                 the scenario stops before it"
            );
        }
        scenario.add_spawn_ring_demo(RING_DEMO_FRAME);
    }

    // file names take part in resolving scenario labels and win for display
    let mut names = file_names.clone();
    let compiled = scenario
        .compile(&mut names)
        .context("resolving scenario actor references")?;
    names.extend(&file_names);

    let frames = frames.unwrap_or(compiled.frames);
    if frames == 0 {
        bail!("scenario runs zero frames");
    }

    let mut engine = Engine::new(&config, names, compiled);
    engine.run(frames);
    let report = engine.report();

    print_summary(&report);
    if verbose {
        print_tables(&engine, &report);
    }

    if let Some(path) = report_json.as_ref() {
        write_json(path, &report, "run report")?;
    }
    if let Some(path) = events_json.as_ref() {
        write_json(path, &engine.event_log(), "event log")?;
    }

    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(value).with_context(|| format!("serializing {what} to JSON"))?;
    fs::write(path, json).with_context(|| format!("writing {what} to {}", path.display()))?;
    println!("Saved {what} to {}", path.display());
    Ok(())
}

fn print_summary(report: &RunReport) {
    let stats = &report.context.stats;
    println!(
        "Ran {} frames across {} scene(s); {} actors live on {}",
        report.frames,
        report.scenes,
        report.actors.len(),
        report.host
    );
    println!(
        "Slot contexts -> enters: {} | exits: {} | max depth: {}/{}",
        stats.enters, stats.exits, stats.max_depth, report.context.capacity
    );
    println!(
        "Slot lookups -> {} total | {} auto-loaded | {} table full | {} immediate binds",
        stats.lookups, stats.auto_loads, stats.full_table_misses, stats.immediate_binds
    );
    println!(
        "Persistent propagations: {} | pool fetches: {}",
        stats.propagations, report.pool.total_fetches
    );

    let anomalies = [
        ("overflowed entries", stats.overflows),
        ("underflowed exits", stats.underflows),
        ("invalid owners", stats.invalid_owners),
        ("host mismatches", stats.host_mismatches),
        ("mismatched hooks", report.mismatched_hooks),
        ("failed spawns", report.engine.spawn_failures),
        ("draw misses", report.engine.draw_misses),
    ];
    let flagged: Vec<String> = anomalies
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| format!("{label} x{count}"))
        .collect();
    if !flagged.is_empty() {
        println!("!! {}", flagged.join(", "));
    }
    if report.context.depth != 0 {
        println!(
            "!! run ended with {} slot contexts open",
            report.context.depth
        );
    }

    println!("\nActors:");
    let limit = report.actors.len().min(12);
    for actor in report.actors.iter().take(limit) {
        println!(
            "  #{:<3} {:<16} slot {:>2} draws {} <= {}",
            actor.actor.index,
            actor.label,
            actor.actor.object_slot,
            actor.actor.draws,
            actor
                .actor
                .parent
                .map(|parent| format!("#{parent}"))
                .unwrap_or_else(|| "scene".to_string())
        );
    }
    if report.actors.len() > limit {
        println!("  ... +{} more actors", report.actors.len() - limit);
    }
}

fn print_tables(engine: &Engine, report: &RunReport) {
    println!("\nLive {}", describe_table(engine.scene().object_context()));
    if report.context.owners.is_empty() {
        return;
    }
    println!("Owner tables grown past the persistent set:");
    for owner in &report.context.owners {
        println!("  {} (0x{:04X})", owner.label, owner.owner);
        print_dump(&owner.table);
    }
}

fn print_dump(table: &TableDump) {
    for slot in &table.slots {
        let marker = if slot.temporary { " (temp)" } else { "" };
        println!(
            "    [{:>2}] id {:04X}{marker}, seg {}",
            slot.index, slot.object, slot.segment
        );
    }
}
