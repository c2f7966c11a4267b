use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

fn run_slot_engine(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_slot_engine"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .context("executing slot_engine")
}

fn transcript(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().context("artefact path is not valid UTF-8")
}

#[test]
fn demo_run_with_spawn_ring() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for run artefacts")?;
    let report_path = temp_dir.path().join("report.json");
    let events_path = temp_dir.path().join("events.json");

    let output = run_slot_engine(&[
        "--spawn-ring-demo",
        "--report-json",
        path_str(&report_path)?,
        "--events-json",
        path_str(&events_path)?,
    ])?;
    assert!(
        output.status.success(),
        "slot_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );
    assert!(transcript(&output).contains("Saved run report"));

    let report = read_json(&report_path)?;
    assert_eq!(report["context"]["depth"], 0);
    assert_eq!(report["context"]["pending_overflow"], 0);
    assert_eq!(report["context"]["stats"]["underflows"], 0);
    assert_eq!(report["context"]["stats"]["overflows"], 0);
    assert_eq!(report["engine"]["draw_misses"], 0);
    assert_eq!(report["live_table"]["num_entries"], 2);
    assert_eq!(report["live_table"]["num_persistent_entries"], 2);

    let actors = report["actors"].as_array().context("actors array")?;
    let redeads: Vec<&Value> = actors
        .iter()
        .filter(|actor| actor["label"] == "En_Rd")
        .collect();
    assert_eq!(redeads.len(), 8);
    assert_eq!(redeads[0]["yaw"], 0x8000);
    assert!(redeads.iter().all(|actor| actor["parent"].is_null()));

    let owners = report["context"]["owners"]
        .as_array()
        .context("owner tables")?;
    let redead_table = owners
        .iter()
        .find(|owner| owner["label"] == "En_Rd")
        .context("redead owner table")?;
    let objects: Vec<u64> = redead_table["table"]["slots"]
        .as_array()
        .context("redead slots")?
        .iter()
        .filter_map(|slot| slot["object"].as_u64())
        .collect();
    assert_eq!(objects, vec![0x0001, 0x0011, 0x0075]);

    let events = read_json(&events_path)?;
    let slot_events = events["slots"].as_array().context("slot events")?;
    assert!(slot_events
        .iter()
        .any(|event| event == "slots.global_restored"));
    assert!(events["coverage"]["slots.enter"].as_u64().unwrap_or(0) > 0);
    assert_eq!(
        events["coverage"]["slots.enter"],
        events["coverage"]["slots.exit"]
    );

    Ok(())
}

#[test]
fn deep_spawn_chain_survives_small_stack() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for run artefacts")?;
    let scenario_path = temp_dir.path().join("chain.json");
    let config_path = temp_dir.path().join("config.json");
    let report_path = temp_dir.path().join("report.json");

    fs::write(
        &scenario_path,
        r#"{
            "persistent_objects": [1],
            "actor_types": [
                { "id": "0x0010", "name": "En_Chain", "objects": [256],
                  "draw_objects": [256], "spawn_on_init": ["En_Chain"] }
            ],
            "spawns": [ { "frame": 0, "actor": "En_Chain" } ],
            "frames": 2,
            "actor_limit": 12
        }"#,
    )
    .context("writing chain scenario")?;
    fs::write(&config_path, r#"{ "stack_capacity": 8 }"#).context("writing config")?;

    let output = run_slot_engine(&[
        "--scenario",
        path_str(&scenario_path)?,
        "--config",
        path_str(&config_path)?,
        "--report-json",
        path_str(&report_path)?,
    ])?;
    assert!(
        output.status.success(),
        "slot_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );
    assert!(transcript(&output).contains("overflowed entries x4"));

    let report = read_json(&report_path)?;
    let stats = &report["context"]["stats"];
    assert_eq!(report["context"]["capacity"], 8);
    assert_eq!(report["context"]["depth"], 0);
    assert_eq!(stats["max_depth"], 8);
    assert_eq!(stats["overflows"], 4);
    assert_eq!(stats["overflow_unwinds"], 4);
    assert_eq!(stats["underflows"], 0);
    assert_eq!(report["actors"].as_array().map(Vec::len), Some(12));
    assert_eq!(report["engine"]["draw_misses"], 0);

    Ok(())
}

#[test]
fn owner_names_file_relabels_actors() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for run artefacts")?;
    let names_path = temp_dir.path().join("names.json");
    let report_path = temp_dir.path().join("report.json");
    fs::write(&names_path, r#"{ "0x0125": "EnemyEncounter" }"#).context("writing names")?;

    let output = run_slot_engine(&[
        "--owner-names",
        path_str(&names_path)?,
        "--frames",
        "1",
        "--verbose",
        "--report-json",
        path_str(&report_path)?,
    ])?;
    assert!(
        output.status.success(),
        "slot_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );
    assert!(transcript(&output).contains("Live object context (2 entries, 2 persistent)"));

    let report = read_json(&report_path)?;
    assert_eq!(report["frames"], 1);
    let labels: Vec<&str> = report["actors"]
        .as_array()
        .context("actors array")?
        .iter()
        .filter_map(|actor| actor["label"].as_str())
        .collect();
    assert!(labels.contains(&"EnemyEncounter"), "labels: {labels:?}");
    assert!(!labels.contains(&"En_Encount"));

    Ok(())
}

#[test]
fn invalid_inputs_fail_with_context() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for run artefacts")?;
    let scenario_path = temp_dir.path().join("broken.json");
    fs::write(&scenario_path, "{ \"actor_types\": ").context("writing broken scenario")?;

    let output = run_slot_engine(&["--scenario", path_str(&scenario_path)?])?;
    assert!(!output.status.success());
    assert!(transcript(&output).contains("parsing scenario"));

    let output = run_slot_engine(&["--frames", "0"])?;
    assert!(!output.status.success());
    assert!(transcript(&output).contains("--frames must be at least 1"));

    let config_path = temp_dir.path().join("config.json");
    fs::write(&config_path, r#"{ "owner_count": 0 }"#).context("writing config")?;
    let output = run_slot_engine(&["--config", path_str(&config_path)?])?;
    assert!(!output.status.success());
    assert!(transcript(&output).contains("loading slot context config"));

    Ok(())
}
