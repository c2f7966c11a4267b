use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Runs a scene with per-actor-type object slot tables",
    version
)]
pub struct Args {
    /// Scenario JSON describing actor types and spawns (default: built-in demo)
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Slot context configuration JSON (owner count, stack capacity)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON table of actor type names keyed by id
    #[arg(long)]
    pub owner_names: Option<PathBuf>,

    /// Number of frames to run, overriding the scenario
    #[arg(long)]
    pub frames: Option<u32>,

    /// Spawn a ring of redeads around the first actor on frame 1
    #[arg(long)]
    pub spawn_ring_demo: bool,

    /// Path to write the run report JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Path to write the slot and engine event trails as JSON
    #[arg(long)]
    pub events_json: Option<PathBuf>,

    /// Dump the live table and every owner table after the run
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug)]
pub struct RunArgs {
    pub scenario: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub owner_names: Option<PathBuf>,
    pub frames: Option<u32>,
    pub spawn_ring_demo: bool,
    pub report_json: Option<PathBuf>,
    pub events_json: Option<PathBuf>,
    pub verbose: bool,
}

pub fn parse() -> Result<RunArgs> {
    let args = Args::parse();
    args.into_run_args()
}

impl Args {
    fn into_run_args(self) -> Result<RunArgs> {
        if self.frames == Some(0) {
            bail!("--frames must be at least 1");
        }
        if self.report_json.is_some() && self.report_json == self.events_json {
            bail!("--report-json and --events-json must name different files");
        }

        Ok(RunArgs {
            scenario: self.scenario,
            config: self.config,
            owner_names: self.owner_names,
            frames: self.frames,
            spawn_ring_demo: self.spawn_ring_demo,
            report_json: self.report_json,
            events_json: self.events_json,
            verbose: self.verbose,
        })
    }
}
