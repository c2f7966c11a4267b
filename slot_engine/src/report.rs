use std::collections::BTreeMap;

use serde::Serialize;
use slot_context::{ContextReport, HostId, TableDump};

use crate::engine::EngineStats;
use crate::pool::PoolReport;
use crate::scene::Actor;

#[derive(Debug, Clone, Serialize)]
pub struct ActorReport {
    pub label: String,
    #[serde(flatten)]
    pub actor: Actor,
}

/// Everything a run leaves behind, written by `--report-json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub frames: u32,
    pub scenes: u32,
    pub host: HostId,
    pub live_table: TableDump,
    pub context: ContextReport,
    pub pool: PoolReport,
    pub engine: EngineStats,
    pub mismatched_hooks: u64,
    pub actors: Vec<ActorReport>,
}

/// Event trails and coverage counters, written by `--events-json`.
#[derive(Debug, Clone, Serialize)]
pub struct EventLog {
    pub engine: Vec<String>,
    pub slots: Vec<String>,
    pub coverage: BTreeMap<String, u64>,
}
