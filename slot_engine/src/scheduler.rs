use std::collections::VecDeque;

use serde::Serialize;
use slot_context::OwnerId;

use crate::scenario::{ScheduledSpawn, SpawnRing};

/// One scripted spawn, either a single actor or a ring around an anchor actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpawnRequest {
    Actor {
        frame: u32,
        actor: OwnerId,
        position: [f32; 3],
    },
    Ring {
        frame: u32,
        actor: OwnerId,
        anchor: usize,
        count: u32,
        distance: f32,
    },
}

impl SpawnRequest {
    pub fn frame(&self) -> u32 {
        match self {
            SpawnRequest::Actor { frame, .. } | SpawnRequest::Ring { frame, .. } => *frame,
        }
    }
}

impl From<&ScheduledSpawn> for SpawnRequest {
    fn from(spawn: &ScheduledSpawn) -> Self {
        SpawnRequest::Actor {
            frame: spawn.frame,
            actor: spawn.actor,
            position: spawn.position,
        }
    }
}

impl From<&SpawnRing> for SpawnRequest {
    fn from(ring: &SpawnRing) -> Self {
        SpawnRequest::Ring {
            frame: ring.frame,
            actor: ring.actor,
            anchor: ring.anchor,
            count: ring.count,
            distance: ring.distance,
        }
    }
}

/// Scripted spawns in frame order. Requests with the same frame keep the
/// order they were given in.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpawnSchedule {
    pending: VecDeque<SpawnRequest>,
    history: Vec<SpawnRequest>,
}

impl SpawnSchedule {
    pub fn new<S>(requests: S) -> Self
    where
        S: IntoIterator<Item = SpawnRequest>,
    {
        let mut requests: Vec<SpawnRequest> = requests.into_iter().collect();
        requests.sort_by_key(SpawnRequest::frame);
        SpawnSchedule {
            pending: requests.into(),
            history: Vec::new(),
        }
    }

    pub fn from_scenario(spawns: &[ScheduledSpawn], rings: &[SpawnRing]) -> Self {
        Self::new(
            spawns
                .iter()
                .map(SpawnRequest::from)
                .chain(rings.iter().map(SpawnRequest::from)),
        )
    }

    /// Removes and returns every request scheduled at or before `frame`.
    pub fn due(&mut self, frame: u32) -> Vec<SpawnRequest> {
        let mut due = Vec::new();
        while self
            .pending
            .front()
            .is_some_and(|request| request.frame() <= frame)
        {
            if let Some(request) = self.pending.pop_front() {
                self.history.push(request.clone());
                due.push(request);
            }
        }
        due
    }

    #[allow(dead_code)]
    pub fn peek(&self) -> Option<&SpawnRequest> {
        self.pending.front()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &[SpawnRequest] {
        &self.history
    }
}
