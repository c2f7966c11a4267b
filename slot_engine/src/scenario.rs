use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use slot_context::{names::parse_owner_id, ObjectId, OwnerId, OwnerNames};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("unknown actor type {0:?}")]
    UnknownActor(String),
    #[error("actor type id {0:?} is not numeric")]
    BadActorId(String),
    #[error("actor type {0} defined twice")]
    DuplicateActor(OwnerId),
    #[error("scenario defines no actor types")]
    NoActorTypes,
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
    #[error("object id 0x{0:04X} is past 0x7FFF and has no engine encoding")]
    ObjectOutOfRange(u16),
}

/// Actor reference as written in scenario files: a number, a hex string or a
/// type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OwnerRef {
    Id(u16),
    Label(String),
}

impl OwnerRef {
    fn resolve(&self, names: &OwnerNames) -> Result<OwnerId, ScenarioError> {
        match self {
            OwnerRef::Id(id) => Ok(OwnerId(*id)),
            OwnerRef::Label(label) => names
                .lookup(label)
                .ok_or_else(|| ScenarioError::UnknownActor(label.clone())),
        }
    }

    fn numeric(&self) -> Result<OwnerId, ScenarioError> {
        match self {
            OwnerRef::Id(id) => Ok(OwnerId(*id)),
            OwnerRef::Label(label) => {
                parse_owner_id(label).ok_or_else(|| ScenarioError::BadActorId(label.clone()))
            }
        }
    }
}

fn default_every() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicSpawnSpec {
    pub actor: OwnerRef,
    #[serde(default = "default_every")]
    pub every: u32,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorTypeSpec {
    pub id: OwnerRef,
    #[serde(default)]
    pub name: Option<String>,
    /// Objects that must resolve for a spawn to succeed.
    #[serde(default)]
    pub objects: Vec<u16>,
    #[serde(default)]
    pub update_objects: Vec<u16>,
    #[serde(default)]
    pub draw_objects: Vec<u16>,
    #[serde(default)]
    pub spawn_on_init: Vec<OwnerRef>,
    #[serde(default)]
    pub spawn_on_update: Option<PeriodicSpawnSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSpawnSpec {
    pub frame: u32,
    pub actor: OwnerRef,
    #[serde(default)]
    pub position: [f32; 3],
}

fn default_ring_count() -> u32 {
    8
}

fn default_ring_distance() -> f32 {
    20.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRingSpec {
    pub frame: u32,
    pub actor: OwnerRef,
    #[serde(default)]
    pub anchor: usize,
    #[serde(default = "default_ring_count")]
    pub count: u32,
    #[serde(default = "default_ring_distance")]
    pub distance: f32,
}

fn default_frames() -> u32 {
    3
}

fn default_actor_limit() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub persistent_objects: Vec<u16>,
    pub actor_types: Vec<ActorTypeSpec>,
    #[serde(default)]
    pub spawns: Vec<ScheduledSpawnSpec>,
    #[serde(default)]
    pub spawn_rings: Vec<SpawnRingSpec>,
    #[serde(default)]
    pub scene_changes: Vec<u32>,
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default = "default_actor_limit")]
    pub actor_limit: usize,
}

impl Scenario {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&raw)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        Ok(scenario)
    }

    /// Built-in scene: a redead spawner that keeps spawning its own kind, a
    /// bomb-carrying enemy and a torch that spawns flames on init.
    pub fn demo() -> Self {
        let actor = |id: u16,
                     name: &str,
                     objects: &[u16],
                     update: &[u16],
                     draw: &[u16],
                     on_init: &[&str],
                     on_update: Option<PeriodicSpawnSpec>| ActorTypeSpec {
            id: OwnerRef::Id(id),
            name: Some(name.to_string()),
            objects: objects.to_vec(),
            update_objects: update.to_vec(),
            draw_objects: draw.to_vec(),
            spawn_on_init: on_init
                .iter()
                .map(|label| OwnerRef::Label(label.to_string()))
                .collect(),
            spawn_on_update: on_update,
        };
        Scenario {
            persistent_objects: vec![0x0001, 0x0011],
            actor_types: vec![
                actor(0x0000, "Player", &[0x0011], &[0x0001], &[0x0011], &[], None),
                actor(
                    0x00EC,
                    "En_Rd",
                    &[0x0075],
                    &[0x0075],
                    &[0x0075, 0x0001],
                    &[],
                    None,
                ),
                actor(
                    0x0040,
                    "En_Bom_Chu",
                    &[0x0001],
                    &[0x0059],
                    &[0x0059],
                    &[],
                    None,
                ),
                actor(
                    0x0039,
                    "Obj_Syokudai",
                    &[0x00A4],
                    &[],
                    &[0x00A4],
                    &["En_Light"],
                    None,
                ),
                actor(0x0045, "En_Light", &[0x0001], &[], &[0x0001], &[], None),
                actor(
                    0x0125,
                    "En_Encount",
                    &[0x0001],
                    &[],
                    &[],
                    &[],
                    Some(PeriodicSpawnSpec {
                        actor: OwnerRef::Label("En_Bom_Chu".to_string()),
                        every: 2,
                        limit: Some(2),
                    }),
                ),
            ],
            spawns: vec![
                ScheduledSpawnSpec {
                    frame: 0,
                    actor: OwnerRef::Label("Player".to_string()),
                    position: [0.0, 0.0, 0.0],
                },
                ScheduledSpawnSpec {
                    frame: 0,
                    actor: OwnerRef::Label("Obj_Syokudai".to_string()),
                    position: [60.0, 0.0, -40.0],
                },
                ScheduledSpawnSpec {
                    frame: 0,
                    actor: OwnerRef::Label("En_Encount".to_string()),
                    position: [-80.0, 0.0, 10.0],
                },
            ],
            spawn_rings: Vec::new(),
            scene_changes: Vec::new(),
            frames: default_frames(),
            actor_limit: default_actor_limit(),
        }
    }

    /// Adds the "spawn a ring of redeads around the player" debug spawn.
    pub fn add_spawn_ring_demo(&mut self, frame: u32) {
        self.spawn_rings.push(SpawnRingSpec {
            frame,
            actor: OwnerRef::Id(0x00EC),
            anchor: 0,
            count: default_ring_count(),
            distance: default_ring_distance(),
        });
    }

    /// Resolves every actor reference. Type names are added to `names`.
    pub fn compile(&self, names: &mut OwnerNames) -> Result<CompiledScenario, ScenarioError> {
        if self.actor_types.is_empty() {
            return Err(ScenarioError::NoActorTypes);
        }
        if self.actor_limit == 0 {
            return Err(ScenarioError::Zero {
                field: "actor_limit",
            });
        }

        let mut ids = Vec::with_capacity(self.actor_types.len());
        for spec in &self.actor_types {
            let id = spec.id.numeric()?;
            if ids.contains(&id) {
                return Err(ScenarioError::DuplicateActor(id));
            }
            if let Some(name) = spec.name.as_ref() {
                names.insert(id, name.clone());
            }
            ids.push(id);
        }

        let mut types = BTreeMap::new();
        for (spec, id) in self.actor_types.iter().zip(ids.iter().copied()) {
            let spawn_on_init = spec
                .spawn_on_init
                .iter()
                .map(|child| resolve_defined(child, names, &ids))
                .collect::<Result<Vec<_>, _>>()?;
            let spawn_on_update = match spec.spawn_on_update.as_ref() {
                Some(periodic) => {
                    if periodic.every == 0 {
                        return Err(ScenarioError::Zero {
                            field: "spawn_on_update.every",
                        });
                    }
                    Some(PeriodicSpawn {
                        actor: resolve_defined(&periodic.actor, names, &ids)?,
                        every: periodic.every,
                        limit: periodic.limit,
                    })
                }
                None => None,
            };
            types.insert(
                id,
                ActorType {
                    id,
                    objects: to_objects(&spec.objects)?,
                    update_objects: to_objects(&spec.update_objects)?,
                    draw_objects: to_objects(&spec.draw_objects)?,
                    spawn_on_init,
                    spawn_on_update,
                },
            );
        }

        let spawns = self
            .spawns
            .iter()
            .map(|spawn| {
                Ok(ScheduledSpawn {
                    frame: spawn.frame,
                    actor: resolve_defined(&spawn.actor, names, &ids)?,
                    position: spawn.position,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        let rings = self
            .spawn_rings
            .iter()
            .map(|ring| {
                if ring.count == 0 {
                    return Err(ScenarioError::Zero {
                        field: "spawn_rings.count",
                    });
                }
                Ok(SpawnRing {
                    frame: ring.frame,
                    actor: resolve_defined(&ring.actor, names, &ids)?,
                    anchor: ring.anchor,
                    count: ring.count,
                    distance: ring.distance,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        let mut scene_changes = self.scene_changes.clone();
        scene_changes.sort_unstable();
        scene_changes.dedup();

        Ok(CompiledScenario {
            persistent_objects: to_objects(&self.persistent_objects)?,
            types,
            spawns,
            rings,
            scene_changes,
            frames: self.frames,
            actor_limit: self.actor_limit,
        })
    }
}

fn to_objects(raw: &[u16]) -> Result<Vec<ObjectId>, ScenarioError> {
    raw.iter()
        .map(|&id| {
            let object = ObjectId(id);
            if object.is_valid() {
                Ok(object)
            } else {
                Err(ScenarioError::ObjectOutOfRange(id))
            }
        })
        .collect()
}

fn resolve_defined(
    reference: &OwnerRef,
    names: &OwnerNames,
    defined: &[OwnerId],
) -> Result<OwnerId, ScenarioError> {
    let id = reference.resolve(names)?;
    if defined.contains(&id) {
        Ok(id)
    } else {
        Err(ScenarioError::UnknownActor(names.describe(id)))
    }
}

#[derive(Debug, Clone)]
pub struct PeriodicSpawn {
    pub actor: OwnerId,
    pub every: u32,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ActorType {
    pub id: OwnerId,
    pub objects: Vec<ObjectId>,
    pub update_objects: Vec<ObjectId>,
    pub draw_objects: Vec<ObjectId>,
    pub spawn_on_init: Vec<OwnerId>,
    pub spawn_on_update: Option<PeriodicSpawn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSpawn {
    pub frame: u32,
    pub actor: OwnerId,
    pub position: [f32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRing {
    pub frame: u32,
    pub actor: OwnerId,
    pub anchor: usize,
    pub count: u32,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct CompiledScenario {
    pub persistent_objects: Vec<ObjectId>,
    pub types: BTreeMap<OwnerId, ActorType>,
    pub spawns: Vec<ScheduledSpawn>,
    pub rings: Vec<SpawnRing>,
    pub scene_changes: Vec<u32>,
    pub frames: u32,
    pub actor_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scenario_compiles() {
        let mut names = OwnerNames::new();
        let compiled = Scenario::demo().compile(&mut names).expect("demo compiles");
        assert_eq!(compiled.types.len(), 6);
        assert_eq!(names.lookup("En_Rd"), Some(OwnerId(0x00EC)));
        let torch = &compiled.types[&OwnerId(0x0039)];
        assert_eq!(torch.spawn_on_init, vec![OwnerId(0x0045)]);
    }

    #[test]
    fn parses_json_with_mixed_references() {
        let raw = r#"{
            "persistent_objects": [1],
            "actor_types": [
                { "id": "0x00EC", "name": "En_Rd", "objects": [117] },
                { "id": 16, "spawn_on_init": ["en_rd", 236] }
            ],
            "spawns": [ { "frame": 0, "actor": "0x0010" } ]
        }"#;
        let scenario: Scenario = serde_json::from_str(raw).expect("scenario json");
        assert_eq!(scenario.frames, 3);

        let mut names = OwnerNames::new();
        let compiled = scenario.compile(&mut names).expect("compiles");
        let parent = &compiled.types[&OwnerId(16)];
        assert_eq!(parent.spawn_on_init, vec![OwnerId(0xEC), OwnerId(0xEC)]);
        assert_eq!(compiled.spawns[0].actor, OwnerId(16));
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let raw = r#"{
            "actor_types": [ { "id": 1, "spawn_on_init": ["En_Missing"] } ]
        }"#;
        let scenario: Scenario = serde_json::from_str(raw).expect("scenario json");
        let err = scenario.compile(&mut OwnerNames::new()).unwrap_err();
        assert_eq!(err, ScenarioError::UnknownActor("En_Missing".to_string()));
    }

    #[test]
    fn undefined_numeric_reference_is_an_error() {
        let raw = r#"{
            "actor_types": [ { "id": 1 } ],
            "spawns": [ { "frame": 0, "actor": 2 } ]
        }"#;
        let scenario: Scenario = serde_json::from_str(raw).expect("scenario json");
        assert!(matches!(
            scenario.compile(&mut OwnerNames::new()),
            Err(ScenarioError::UnknownActor(_))
        ));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let raw = r#"{ "actor_types": [ { "id": 3 }, { "id": "0x0003" } ] }"#;
        let scenario: Scenario = serde_json::from_str(raw).expect("scenario json");
        assert_eq!(
            scenario.compile(&mut OwnerNames::new()).unwrap_err(),
            ScenarioError::DuplicateActor(OwnerId(3))
        );
    }

    #[test]
    fn object_ids_past_the_signed_range_are_rejected() {
        let raw = r#"{ "actor_types": [ { "id": 1, "draw_objects": [32769] } ] }"#;
        let scenario: Scenario = serde_json::from_str(raw).expect("scenario json");
        assert_eq!(
            scenario.compile(&mut OwnerNames::new()).unwrap_err(),
            ScenarioError::ObjectOutOfRange(0x8001)
        );
    }
}
