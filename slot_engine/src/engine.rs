use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::Serialize;
use slot_context::{
    ContextManager, HostId, LiveTableHost, ObjectId, OwnerId, OwnerNames, SlotContextConfig,
    OBJECT_SLOT_COUNT, OBJECT_SLOT_NONE,
};

use crate::hooks::HookBridge;
use crate::pool::GlobalObjectPool;
use crate::report::{ActorReport, EventLog, RunReport};
use crate::scenario::{ActorType, CompiledScenario};
use crate::scene::{cos_s, sin_s, Scene, Vec3};
use crate::scheduler::{SpawnRequest, SpawnSchedule};

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRing {
    actor: OwnerId,
    anchor: usize,
    count: u32,
    distance: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub spawned: u64,
    pub spawn_failures: u64,
    pub refused_spawns: u64,
    pub update_misses: u64,
    pub draw_misses: u64,
}

/// Frame loop driving a scene through the hook bridge: every spawn, update and
/// draw of an actor runs with that actor type's slot table live.
#[derive(Debug)]
pub struct Engine {
    manager: ContextManager,
    bridge: HookBridge,
    pool: GlobalObjectPool,
    scene: Scene,
    types: BTreeMap<OwnerId, ActorType>,
    schedule: SpawnSchedule,
    pending_rings: Vec<PendingRing>,
    persistent_objects: Vec<ObjectId>,
    scene_changes: Vec<u32>,
    actor_limit: usize,
    frame: u32,
    scenes: u32,
    next_host: u32,
    stats: EngineStats,
    events: Vec<String>,
}

impl Engine {
    pub fn new(config: &SlotContextConfig, names: OwnerNames, scenario: CompiledScenario) -> Self {
        let CompiledScenario {
            persistent_objects,
            types,
            spawns,
            rings,
            scene_changes,
            frames: _,
            actor_limit,
        } = scenario;

        let mut engine = Engine {
            manager: ContextManager::new(config).with_names(names),
            bridge: HookBridge::new(),
            pool: GlobalObjectPool::new(),
            scene: Scene::new(HostId(1)),
            types,
            schedule: SpawnSchedule::from_scenario(&spawns, &rings),
            pending_rings: Vec::new(),
            persistent_objects,
            scene_changes,
            actor_limit,
            frame: 0,
            scenes: 1,
            next_host: 1,
            stats: EngineStats::default(),
            events: Vec::new(),
        };
        engine.init_object_context();
        engine
    }

    #[allow(dead_code)]
    pub fn manager(&self) -> &ContextManager {
        &self.manager
    }

    #[allow(dead_code)]
    pub fn bridge(&self) -> &HookBridge {
        &self.bridge
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[allow(dead_code)]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    fn label(&self, owner: OwnerId) -> String {
        self.manager.names().label(owner)
    }

    /// Binds the persistent objects into the live table one by one, the way
    /// the engine constructs its persistent set on scene load. Each addition
    /// is propagated to every owner.
    fn init_object_context(&mut self) {
        for object in self.persistent_objects.clone() {
            let slot = self.scene.object_context().len();
            if slot >= OBJECT_SLOT_COUNT {
                warn!("no room for persistent object {object}");
                break;
            }
            self.bridge.on_spawn_persistent(&self.scene);
            self.bridge.object_bind_immediate(
                &mut self.manager,
                &mut self.scene,
                slot as i32,
                object,
                &mut self.pool,
            );
            let ctx = self.scene.object_context_mut();
            ctx.num_entries += 1;
            ctx.num_persistent_entries = ctx.num_entries;
            self.bridge
                .after_spawn_persistent(&mut self.manager, &self.scene);
        }

        let host = self.scene.id();
        let ctx = self.scene.object_context_mut();
        ctx.main_keep_slot = 0;
        ctx.sub_keep_slot = if ctx.num_entries > 1 { 1 } else { 0 };
        let persistent = ctx.num_persistent_entries;
        self.events
            .push(format!("engine.scene_init {host} persistent {persistent}"));
    }

    /// Replaces the scene with a fresh one. Owner tables survive; their
    /// persistent prefix is rewritten by the new scene's persistent set.
    pub fn change_scene(&mut self) {
        if self.manager.is_active() {
            warn!(
                "scene change with {} slot contexts still open",
                self.manager.depth()
            );
        }
        self.next_host += 1;
        self.scene = Scene::new(HostId(self.next_host));
        self.pending_rings.clear();
        self.scenes += 1;
        info!("loading {} at frame {}", self.scene.id(), self.frame);
        self.init_object_context();
    }

    /// Spawns an actor of type `kind` with its slot context live. Children
    /// spawned from its init run nested inside it.
    pub fn spawn_actor(
        &mut self,
        kind: OwnerId,
        position: Vec3,
        yaw: u16,
        parent: Option<usize>,
    ) -> Option<usize> {
        if self.scene.actor_count() >= self.actor_limit {
            self.stats.refused_spawns += 1;
            debug!("actor limit reached, dropping {}", self.label(kind));
            return None;
        }
        let Some(actor_type) = self.types.get(&kind).cloned() else {
            self.stats.spawn_failures += 1;
            warn!("no actor type {}", self.label(kind));
            return None;
        };

        self.bridge
            .on_spawn(&mut self.manager, &mut self.scene, kind);
        let spawned = self.construct_actor(&actor_type, position, yaw, parent);
        self.bridge.after_spawn(&mut self.manager, &mut self.scene);
        spawned
    }

    fn construct_actor(
        &mut self,
        actor_type: &ActorType,
        position: Vec3,
        yaw: u16,
        parent: Option<usize>,
    ) -> Option<usize> {
        let mut primary = OBJECT_SLOT_NONE;
        for (i, object) in actor_type.objects.iter().enumerate() {
            let slot = self.bridge.object_get_slot(
                &mut self.manager,
                &mut self.scene,
                *object,
                &mut self.pool,
            );
            if slot == OBJECT_SLOT_NONE {
                self.stats.spawn_failures += 1;
                warn!(
                    "{} spawn failed: no slot for object {object}",
                    self.manager.names().describe(actor_type.id)
                );
                self.events
                    .push(format!("engine.spawn_failed {}", actor_type.id));
                return None;
            }
            if i == 0 {
                primary = slot;
            }
        }

        let index = self
            .scene
            .add_actor(actor_type.id, position, yaw, parent, primary);
        self.stats.spawned += 1;
        let label = self.label(actor_type.id);
        self.events.push(format!("engine.spawn {label} #{index}"));

        for child in &actor_type.spawn_on_init {
            if self.spawn_actor(*child, position, yaw, Some(index)).is_some() {
                if let Some(actor) = self.scene.actor_mut(index) {
                    actor.children_spawned += 1;
                }
            }
        }
        Some(index)
    }

    fn update_actor(&mut self, index: usize) {
        let Some(actor) = self.scene.actor(index) else {
            return;
        };
        let (kind, position, yaw) = (actor.kind, actor.position, actor.yaw);
        let Some(actor_type) = self.types.get(&kind).cloned() else {
            return;
        };

        self.bridge
            .on_update(&mut self.manager, &mut self.scene, kind);

        for object in &actor_type.update_objects {
            let slot = self.bridge.object_get_slot(
                &mut self.manager,
                &mut self.scene,
                *object,
                &mut self.pool,
            );
            if slot == OBJECT_SLOT_NONE {
                self.stats.update_misses += 1;
            }
        }

        let (frames_alive, children) = match self.scene.actor_mut(index) {
            Some(actor) => {
                actor.frames_alive += 1;
                (actor.frames_alive, actor.children_spawned)
            }
            None => (0, 0),
        };
        if let Some(periodic) = actor_type.spawn_on_update.as_ref() {
            let under_limit = periodic.limit.map_or(true, |limit| children < limit);
            if frames_alive % periodic.every == 0 && under_limit {
                if self
                    .spawn_actor(periodic.actor, position, yaw, Some(index))
                    .is_some()
                {
                    if let Some(actor) = self.scene.actor_mut(index) {
                        actor.children_spawned += 1;
                    }
                }
            }
        }

        let (anchored, rest): (Vec<PendingRing>, Vec<PendingRing>) = self
            .pending_rings
            .drain(..)
            .partition(|ring| ring.anchor == index);
        self.pending_rings = rest;
        for ring in anchored {
            self.spawn_ring(ring, position);
        }

        self.bridge.after_update(&mut self.manager, &mut self.scene);
    }

    /// Spawns `count` actors on a circle around `center`, each facing the
    /// center.
    fn spawn_ring(&mut self, ring: PendingRing, center: Vec3) {
        let step = 0x10000 / ring.count.max(1);
        for i in 0..ring.count {
            let angle = (step * i) as u16;
            let position = Vec3::new(
                center.x + sin_s(angle) * ring.distance,
                center.y,
                center.z + cos_s(angle) * ring.distance,
            );
            self.spawn_actor(ring.actor, position, angle.wrapping_add(0x8000), None);
        }
        let label = self.label(ring.actor);
        self.events
            .push(format!("engine.spawn_ring {label} x{}", ring.count));
    }

    fn draw_actor(&mut self, index: usize) {
        let Some(kind) = self.scene.actor(index).map(|actor| actor.kind) else {
            return;
        };
        let Some(actor_type) = self.types.get(&kind).cloned() else {
            return;
        };

        self.bridge.on_draw(&mut self.manager, &mut self.scene, kind);

        let mut misses = 0;
        for object in &actor_type.draw_objects {
            let slot = self.bridge.object_get_slot(
                &mut self.manager,
                &mut self.scene,
                *object,
                &mut self.pool,
            );
            let bound = usize::try_from(slot)
                .ok()
                .and_then(|slot| self.scene.object_context().slots.get(slot))
                .is_some_and(|slot| slot.segment == GlobalObjectPool::segment_for(*object));
            if !bound {
                misses += 1;
            }
        }
        if let Some(actor) = self.scene.actor_mut(index) {
            actor.draws += 1;
            actor.draw_misses += misses;
        }
        if misses > 0 {
            self.stats.draw_misses += u64::from(misses);
            warn!(
                "{} #{index} drew with {misses} unresolved objects",
                self.label(kind)
            );
        }

        self.bridge.after_draw(&mut self.manager, &mut self.scene);
    }

    /// One frame: scripted spawns, update of every actor, then draw of every
    /// actor. Actors spawned during the update pass are first updated next
    /// frame.
    pub fn run_frame(&mut self) {
        if self.frame > 0 && self.scene_changes.binary_search(&self.frame).is_ok() {
            self.change_scene();
        }

        for request in self.schedule.due(self.frame) {
            match request {
                SpawnRequest::Actor {
                    actor, position, ..
                } => {
                    self.spawn_actor(actor, Vec3::from_array(position), 0, None);
                }
                SpawnRequest::Ring {
                    actor,
                    anchor,
                    count,
                    distance,
                    ..
                } => self.pending_rings.push(PendingRing {
                    actor,
                    anchor,
                    count,
                    distance,
                }),
            }
        }

        let updating = self.scene.actor_count();
        for index in 0..updating {
            self.update_actor(index);
        }
        for ring in std::mem::take(&mut self.pending_rings) {
            warn!("ring anchor #{} missing, spawning around the origin", ring.anchor);
            self.spawn_ring(ring, Vec3::default());
        }

        for index in 0..self.scene.actor_count() {
            self.draw_actor(index);
        }

        if self.manager.is_active() || self.bridge.open_hooks() > 0 {
            warn!(
                "frame {} ended at slot depth {} with {} open hooks",
                self.frame,
                self.manager.depth(),
                self.bridge.open_hooks()
            );
        }
        self.frame += 1;
    }

    pub fn run(&mut self, frames: u32) {
        for _ in 0..frames {
            self.run_frame();
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            frames: self.frame,
            scenes: self.scenes,
            host: self.scene.id(),
            live_table: slot_context::TableDump::from_live(self.scene.object_context()),
            context: self.manager.report(),
            pool: self.pool.report(),
            engine: self.stats.clone(),
            mismatched_hooks: self.bridge.mismatched_exits(),
            actors: self
                .scene
                .actors()
                .iter()
                .map(|actor| ActorReport {
                    label: self.label(actor.kind),
                    actor: actor.clone(),
                })
                .collect(),
        }
    }

    pub fn event_log(&self) -> EventLog {
        EventLog {
            engine: self.events.clone(),
            slots: self.manager.events().map(str::to_string).collect(),
            coverage: self.manager.coverage_counts().clone(),
        }
    }
}
