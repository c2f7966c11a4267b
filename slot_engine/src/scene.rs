use serde::Serialize;
use slot_context::{HostId, LiveTableHost, ObjectContext, OwnerId};

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(values: [f32; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

/// Binary angle units used by the engine: 0x10000 per turn.
pub fn sin_s(angle: u16) -> f32 {
    (f32::from(angle) * std::f32::consts::TAU / 65536.0).sin()
}

pub fn cos_s(angle: u16) -> f32 {
    (f32::from(angle) * std::f32::consts::TAU / 65536.0).cos()
}

#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub index: usize,
    pub kind: OwnerId,
    pub position: Vec3,
    pub yaw: u16,
    pub parent: Option<usize>,
    /// Slot of the actor's primary object in its own table at spawn time.
    pub object_slot: i32,
    pub frames_alive: u32,
    pub children_spawned: u32,
    pub draws: u32,
    pub draw_misses: u32,
}

/// Play state for one scene: owns the live object table and the actors.
#[derive(Debug)]
pub struct Scene {
    id: HostId,
    object_ctx: ObjectContext,
    actors: Vec<Actor>,
}

impl Scene {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            object_ctx: ObjectContext::new(),
            actors: Vec::new(),
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn actor(&self, index: usize) -> Option<&Actor> {
        self.actors.get(index)
    }

    pub fn actor_mut(&mut self, index: usize) -> Option<&mut Actor> {
        self.actors.get_mut(index)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn add_actor(
        &mut self,
        kind: OwnerId,
        position: Vec3,
        yaw: u16,
        parent: Option<usize>,
        object_slot: i32,
    ) -> usize {
        let index = self.actors.len();
        self.actors.push(Actor {
            index,
            kind,
            position,
            yaw,
            parent,
            object_slot,
            frames_alive: 0,
            children_spawned: 0,
            draws: 0,
            draw_misses: 0,
        });
        index
    }
}

impl LiveTableHost for Scene {
    fn host_id(&self) -> HostId {
        self.id
    }

    fn object_context(&self) -> &ObjectContext {
        &self.object_ctx
    }

    fn object_context_mut(&mut self) -> &mut ObjectContext {
        &mut self.object_ctx
    }
}
