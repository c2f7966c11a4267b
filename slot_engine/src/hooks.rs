use log::warn;
use serde::Serialize;
use slot_context::{
    ContextManager, EnterOutcome, HostId, LiveTableHost, ObjectId, ObjectPool, OwnerId,
    SegmentAddr, OBJECT_SLOT_NONE,
};

/// Engine operations that run with an actor type's object table live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookTrigger {
    Spawn,
    Draw,
    Update,
}

impl HookTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            HookTrigger::Spawn => "spawn",
            HookTrigger::Draw => "draw",
            HookTrigger::Update => "update",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HookFrame {
    trigger: HookTrigger,
    owner: OwnerId,
    outcome: EnterOutcome,
}

/// Turns the engine's before/after hook pairs into context enters and exits.
///
/// Each `on_*` call records what its entry did so the paired `after_*` only
/// exits when there is something to exit.
#[derive(Debug, Default)]
pub struct HookBridge {
    frames: Vec<HookFrame>,
    persistent_host: Option<HostId>,
    mismatched_exits: u64,
}

impl HookBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_hooks(&self) -> usize {
        self.frames.len()
    }

    pub fn mismatched_exits(&self) -> u64 {
        self.mismatched_exits
    }

    pub fn before<H>(
        &mut self,
        trigger: HookTrigger,
        manager: &mut ContextManager,
        host: &mut H,
        owner: OwnerId,
    ) -> EnterOutcome
    where
        H: LiveTableHost + ?Sized,
    {
        let outcome = manager.enter(owner, host);
        self.frames.push(HookFrame {
            trigger,
            owner,
            outcome,
        });
        outcome
    }

    pub fn after<H>(
        &mut self,
        trigger: HookTrigger,
        manager: &mut ContextManager,
        host: &mut H,
    ) -> Option<OwnerId>
    where
        H: LiveTableHost + ?Sized,
    {
        let Some(frame) = self.frames.pop() else {
            // No matching before-hook; let the manager log the underflow.
            return manager.exit(host);
        };
        if frame.trigger != trigger {
            self.mismatched_exits += 1;
            warn!(
                "{} return hook closed a {} hook for {}",
                trigger.as_str(),
                frame.trigger.as_str(),
                manager.names().describe(frame.owner)
            );
        }
        if frame.outcome.needs_exit() {
            manager.exit(host)
        } else {
            None
        }
    }

    pub fn on_spawn<H>(
        &mut self,
        manager: &mut ContextManager,
        host: &mut H,
        owner: OwnerId,
    ) -> EnterOutcome
    where
        H: LiveTableHost + ?Sized,
    {
        self.before(HookTrigger::Spawn, manager, host, owner)
    }

    pub fn after_spawn<H>(
        &mut self,
        manager: &mut ContextManager,
        host: &mut H,
    ) -> Option<OwnerId>
    where
        H: LiveTableHost + ?Sized,
    {
        self.after(HookTrigger::Spawn, manager, host)
    }

    pub fn on_draw<H>(
        &mut self,
        manager: &mut ContextManager,
        host: &mut H,
        owner: OwnerId,
    ) -> EnterOutcome
    where
        H: LiveTableHost + ?Sized,
    {
        self.before(HookTrigger::Draw, manager, host, owner)
    }

    pub fn after_draw<H>(
        &mut self,
        manager: &mut ContextManager,
        host: &mut H,
    ) -> Option<OwnerId>
    where
        H: LiveTableHost + ?Sized,
    {
        self.after(HookTrigger::Draw, manager, host)
    }

    pub fn on_update<H>(
        &mut self,
        manager: &mut ContextManager,
        host: &mut H,
        owner: OwnerId,
    ) -> EnterOutcome
    where
        H: LiveTableHost + ?Sized,
    {
        self.before(HookTrigger::Update, manager, host, owner)
    }

    pub fn after_update<H>(
        &mut self,
        manager: &mut ContextManager,
        host: &mut H,
    ) -> Option<OwnerId>
    where
        H: LiveTableHost + ?Sized,
    {
        self.after(HookTrigger::Update, manager, host)
    }

    /// Called before the engine adds an object to its persistent set.
    pub fn on_spawn_persistent<H>(&mut self, host: &H)
    where
        H: LiveTableHost + ?Sized,
    {
        self.persistent_host = Some(host.host_id());
    }

    /// Called once the persistent object has been added; copies the grown
    /// persistent prefix into every owner's table.
    pub fn after_spawn_persistent<H>(&mut self, manager: &mut ContextManager, host: &H) -> usize
    where
        H: LiveTableHost + ?Sized,
    {
        match self.persistent_host.take() {
            Some(id) if id == host.host_id() => {
                manager.propagate_persistent(host.object_context())
            }
            Some(id) => {
                warn!(
                    "persistent spawn started on {id} but returned on {}",
                    host.host_id()
                );
                manager.propagate_persistent(host.object_context())
            }
            None => {
                warn!("persistent spawn return without a matching call");
                0
            }
        }
    }

    /// Engine-facing slot lookup: index into the live table or
    /// [`OBJECT_SLOT_NONE`].
    pub fn object_get_slot<H, P>(
        &self,
        manager: &mut ContextManager,
        host: &mut H,
        object: ObjectId,
        pool: &mut P,
    ) -> i32
    where
        H: LiveTableHost + ?Sized,
        P: ObjectPool + ?Sized,
    {
        manager.get_slot(host, object, pool).to_raw()
    }

    /// Engine-facing immediate bind. Negative or out of range slots are
    /// ignored.
    pub fn object_bind_immediate<H, P>(
        &self,
        manager: &mut ContextManager,
        host: &mut H,
        slot: i32,
        object: ObjectId,
        pool: &mut P,
    ) -> Option<SegmentAddr>
    where
        H: LiveTableHost + ?Sized,
        P: ObjectPool + ?Sized,
    {
        if slot == OBJECT_SLOT_NONE {
            return None;
        }
        let index = usize::try_from(slot).ok()?;
        manager.bind_immediate(host, index, object, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::GlobalObjectPool;
    use slot_context::{SlotContextConfig, TableHost};

    fn manager() -> ContextManager {
        ContextManager::new(&SlotContextConfig {
            owner_count: 32,
            stack_capacity: 4,
            ..SlotContextConfig::default()
        })
    }

    #[test]
    fn rejected_entry_skips_its_exit() {
        let mut mgr = manager();
        let mut bridge = HookBridge::new();
        let mut host = TableHost::new(HostId(1));

        bridge.on_update(&mut mgr, &mut host, OwnerId(3));
        bridge.on_draw(&mut mgr, &mut host, OwnerId(900));
        assert_eq!(mgr.depth(), 1);

        assert_eq!(bridge.after_draw(&mut mgr, &mut host), None);
        assert_eq!(mgr.depth(), 1, "parent context still live");
        assert_eq!(bridge.after_update(&mut mgr, &mut host), Some(OwnerId(3)));
        assert_eq!(bridge.open_hooks(), 0);
        assert_eq!(mgr.stats().underflows, 0);
    }

    #[test]
    fn nested_hook_on_another_host_is_skipped() {
        let mut mgr = manager();
        let mut bridge = HookBridge::new();
        let mut host = TableHost::new(HostId(1));
        let mut other = TableHost::new(HostId(2));

        bridge.on_update(&mut mgr, &mut host, OwnerId(3));
        assert_eq!(
            bridge.on_spawn(&mut mgr, &mut other, OwnerId(4)),
            EnterOutcome::Rejected
        );
        assert_eq!(bridge.after_spawn(&mut mgr, &mut other), None);
        assert_eq!(bridge.after_update(&mut mgr, &mut host), Some(OwnerId(3)));
        assert_eq!(mgr.stats().host_mismatches, 1);
        assert_eq!(mgr.stats().underflows, 0);
    }

    #[test]
    fn mismatched_return_hook_still_exits() {
        let mut mgr = manager();
        let mut bridge = HookBridge::new();
        let mut host = TableHost::new(HostId(1));

        bridge.on_spawn(&mut mgr, &mut host, OwnerId(2));
        assert_eq!(bridge.after_draw(&mut mgr, &mut host), Some(OwnerId(2)));
        assert_eq!(bridge.mismatched_exits(), 1);
        assert_eq!(mgr.depth(), 0);
    }

    #[test]
    fn unpaired_return_hook_underflows() {
        let mut mgr = manager();
        let mut bridge = HookBridge::new();
        let mut host = TableHost::new(HostId(1));

        assert_eq!(bridge.after_update(&mut mgr, &mut host), None);
        assert_eq!(mgr.stats().underflows, 1);
    }

    #[test]
    fn persistent_spawn_propagates_on_return() {
        let mut mgr = manager();
        let mut bridge = HookBridge::new();
        let mut host = TableHost::new(HostId(5));
        let mut pool = GlobalObjectPool::new();

        bridge.on_spawn_persistent(&host);
        bridge.object_bind_immediate(&mut mgr, &mut host, 0, ObjectId(1), &mut pool);
        host.table.num_entries = 1;
        host.table.num_persistent_entries = 1;
        assert_eq!(bridge.after_spawn_persistent(&mut mgr, &host), 1);

        let owner = mgr.store().get(OwnerId(31)).expect("owner table");
        assert_eq!(owner.num_entries, 1);
        assert_eq!(
            owner.entries[0].segment,
            GlobalObjectPool::segment_for(ObjectId(1))
        );
        assert_eq!(bridge.after_spawn_persistent(&mut mgr, &host), 0);
    }

    #[test]
    fn get_slot_uses_engine_sentinel() {
        let mut mgr = manager();
        let bridge = HookBridge::new();
        let mut host = TableHost::new(HostId(1));
        let mut pool = GlobalObjectPool::new();

        host.table.num_entries = slot_context::OBJECT_SLOT_COUNT as u8;
        assert_eq!(
            bridge.object_get_slot(&mut mgr, &mut host, ObjectId(0x99), &mut pool),
            OBJECT_SLOT_NONE
        );
        assert_eq!(
            bridge.object_bind_immediate(
                &mut mgr,
                &mut host,
                OBJECT_SLOT_NONE,
                ObjectId(1),
                &mut pool
            ),
            None
        );
        assert_eq!(pool.total_fetches(), 0);
    }
}
