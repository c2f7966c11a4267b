//! Owner context stack.
//!
//! The engine has a single live object table. Whenever control enters code
//! that belongs to an actor type (spawning, updating or drawing one), the
//! manager swaps that owner's saved table into the live one, and swaps it back
//! out when control returns. Entries nest: the live table saved on a nested
//! entry is the parent's in-progress table, so it goes into the parent's
//! store, and the parent gets it back on the matching exit. The table the
//! engine had before the outermost entry is kept aside in full and restored
//! when the stack empties.
//!
//! Every frame remembers the host it was opened on. Nested entries and exits
//! on any other host are refused without moving a table.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SlotContextConfig;
use crate::diagnostics::{
    owner_event, ContextReport, ContextStats, OwnerTableReport, StackFrameReport, TableDump,
};
use crate::error::ContextError;
use crate::names::OwnerNames;
use crate::resolve::{bind_slot_immediate, resolve_slot, ObjectPool, SlotResolution};
use crate::store::{OwnerId, OwnerSlotStore};
use crate::table::{GlobalSlots, ObjectContext, ObjectId, SegmentAddr};

/// Identifies the engine state that owns a live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub u32);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// Engine state holding the live object table.
pub trait LiveTableHost {
    fn host_id(&self) -> HostId;
    fn object_context(&self) -> &ObjectContext;
    fn object_context_mut(&mut self) -> &mut ObjectContext;
}

/// Minimal host: an id and a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableHost {
    pub id: HostId,
    pub table: ObjectContext,
}

impl TableHost {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            table: ObjectContext::new(),
        }
    }
}

impl LiveTableHost for TableHost {
    fn host_id(&self) -> HostId {
        self.id
    }

    fn object_context(&self) -> &ObjectContext {
        &self.table
    }

    fn object_context_mut(&mut self) -> &mut ObjectContext {
        &mut self.table
    }
}

/// What an entry did to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    /// The owner's table is live at this depth.
    Pushed { depth: usize },
    /// The stack was full; the owner shares its parent's table. The matching
    /// exit still has to be made.
    Overflowed,
    /// Nothing happened; no exit must follow.
    Rejected,
}

impl EnterOutcome {
    pub fn needs_exit(self) -> bool {
        !matches!(self, EnterOutcome::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackFrame {
    owner: OwnerId,
    host: HostId,
}

pub struct ContextManager {
    store: OwnerSlotStore,
    global: GlobalSlots,
    stack: Vec<StackFrame>,
    capacity: usize,
    overflowed: usize,
    names: OwnerNames,
    stats: ContextStats,
    events: VecDeque<String>,
    event_trail: usize,
    coverage: BTreeMap<String, u64>,
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager")
            .field("owner_count", &self.store.owner_count())
            .field("stack", &self.stack)
            .field("capacity", &self.capacity)
            .field("overflowed", &self.overflowed)
            .field("event_trail", &self.event_trail)
            .finish()
    }
}

impl ContextManager {
    pub fn new(config: &SlotContextConfig) -> Self {
        ContextManager {
            store: OwnerSlotStore::new(config.owner_count),
            global: GlobalSlots::default(),
            stack: Vec::with_capacity(config.stack_capacity),
            capacity: config.stack_capacity,
            overflowed: 0,
            names: OwnerNames::new(),
            stats: ContextStats::default(),
            events: VecDeque::with_capacity(config.event_trail.min(1024)),
            event_trail: config.event_trail,
            coverage: BTreeMap::new(),
        }
    }

    pub fn with_names(mut self, names: OwnerNames) -> Self {
        self.names = names;
        self
    }

    /// Keeps the most recent `limit` slot events; 0 turns the trail off.
    pub fn with_event_trail(mut self, limit: usize) -> Self {
        self.event_trail = limit;
        while self.events.len() > limit {
            self.events.pop_front();
        }
        self
    }

    pub fn names(&self) -> &OwnerNames {
        &self.names
    }

    pub fn names_mut(&mut self) -> &mut OwnerNames {
        &mut self.names
    }

    pub fn store(&self) -> &OwnerSlotStore {
        &self.store
    }

    pub fn global(&self) -> &GlobalSlots {
        &self.global
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries rejected for lack of room whose exits have not happened yet.
    pub fn pending_overflow(&self) -> usize {
        self.overflowed
    }

    pub fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn top(&self) -> Option<OwnerId> {
        self.stack.last().map(|frame| frame.owner)
    }

    /// Owners on the stack, outermost first.
    pub fn stack(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.stack.iter().map(|frame| frame.owner)
    }

    /// Host of the innermost open frame.
    pub fn active_host(&self) -> Option<HostId> {
        self.stack.last().map(|frame| frame.host)
    }

    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// The retained event trail, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &str> + '_ {
        self.events.iter().map(String::as_str)
    }

    pub fn event_trail(&self) -> usize {
        self.event_trail
    }

    pub fn coverage_counts(&self) -> &BTreeMap<String, u64> {
        &self.coverage
    }

    fn log_event(&mut self, event: impl Into<String>) {
        if self.event_trail == 0 {
            return;
        }
        if self.events.len() == self.event_trail {
            self.events.pop_front();
        }
        self.events.push_back(event.into());
    }

    fn check_host(&self, found: HostId) -> Result<(), ContextError> {
        match self.active_host() {
            Some(expected) if expected != found => {
                Err(ContextError::HostMismatch { expected, found })
            }
            _ => Ok(()),
        }
    }

    fn bump(&mut self, key: &str) {
        *self.coverage.entry(key.to_string()).or_default() += 1;
    }

    /// Makes `owner`'s table live in `host`.
    ///
    /// On an empty stack the live table is kept aside as the global table;
    /// otherwise it is saved into the current top owner's store before the new
    /// owner's table replaces it. A nested entry must use the host of the
    /// frame it nests in.
    pub fn try_enter<H>(&mut self, owner: OwnerId, host: &mut H) -> Result<usize, ContextError>
    where
        H: LiveTableHost + ?Sized,
    {
        if !self.store.contains(owner) {
            return Err(ContextError::InvalidOwner {
                owner,
                owner_count: self.store.owner_count(),
            });
        }
        let host_id = host.host_id();
        self.check_host(host_id)?;
        if self.stack.len() >= self.capacity {
            self.overflowed += 1;
            return Err(ContextError::StackOverflow {
                owner,
                capacity: self.capacity,
            });
        }

        let live = host.object_context_mut();
        match self.stack.last() {
            Some(parent) => {
                self.store.save_from(parent.owner, live);
            }
            None => self.global.capture(live),
        }
        self.stack.push(StackFrame {
            owner,
            host: host_id,
        });
        self.store.load_into(owner, live);

        let depth = self.stack.len();
        self.stats.max_depth = self.stats.max_depth.max(depth);
        Ok(depth)
    }

    /// Hook-facing entry: failures are logged and absorbed.
    pub fn enter<H>(&mut self, owner: OwnerId, host: &mut H) -> EnterOutcome
    where
        H: LiveTableHost + ?Sized,
    {
        match self.try_enter(owner, host) {
            Ok(depth) => {
                self.stats.enters += 1;
                self.bump("slots.enter");
                debug!(
                    "loading slots for {} at depth {depth}",
                    self.names.describe(owner)
                );
                self.log_event(owner_event("enter", owner, depth));
                EnterOutcome::Pushed { depth }
            }
            Err(err @ ContextError::StackOverflow { .. }) => {
                self.stats.overflows += 1;
                self.bump("slots.overflow");
                warn!("{err} ({})", self.names.describe(owner));
                self.log_event(owner_event("overflow", owner, self.stack.len()));
                EnterOutcome::Overflowed
            }
            Err(err @ ContextError::HostMismatch { .. }) => {
                self.stats.host_mismatches += 1;
                self.bump("slots.host_mismatch");
                warn!("{err}; not entering {}", self.names.describe(owner));
                self.log_event(format!("slots.host_mismatch enter {owner}"));
                EnterOutcome::Rejected
            }
            Err(err) => {
                self.stats.invalid_owners += 1;
                self.bump("slots.invalid_owner");
                warn!("{err}; leaving the live table alone");
                self.log_event(format!("slots.invalid_owner {owner}"));
                EnterOutcome::Rejected
            }
        }
    }

    /// Saves the live table into the top owner's store, pops it and makes the
    /// new top's table (or the global table) live again.
    ///
    /// `Ok(None)` means the exit matched an entry that overflowed the stack;
    /// no tables move in that case. An exit on a host other than the top
    /// frame's is refused and leaves the stack as it was.
    pub fn try_exit<H>(&mut self, host: &mut H) -> Result<Option<OwnerId>, ContextError>
    where
        H: LiveTableHost + ?Sized,
    {
        self.check_host(host.host_id())?;
        if self.overflowed > 0 {
            self.overflowed -= 1;
            return Ok(None);
        }
        let Some(owner) = self.top() else {
            return Err(ContextError::StackUnderflow);
        };

        let live = host.object_context_mut();
        self.store.save_from(owner, live);
        self.stack.pop();
        match self.stack.last() {
            Some(parent) => {
                self.store.load_into(parent.owner, live);
            }
            None => self.global.restore(live),
        }
        Ok(Some(owner))
    }

    /// Hook-facing exit. Returns the popped owner, `None` when nothing was
    /// popped (empty stack, or the exit of an overflowed entry).
    pub fn exit<H>(&mut self, host: &mut H) -> Option<OwnerId>
    where
        H: LiveTableHost + ?Sized,
    {
        match self.try_exit(host) {
            Ok(Some(owner)) => {
                self.stats.exits += 1;
                self.bump("slots.exit");
                let depth = self.stack.len();
                debug!(
                    "unloading slots for {}, depth now {depth}",
                    self.names.describe(owner)
                );
                self.log_event(owner_event("exit", owner, depth));
                if depth == 0 {
                    self.log_event("slots.global_restored");
                }
                Some(owner)
            }
            Ok(None) => {
                self.stats.overflow_unwinds += 1;
                self.bump("slots.overflow_unwind");
                debug!(
                    "exit of an overflowed slot context; {} pending",
                    self.overflowed
                );
                self.log_event(format!("slots.overflow_unwind depth {}", self.stack.len()));
                None
            }
            Err(err @ ContextError::HostMismatch { .. }) => {
                self.stats.host_mismatches += 1;
                self.bump("slots.host_mismatch");
                warn!("{err}; exit ignored");
                self.log_event(format!("slots.host_mismatch exit depth {}", self.stack.len()));
                None
            }
            Err(err) => {
                self.stats.underflows += 1;
                self.bump("slots.underflow");
                warn!("{err}");
                self.log_event("slots.underflow");
                None
            }
        }
    }

    /// Runs `body` with `owner`'s table live, exiting afterwards when the entry
    /// needs it.
    pub fn with_owner<H, R, F>(&mut self, owner: OwnerId, host: &mut H, body: F) -> R
    where
        H: LiveTableHost + ?Sized,
        F: FnOnce(&mut Self, &mut H) -> R,
    {
        let outcome = self.enter(owner, host);
        let result = body(self, host);
        if outcome.needs_exit() {
            self.exit(host);
        }
        result
    }

    /// Copies the persistent prefix of `source` into every owner's store.
    pub fn propagate_persistent(&mut self, source: &ObjectContext) -> usize {
        let count = self.store.propagate_persistent(source);
        self.stats.propagations += 1;
        self.bump("slots.propagate");
        info!("copying {count} persistent slots");
        self.log_event(format!("slots.propagate {count}"));
        count
    }

    /// Slot lookup with on-demand loading, see [`resolve_slot`].
    pub fn get_slot<H, P>(&mut self, host: &mut H, object: ObjectId, pool: &mut P) -> SlotResolution
    where
        H: LiveTableHost + ?Sized,
        P: ObjectPool + ?Sized,
    {
        self.stats.lookups += 1;
        let resolution = resolve_slot(host.object_context_mut(), object, pool);
        match resolution {
            SlotResolution::Found(_) => {}
            SlotResolution::Loaded(slot) => {
                self.stats.auto_loads += 1;
                self.bump("slots.autoload");
                debug!("auto loading object {object} into slot {slot}");
                self.log_event(format!("slots.autoload {object} slot {slot}"));
            }
            SlotResolution::Full => {
                self.stats.full_table_misses += 1;
                self.bump("slots.full");
                debug!("no free slot for object {object}");
                self.log_event(format!("slots.full {object}"));
            }
        }
        resolution
    }

    /// Immediate slot binding, see [`bind_slot_immediate`].
    pub fn bind_immediate<H, P>(
        &mut self,
        host: &mut H,
        slot: usize,
        object: ObjectId,
        pool: &mut P,
    ) -> Option<SegmentAddr>
    where
        H: LiveTableHost + ?Sized,
        P: ObjectPool + ?Sized,
    {
        match bind_slot_immediate(host.object_context_mut(), slot, object, pool) {
            Ok(segment) => {
                self.stats.immediate_binds += 1;
                self.bump("slots.bind");
                Some(segment)
            }
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    pub fn report(&self) -> ContextReport {
        let persistent = self.global.saved().persistent_len();
        ContextReport {
            depth: self.stack.len(),
            capacity: self.capacity,
            pending_overflow: self.overflowed,
            stack: self
                .stack
                .iter()
                .map(|frame| StackFrameReport {
                    owner: frame.owner.0,
                    label: self.names.label(frame.owner),
                })
                .collect(),
            stats: self.stats.clone(),
            global: TableDump::from_live(self.global.saved()),
            owners: self
                .store
                .iter_grown(persistent)
                .map(|(owner, table)| OwnerTableReport {
                    owner: owner.0,
                    label: self.names.label(owner),
                    table: TableDump::from_owner(table),
                })
                .collect(),
        }
    }
}
