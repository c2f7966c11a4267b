//! Per-owner object slot tables for a single shared engine object context.
//!
//! Every actor type gets its own saved copy of the engine's 35-entry object
//! table. [`ContextManager`] swaps those copies in and out of the live table as
//! the engine enters and leaves code belonging to an actor type, nesting as
//! deep as the engine does, and puts the original table back when the last
//! context is left. Lookups through [`ContextManager::get_slot`] load missing
//! objects into free slots from an [`ObjectPool`] on demand.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod names;
pub mod resolve;
pub mod stack;
pub mod store;
pub mod table;

pub use config::{ConfigError, SlotContextConfig, DEFAULT_OWNER_COUNT, DEFAULT_STACK_CAPACITY};
pub use diagnostics::{describe_table, ContextReport, ContextStats, TableDump};
pub use error::ContextError;
pub use names::OwnerNames;
pub use resolve::{bind_slot_immediate, resolve_slot, ObjectPool, SlotResolution};
pub use stack::{ContextManager, EnterOutcome, HostId, LiveTableHost, TableHost};
pub use store::{OwnerId, OwnerSlotStore};
pub use table::{
    GlobalSlots, ObjectContext, ObjectId, ObjectSlot, OwnerSlots, PendingLoad, SegmentAddr,
    SlotEntry, SlotId, OBJECT_SLOT_COUNT, OBJECT_SLOT_NONE,
};
