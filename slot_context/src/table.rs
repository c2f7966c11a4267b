use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of object slots in the engine's object context. Must match the
/// engine layout, so it is not configurable.
pub const OBJECT_SLOT_COUNT: usize = 35;

/// Raw slot index the engine uses for "no slot".
pub const OBJECT_SLOT_NONE: i32 = -1;

/// Object (resource) identifier as requested by engine code.
///
/// The engine stores ids as signed 16-bit values and negates them to mark
/// temporary slots, so only `0..=ObjectId::MAX` has an engine encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u16);

impl ObjectId {
    pub const MAX: ObjectId = ObjectId(0x7FFF);

    pub fn is_valid(self) -> bool {
        self <= Self::MAX
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Identifier stored in a slot. The engine marks temporary slots by negating
/// the id; here that marker is a separate flag and lookups ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SlotId {
    pub object: ObjectId,
    pub temporary: bool,
}

impl SlotId {
    pub const EMPTY: SlotId = SlotId {
        object: ObjectId(0),
        temporary: false,
    };

    pub fn new(object: ObjectId) -> Self {
        Self {
            object,
            temporary: false,
        }
    }

    pub fn temporary(object: ObjectId) -> Self {
        Self {
            object,
            temporary: true,
        }
    }

    /// Decodes the engine's signed representation. `i16::MIN` has no
    /// positive counterpart and decodes to `None`.
    pub fn from_raw(raw: i16) -> Option<Self> {
        let object = ObjectId(raw.unsigned_abs());
        object.is_valid().then_some(Self {
            object,
            temporary: raw < 0,
        })
    }

    /// Engine encoding; `None` for ids above [`ObjectId::MAX`].
    pub fn to_raw(self) -> Option<i16> {
        let value = i16::try_from(self.object.0).ok()?;
        Some(if self.temporary { -value } else { value })
    }

    pub fn matches(self, object: ObjectId) -> bool {
        self.object == object
    }
}

/// Opaque address of a resident object segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentAddr(pub u32);

impl SegmentAddr {
    pub const NULL: SegmentAddr = SegmentAddr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SegmentAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Deferred load request the engine attaches to each live slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingLoad {
    pub vrom_addr: u32,
    pub dram_addr: u32,
    pub size: u32,
}

impl PendingLoad {
    pub const NONE: PendingLoad = PendingLoad {
        vrom_addr: 0,
        dram_addr: 0,
        size: 0,
    };

    pub fn is_pending(&self) -> bool {
        self.vrom_addr != 0
    }
}

/// One slot of the live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectSlot {
    pub id: SlotId,
    pub segment: SegmentAddr,
    pub pending: PendingLoad,
}

impl ObjectSlot {
    pub const EMPTY: ObjectSlot = ObjectSlot {
        id: SlotId::EMPTY,
        segment: SegmentAddr::NULL,
        pending: PendingLoad::NONE,
    };
}

/// The live slot table the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectContext {
    pub num_entries: u8,
    pub num_persistent_entries: u8,
    pub main_keep_slot: u8,
    pub sub_keep_slot: u8,
    pub slots: [ObjectSlot; OBJECT_SLOT_COUNT],
}

impl Default for ObjectContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectContext {
    pub fn new() -> Self {
        ObjectContext {
            num_entries: 0,
            num_persistent_entries: 0,
            main_keep_slot: 0,
            sub_keep_slot: 0,
            slots: [ObjectSlot::EMPTY; OBJECT_SLOT_COUNT],
        }
    }

    /// Valid entry count, clamped to the table capacity.
    pub fn len(&self) -> usize {
        usize::from(self.num_entries).min(OBJECT_SLOT_COUNT)
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= OBJECT_SLOT_COUNT
    }

    pub fn persistent_len(&self) -> usize {
        usize::from(self.num_persistent_entries).min(OBJECT_SLOT_COUNT)
    }

    /// Slots `[0, num_entries)`.
    pub fn entries(&self) -> &[ObjectSlot] {
        &self.slots[..self.len()]
    }

    /// First valid slot holding `object`, ignoring the temporary marker.
    pub fn find(&self, object: ObjectId) -> Option<usize> {
        self.entries()
            .iter()
            .position(|slot| slot.id.matches(object))
    }
}

/// A slot as kept in an owner's saved table: no pending-load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotEntry {
    pub id: SlotId,
    pub segment: SegmentAddr,
}

impl SlotEntry {
    pub const EMPTY: SlotEntry = SlotEntry {
        id: SlotId::EMPTY,
        segment: SegmentAddr::NULL,
    };
}

/// Saved slot table for a single owner. The persistent count is inherited
/// from the live table and not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSlots {
    pub num_entries: u8,
    pub entries: [SlotEntry; OBJECT_SLOT_COUNT],
}

impl Default for OwnerSlots {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl OwnerSlots {
    pub const EMPTY: OwnerSlots = OwnerSlots {
        num_entries: 0,
        entries: [SlotEntry::EMPTY; OBJECT_SLOT_COUNT],
    };

    /// Copies every slot of `live`, including the ones past `num_entries`.
    pub fn capture(live: &ObjectContext) -> Self {
        let mut saved = Self::EMPTY;
        saved.capture_from(live);
        saved
    }

    pub fn capture_from(&mut self, live: &ObjectContext) {
        for (entry, slot) in self.entries.iter_mut().zip(live.slots.iter()) {
            entry.id = slot.id;
            entry.segment = slot.segment;
        }
        self.num_entries = live.num_entries;
    }

    /// Writes ids, segments and the entry count into `live`. Pending loads,
    /// keep slots and the persistent count stay as they are.
    pub fn apply_to(&self, live: &mut ObjectContext) {
        for (slot, entry) in live.slots.iter_mut().zip(self.entries.iter()) {
            slot.id = entry.id;
            slot.segment = entry.segment;
        }
        live.num_entries = self.num_entries;
    }

    pub fn len(&self) -> usize {
        usize::from(self.num_entries).min(OBJECT_SLOT_COUNT)
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    pub fn valid_entries(&self) -> &[SlotEntry] {
        &self.entries[..self.len()]
    }
}

/// The live table as it was before the outermost owner context was entered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalSlots {
    saved: ObjectContext,
}

impl GlobalSlots {
    pub fn capture(&mut self, live: &ObjectContext) {
        self.saved.clone_from(live);
    }

    pub fn restore(&self, live: &mut ObjectContext) {
        live.clone_from(&self.saved);
    }

    pub fn saved(&self) -> &ObjectContext {
        &self.saved
    }
}
