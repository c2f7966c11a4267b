use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::{ObjectContext, OwnerSlots, SlotEntry, OBJECT_SLOT_COUNT};

/// Actor type that can own a private slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u16);

impl OwnerId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Saved slot tables for every owner id, allocated once up front.
#[derive(Debug, Clone)]
pub struct OwnerSlotStore {
    tables: Box<[OwnerSlots]>,
}

impl OwnerSlotStore {
    pub fn new(owner_count: usize) -> Self {
        Self {
            tables: vec![OwnerSlots::EMPTY; owner_count].into_boxed_slice(),
        }
    }

    pub fn owner_count(&self) -> usize {
        self.tables.len()
    }

    pub fn contains(&self, owner: OwnerId) -> bool {
        owner.index() < self.tables.len()
    }

    pub fn get(&self, owner: OwnerId) -> Option<&OwnerSlots> {
        self.tables.get(owner.index())
    }

    /// Copy of the owner's saved table, `None` for ids outside the store.
    pub fn load(&self, owner: OwnerId) -> Option<OwnerSlots> {
        self.get(owner).cloned()
    }

    /// Replaces the owner's saved table. Returns `false` (and stores nothing)
    /// for ids outside the store.
    pub fn save(&mut self, owner: OwnerId, table: OwnerSlots) -> bool {
        match self.tables.get_mut(owner.index()) {
            Some(slot) => {
                *slot = table;
                true
            }
            None => false,
        }
    }

    /// Saves the live table into the owner's store.
    pub fn save_from(&mut self, owner: OwnerId, live: &ObjectContext) -> bool {
        match self.tables.get_mut(owner.index()) {
            Some(saved) => {
                saved.capture_from(live);
                true
            }
            None => false,
        }
    }

    /// Loads the owner's saved table into the live table.
    pub fn load_into(&self, owner: OwnerId, live: &mut ObjectContext) -> bool {
        match self.tables.get(owner.index()) {
            Some(saved) => {
                saved.apply_to(live);
                true
            }
            None => false,
        }
    }

    /// Overwrites the persistent prefix of every owner's table with the one in
    /// `source` and resets each entry count to the prefix length. Returns the
    /// prefix length that was copied.
    pub fn propagate_persistent(&mut self, source: &ObjectContext) -> usize {
        let count = source.persistent_len();
        let prefix: Vec<SlotEntry> = source.slots[..count]
            .iter()
            .map(|slot| SlotEntry {
                id: slot.id,
                segment: slot.segment,
            })
            .collect();
        for table in self.tables.iter_mut() {
            table.entries[..count].copy_from_slice(&prefix);
            table.num_entries = count as u8;
        }
        count
    }

    /// Owners whose saved table holds more than the persistent prefix.
    pub fn iter_grown(&self, persistent: usize) -> impl Iterator<Item = (OwnerId, &OwnerSlots)> {
        let persistent = persistent.min(OBJECT_SLOT_COUNT);
        self.tables
            .iter()
            .enumerate()
            .filter(move |(_, table)| table.len() > persistent)
            .map(|(index, table)| (OwnerId(index as u16), table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ObjectId, SegmentAddr, SlotId};

    fn table_with(ids: &[u16]) -> OwnerSlots {
        let mut table = OwnerSlots::EMPTY;
        for (i, id) in ids.iter().enumerate() {
            table.entries[i] = SlotEntry {
                id: SlotId::new(ObjectId(*id)),
                segment: SegmentAddr(0x8000_0000 | u32::from(*id)),
            };
        }
        table.num_entries = ids.len() as u8;
        table
    }

    #[test]
    fn save_then_load_returns_full_table() {
        let mut store = OwnerSlotStore::new(8);
        let mut table = table_with(&[1, 2, 3]);
        table.entries[30].id = SlotId::new(ObjectId(0x77));
        assert!(store.save(OwnerId(5), table.clone()));
        assert_eq!(store.load(OwnerId(5)), Some(table));
    }

    #[test]
    fn out_of_range_owner_is_a_no_op() {
        let mut store = OwnerSlotStore::new(4);
        assert!(!store.save(OwnerId(4), table_with(&[9])));
        assert_eq!(store.load(OwnerId(4)), None);

        let mut live = ObjectContext::new();
        live.num_entries = 2;
        assert!(!store.load_into(OwnerId(100), &mut live));
        assert_eq!(live.num_entries, 2);
    }

    #[test]
    fn propagate_resets_every_owner_to_the_prefix() {
        let mut store = OwnerSlotStore::new(3);
        store.save(OwnerId(1), table_with(&[7, 8, 9, 10, 11]));

        let mut source = ObjectContext::new();
        source.num_entries = 2;
        source.num_persistent_entries = 2;
        source.slots[0].id = SlotId::new(ObjectId(1));
        source.slots[0].segment = SegmentAddr(0x1000);
        source.slots[1].id = SlotId::new(ObjectId(2));
        source.slots[1].segment = SegmentAddr(0x2000);

        assert_eq!(store.propagate_persistent(&source), 2);
        for owner in 0..3 {
            let table = store.get(OwnerId(owner)).expect("owner table");
            assert_eq!(table.num_entries, 2);
            assert_eq!(table.entries[0].segment, SegmentAddr(0x1000));
            assert_eq!(table.entries[1].id.object, ObjectId(2));
        }
        // stale entries past the prefix are left alone
        let owner_one = store.get(OwnerId(1)).expect("owner one");
        assert_eq!(owner_one.entries[2].id.object, ObjectId(9));
        assert_eq!(store.iter_grown(2).count(), 0);
    }
}
