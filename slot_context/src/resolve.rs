use crate::error::ContextError;
use crate::table::{ObjectContext, ObjectId, SegmentAddr, SlotId, OBJECT_SLOT_NONE};

/// Source of already-resident object segments.
pub trait ObjectPool {
    fn fetch(&mut self, object: ObjectId) -> SegmentAddr;
}

impl<F> ObjectPool for F
where
    F: FnMut(ObjectId) -> SegmentAddr,
{
    fn fetch(&mut self, object: ObjectId) -> SegmentAddr {
        self(object)
    }
}

/// Result of looking an object up in the live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResolution {
    /// Already present in the table.
    Found(usize),
    /// Missing, so a free slot was claimed and filled from the pool.
    Loaded(usize),
    /// Missing and the table has no free slot.
    Full,
}

impl SlotResolution {
    pub fn index(self) -> Option<usize> {
        match self {
            SlotResolution::Found(index) | SlotResolution::Loaded(index) => Some(index),
            SlotResolution::Full => None,
        }
    }

    /// Engine-side slot index, [`OBJECT_SLOT_NONE`] when unresolved.
    pub fn to_raw(self) -> i32 {
        self.index()
            .map(|index| index as i32)
            .unwrap_or(OBJECT_SLOT_NONE)
    }
}

/// Finds `object` in `[0, num_entries)`; when absent and there is room,
/// appends it using a segment fetched from `pool`.
pub fn resolve_slot<P>(ctx: &mut ObjectContext, object: ObjectId, pool: &mut P) -> SlotResolution
where
    P: ObjectPool + ?Sized,
{
    if let Some(index) = ctx.find(object) {
        return SlotResolution::Found(index);
    }
    if ctx.is_full() {
        return SlotResolution::Full;
    }

    let index = ctx.len();
    let slot = &mut ctx.slots[index];
    slot.id = SlotId::new(object);
    slot.segment = pool.fetch(object);
    ctx.num_entries = (index + 1) as u8;
    SlotResolution::Loaded(index)
}

/// Binds `slot` to `object` right away instead of queueing a deferred load.
pub fn bind_slot_immediate<P>(
    ctx: &mut ObjectContext,
    slot: usize,
    object: ObjectId,
    pool: &mut P,
) -> Result<SegmentAddr, ContextError>
where
    P: ObjectPool + ?Sized,
{
    let Some(entry) = ctx.slots.get_mut(slot) else {
        return Err(ContextError::SlotOutOfRange { slot });
    };
    let segment = pool.fetch(object);
    entry.id = SlotId::new(object);
    entry.pending.vrom_addr = 0;
    entry.segment = segment;
    Ok(segment)
}
