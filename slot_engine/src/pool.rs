use std::collections::BTreeMap;

use serde::Serialize;
use slot_context::{ObjectId, ObjectPool, SegmentAddr};

/// Start of the address range global objects are placed in.
pub const POOL_BASE: u32 = 0x8040_0000;
const SEGMENT_STRIDE: u32 = 0x1000;

/// Stand-in for the shared global object pool: every object is resident at a
/// fixed address, and fetches are counted per object.
#[derive(Debug, Default, Clone)]
pub struct GlobalObjectPool {
    resident: BTreeMap<ObjectId, SegmentAddr>,
    fetches: BTreeMap<ObjectId, u64>,
}

impl GlobalObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment_for(object: ObjectId) -> SegmentAddr {
        SegmentAddr(POOL_BASE + u32::from(object.0) * SEGMENT_STRIDE)
    }

    #[allow(dead_code)]
    pub fn fetch_count(&self, object: ObjectId) -> u64 {
        self.fetches.get(&object).copied().unwrap_or_default()
    }

    pub fn total_fetches(&self) -> u64 {
        self.fetches.values().sum()
    }

    pub fn report(&self) -> PoolReport {
        PoolReport {
            resident: self.resident.len(),
            total_fetches: self.total_fetches(),
            fetches: self
                .fetches
                .iter()
                .map(|(object, count)| (object.to_string(), *count))
                .collect(),
        }
    }
}

impl ObjectPool for GlobalObjectPool {
    fn fetch(&mut self, object: ObjectId) -> SegmentAddr {
        *self.fetches.entry(object).or_default() += 1;
        *self
            .resident
            .entry(object)
            .or_insert_with(|| Self::segment_for(object))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub resident: usize,
    pub total_fetches: u64,
    pub fetches: BTreeMap<String, u64>,
}
