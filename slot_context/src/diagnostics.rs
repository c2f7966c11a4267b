use std::fmt::Write as _;

use serde::Serialize;

use crate::store::OwnerId;
use crate::table::{ObjectContext, OwnerSlots};

/// Counters the context manager keeps for the lifetime of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub enters: u64,
    pub exits: u64,
    pub overflows: u64,
    pub overflow_unwinds: u64,
    pub underflows: u64,
    pub invalid_owners: u64,
    pub host_mismatches: u64,
    pub max_depth: usize,
    pub lookups: u64,
    pub auto_loads: u64,
    pub full_table_misses: u64,
    pub immediate_binds: u64,
    pub propagations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDump {
    pub index: usize,
    pub object: u16,
    pub temporary: bool,
    pub segment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_vrom: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDump {
    pub num_entries: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_persistent_entries: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_keep_slot: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_keep_slot: Option<u8>,
    pub slots: Vec<SlotDump>,
}

impl TableDump {
    /// Valid entries of the live table, plus its bookkeeping fields.
    pub fn from_live(ctx: &ObjectContext) -> Self {
        let slots = ctx
            .entries()
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotDump {
                index,
                object: slot.id.object.0,
                temporary: slot.id.temporary,
                segment: slot.segment.to_string(),
                pending_vrom: slot
                    .pending
                    .is_pending()
                    .then(|| format!("{:08X}", slot.pending.vrom_addr)),
            })
            .collect();
        TableDump {
            num_entries: ctx.num_entries,
            num_persistent_entries: Some(ctx.num_persistent_entries),
            main_keep_slot: Some(ctx.main_keep_slot),
            sub_keep_slot: Some(ctx.sub_keep_slot),
            slots,
        }
    }

    pub fn from_owner(table: &OwnerSlots) -> Self {
        let slots = table
            .valid_entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| SlotDump {
                index,
                object: entry.id.object.0,
                temporary: entry.id.temporary,
                segment: entry.segment.to_string(),
                pending_vrom: None,
            })
            .collect();
        TableDump {
            num_entries: table.num_entries,
            num_persistent_entries: None,
            main_keep_slot: None,
            sub_keep_slot: None,
            slots,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StackFrameReport {
    pub owner: u16,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerTableReport {
    pub owner: u16,
    pub label: String,
    pub table: TableDump,
}

/// Serializable view of the manager, for run reports.
#[derive(Debug, Clone, Serialize)]
pub struct ContextReport {
    pub depth: usize,
    pub capacity: usize,
    pub pending_overflow: usize,
    pub stack: Vec<StackFrameReport>,
    pub stats: ContextStats,
    pub global: TableDump,
    pub owners: Vec<OwnerTableReport>,
}

/// Text dump of the whole live table, stale slots included.
pub fn describe_table(ctx: &ObjectContext) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "object context ({} entries, {} persistent)",
        ctx.num_entries, ctx.num_persistent_entries
    );
    for slot in &ctx.slots {
        match slot.id.to_raw() {
            Some(raw) => {
                let _ = writeln!(out, "  id {:04X}, seg {}", raw as u16, slot.segment);
            }
            None => {
                let _ = writeln!(
                    out,
                    "  id {} (unencodable), seg {}",
                    slot.id.object, slot.segment
                );
            }
        }
    }
    out
}

pub(crate) fn owner_event(verb: &str, owner: OwnerId, depth: usize) -> String {
    format!("slots.{verb} {owner} depth {depth}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ObjectId, SegmentAddr, SlotId, OBJECT_SLOT_COUNT};

    #[test]
    fn describe_lists_every_slot() {
        let mut ctx = ObjectContext::new();
        ctx.num_entries = 1;
        ctx.num_persistent_entries = 1;
        ctx.slots[0].id = SlotId::temporary(ObjectId(0x0001));
        ctx.slots[0].segment = SegmentAddr(0x8040_0000);

        let text = describe_table(&ctx);
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("object context (1 entries, 1 persistent)")
        );
        assert_eq!(lines.next(), Some("  id FFFF, seg 80400000"));
        assert_eq!(text.lines().count(), OBJECT_SLOT_COUNT + 1);
    }

    #[test]
    fn describe_flags_ids_past_the_signed_range() {
        let mut ctx = ObjectContext::new();
        ctx.slots[0].id = SlotId::new(ObjectId(0x8001));
        let text = describe_table(&ctx);
        assert_eq!(
            text.lines().nth(1),
            Some("  id 0x8001 (unencodable), seg 00000000")
        );
    }

    #[test]
    fn live_dump_only_reports_valid_slots() {
        let mut ctx = ObjectContext::new();
        ctx.num_entries = 2;
        ctx.slots[1].pending.vrom_addr = 0x0123_4567;
        ctx.slots[5].id = SlotId::new(ObjectId(9));

        let dump = TableDump::from_live(&ctx);
        assert_eq!(dump.slots.len(), 2);
        assert_eq!(dump.slots[1].pending_vrom.as_deref(), Some("01234567"));
        assert_eq!(dump.slots[0].pending_vrom, None);
    }
}
