use thiserror::Error;

use crate::stack::HostId;
use crate::store::OwnerId;
use crate::table::OBJECT_SLOT_COUNT;

/// Bookkeeping failures of the owner context stack. None of them are fatal:
/// the hook-facing entry points log them and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("slot context stack full ({capacity} levels); {owner} shares its parent's table")]
    StackOverflow { owner: OwnerId, capacity: usize },
    #[error("slot context exit without a matching enter")]
    StackUnderflow,
    #[error("owner {owner} outside the {owner_count} known owner ids")]
    InvalidOwner { owner: OwnerId, owner_count: usize },
    #[error("slot context opened on {expected} but called on {found}")]
    HostMismatch { expected: HostId, found: HostId },
    #[error("slot {slot} outside the {OBJECT_SLOT_COUNT}-entry object table")]
    SlotOutOfRange { slot: usize },
}
