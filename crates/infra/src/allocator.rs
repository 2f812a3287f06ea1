//! Warehouse capacity allocator.
//!
//! Moves an item between positions while keeping `0 <= used <= capacity`.
//! Every call runs inside the caller's unit of work, next to the write of the
//! item's `warehouse_position_id`, so the pointer and the counters commit or
//! roll back together.

use tracing::{debug, warn};

use stockledger_core::{ItemId, PositionId};

use crate::error::LedgerResult;
use crate::store::LedgerTx;

/// What a move actually did to the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionMove {
    pub released: Option<PositionId>,
    pub occupied: Option<PositionId>,
}

impl PositionMove {
    pub fn touched_positions(&self) -> bool {
        self.released.is_some() || self.occupied.is_some()
    }
}

/// Move `item_id` from `from` to `to` (either may be absent).
///
/// The target is claimed first with a compare-and-increment, so a full target
/// fails with `CapacityExceeded` before anything else changes. Releasing a
/// source that is already at zero is logged and skipped.
pub async fn move_position(
    tx: &mut dyn LedgerTx,
    item_id: &ItemId,
    from: Option<PositionId>,
    to: Option<PositionId>,
) -> LedgerResult<PositionMove> {
    if from == to {
        return Ok(PositionMove::default());
    }

    let mut moved = PositionMove::default();

    if let Some(target) = to {
        let position = tx.increment_position_used(target).await?;
        debug!(
            item_id = %item_id,
            position = position.name(),
            used = position.used(),
            capacity = position.capacity(),
            "position occupied"
        );
        moved.occupied = Some(target);
    }

    if let Some(source) = from {
        match tx.decrement_position_used(source).await? {
            Some(position) => {
                debug!(item_id = %item_id, position = position.name(), used = position.used(), "position released");
                moved.released = Some(source);
            }
            None => {
                warn!(item_id = %item_id, position_id = %source, "released position already had zero usage");
            }
        }
    }

    Ok(moved)
}
