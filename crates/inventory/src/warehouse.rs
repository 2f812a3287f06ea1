use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateRoot, DomainError, DomainResult, PositionId, WarehouseId};

/// A named container of positions. Carries no rules of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Warehouse {
    pub fn new(id: WarehouseId, name: impl Into<String>, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            created_at: now,
        })
    }
}

/// A capacity-bounded storage slot inside a warehouse.
///
/// `0 <= used <= capacity` always holds: the counter is private and only moves
/// through [`occupy`](Self::occupy) / [`release`](Self::release).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehousePosition {
    id: PositionId,
    warehouse_id: WarehouseId,
    name: String,
    capacity: u32,
    used: u32,
    version: u64,
}

impl WarehousePosition {
    pub fn new(
        id: PositionId,
        warehouse_id: WarehouseId,
        name: impl Into<String>,
        capacity: u32,
    ) -> DomainResult<Self> {
        Self::restore(id, warehouse_id, name, capacity, 0, 0)
    }

    /// Rebuild a position from storage, re-checking its bounds.
    pub fn restore(
        id: PositionId,
        warehouse_id: WarehouseId,
        name: impl Into<String>,
        capacity: u32,
        used: u32,
        version: u64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("position name cannot be empty"));
        }
        if capacity == 0 {
            return Err(DomainError::validation("position capacity must be positive"));
        }
        if used > capacity {
            return Err(DomainError::invariant(format!(
                "position '{name}' uses {used} of {capacity} slots"
            )));
        }
        Ok(Self {
            id,
            warehouse_id,
            name,
            capacity,
            used,
            version,
        })
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn is_full(&self) -> bool {
        self.used >= self.capacity
    }

    /// Take one slot.
    pub fn occupy(&mut self) -> DomainResult<()> {
        if self.is_full() {
            return Err(DomainError::capacity_exceeded(self.name.clone()));
        }
        self.used += 1;
        Ok(())
    }

    /// Give back one slot.
    pub fn release(&mut self) -> DomainResult<()> {
        if self.used == 0 {
            return Err(DomainError::validation(format!(
                "position '{}' is already empty",
                self.name
            )));
        }
        self.used -= 1;
        Ok(())
    }

    /// Record that the store persisted this position once more.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

impl AggregateRoot for WarehousePosition {
    type Id = PositionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn position(capacity: u32) -> WarehousePosition {
        WarehousePosition::new(PositionId::new(), WarehouseId::new(), "A-01", capacity).unwrap()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = WarehousePosition::new(PositionId::new(), WarehouseId::new(), "A-01", 0);
        assert!(matches!(err, Err(DomainError::Validation(_))));
    }

    #[test]
    fn restore_rejects_overbooked_rows() {
        let err = WarehousePosition::restore(PositionId::new(), WarehouseId::new(), "A-01", 2, 3, 0);
        assert!(matches!(err, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn full_position_names_itself_in_the_error() {
        let mut p = position(1);
        p.occupy().unwrap();
        let err = p.occupy().unwrap_err();
        assert_eq!(err, DomainError::capacity_exceeded("A-01"));
        assert_eq!(p.used(), 1);
    }

    #[test]
    fn empty_position_cannot_release() {
        let mut p = position(3);
        assert!(p.release().is_err());
        assert_eq!(p.used(), 0);
    }

    proptest! {
        #[test]
        fn counter_stays_within_bounds(capacity in 1u32..20, ops in prop::collection::vec(prop::bool::ANY, 0..100)) {
            let mut p = position(capacity);
            for add in ops {
                let _ = if add { p.occupy() } else { p.release() };
                prop_assert!(p.used() <= p.capacity());
            }
        }
    }
}
