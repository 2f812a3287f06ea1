use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AggregateRoot, DomainError, DomainResult, ItemId, PositionId, TransactionId,
};

/// Generate a fresh item id: two random upper-case letters and six digits.
pub fn generate_item_id(rng: &mut impl Rng) -> DomainResult<ItemId> {
    let letters = [rng.gen_range(b'A'..=b'Z'), rng.gen_range(b'A'..=b'Z')];
    ItemId::generated(letters, rng.gen_range(0..1_000_000))
}

/// Descriptive fields of an item (free text as entered at intake).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemDetails {
    pub name: String,
    /// Manufacturer SKU / model number.
    pub item_number: String,
    pub item_type: String,
    pub brand: String,
    pub size: String,
    pub condition: String,
    pub color: String,
    pub remarks: String,
    pub mfg_date: String,
    pub photos: Vec<String>,
    pub accessories: Option<String>,
    /// Leaf of the toy taxonomy, if the item belongs to it.
    pub toy_character_id: Option<String>,
}

/// A physical unit of merchandise.
///
/// Items are never physically deleted; `deleted` hides them from every read
/// path. The active transaction is tracked by an explicit pointer maintained
/// by the write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub details: ItemDetails,
    pub deleted: bool,
    pub warehouse_position_id: Option<PositionId>,
    pub active_transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Item {
    pub fn new(id: ItemId, details: ItemDetails, now: DateTime<Utc>) -> DomainResult<Self> {
        if details.name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        Ok(Self {
            id,
            details,
            deleted: false,
            warehouse_position_id: None,
            active_transaction_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Copy the descriptive fields and storage slot under a new id.
    pub fn duplicate(&self, id: ItemId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            details: self.details.clone(),
            deleted: false,
            warehouse_position_id: self.warehouse_position_id,
            active_transaction_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn ensure_live(&self) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::not_found(format!("item {}", self.id)));
        }
        Ok(())
    }

    pub fn update_details(&mut self, details: ItemDetails, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_live()?;
        if details.name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        self.details = details;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_live()?;
        self.deleted = true;
        self.updated_at = now;
        Ok(())
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
