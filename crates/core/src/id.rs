//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a transaction record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

/// Identifier of a warehouse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(Uuid);

/// Identifier of a capacity-bounded warehouse position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(Uuid);

/// Identifier of a stock adjustment audit record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(TransactionId, "TransactionId");
impl_uuid_newtype!(WarehouseId, "WarehouseId");
impl_uuid_newtype!(PositionId, "PositionId");
impl_uuid_newtype!(AdjustmentId, "AdjustmentId");

/// Identifier of a physical item.
///
/// Item ids are human-facing labels printed on stock tags. Callers may bring
/// their own label (any non-empty text without `/`); ids minted by the ledger
/// follow the `AA000000` pattern (two upper-case ASCII letters, six digits).
/// They are immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Length of a generated item id.
    pub const GENERATED_LEN: usize = 8;

    /// Upper bound for caller-chosen labels.
    pub const MAX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build an id from the generator's letters and number.
    pub fn generated(letters: [u8; 2], number: u32) -> Result<Self, DomainError> {
        let id = Self(format!(
            "{}{}{:06}",
            char::from(letters[0]),
            char::from(letters[1]),
            number
        ));
        if !id.has_generated_format() {
            return Err(DomainError::invalid_id(format!(
                "ItemId: generated value '{id}' is not two letters and six digits"
            )));
        }
        Ok(id)
    }

    /// Whether the id follows the `AA000000` pattern used for minted ids.
    pub fn has_generated_format(&self) -> bool {
        let bytes = self.0.as_bytes();
        bytes.len() == Self::GENERATED_LEN
            && bytes[..2].iter().all(u8::is_ascii_uppercase)
            && bytes[2..].iter().all(u8::is_ascii_digit)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::invalid_id("ItemId: empty"));
        }
        if s.chars().count() > Self::MAX_LEN {
            return Err(DomainError::invalid_id(format!(
                "ItemId: longer than {} characters",
                Self::MAX_LEN
            )));
        }
        if s.contains('/') || s.chars().any(char::is_control) {
            return Err(DomainError::invalid_id(format!(
                "ItemId: '{s}' contains '/' or control characters"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}
