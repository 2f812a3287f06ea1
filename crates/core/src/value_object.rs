//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. Ledger
/// examples are a priced amount (`amount`, `currency`, `rate`) or an ancillary
/// fee: two fees with the same fields are the same fee.
///
/// To "modify" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
