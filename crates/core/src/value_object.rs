//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two quantities of
/// `3` are the same quantity, while two materials that happen to share a name are
/// still distinct entities.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Unit(String);
///
/// impl ValueObject for Unit {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
