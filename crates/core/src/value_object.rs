//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity; two values with the same attributes are
/// equal. They are immutable: "changing" one means replacing it.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Dimensions { width: Measure, height: Measure, depth: Measure }
///
/// impl ValueObject for Dimensions {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
