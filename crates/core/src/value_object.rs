//! Value objects: compared by value, no identity.

/// Marker for immutable values such as [`crate::Money`] or a hierarchy path.
///
/// To "change" a value object build a new one; two instances with the same
/// attributes are interchangeable.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
