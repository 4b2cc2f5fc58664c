//! Domain model contract.

/// An application-visible entity with a stable, unique string identity.
///
/// Equality is value equality: two models with the same identifier but
/// different field values are considered an update of one another.
pub trait Identifiable: Clone + PartialEq + Send + Sync + 'static {
    /// Returns the stable identifier of this entity.
    fn identifier(&self) -> &str;
}
