use chrono::{DateTime, Utc};

/// A change event recorded by an aggregate.
///
/// Events are facts: immutable, versioned by schema, and only ever appended
/// to the list the aggregate keeps until it is drained.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "products.product.created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the change happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
