use serde::{Deserialize, Serialize};
use uuid::Uuid;

use catalog_core::AggregateId;

/// Envelope around a committed change event.
///
/// This is the unit published on the bus. `aggregate_version` is the version
/// the aggregate reached in the transaction that produced the event, so every
/// event of one change set shares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    aggregate_id: AggregateId,
    aggregate_type: String,
    aggregate_version: u64,

    event_type: String,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        aggregate_version: u64,
        event_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            aggregate_version,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_version(&self) -> u64 {
        self.aggregate_version
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Convert the payload, keeping the metadata.
    pub fn try_map<T, Err>(self, f: impl FnOnce(E) -> Result<T, Err>) -> Result<EventEnvelope<T>, Err> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            aggregate_version: self.aggregate_version,
            event_type: self.event_type,
            payload: f(self.payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_map_keeps_metadata() {
        let id = AggregateId::new();
        let env = EventEnvelope::new(Uuid::now_v7(), id, "products.product", 3, "products.product.created", 41_u32);
        let mapped = env.clone().try_map(|n| Ok::<_, ()>(n + 1)).unwrap();

        assert_eq!(mapped.event_id(), env.event_id());
        assert_eq!(mapped.aggregate_id(), id);
        assert_eq!(mapped.aggregate_version(), 3);
        assert_eq!(mapped.event_type(), "products.product.created");
        assert_eq!(*mapped.payload(), 42);
    }
}
