use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use nimbus_core::{AggregateId, TenantId};

/// Identifies one record stream: the team, the record and its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRef {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    /// Stream kind (`pipeline.lead`, `purchasing.order`, ...).
    pub aggregate_type: String,
}

/// A committed event as handed to projections and subscribers.
///
/// `sequence_number` is the 1-based position inside the stream. Projections
/// keep the last one they applied per stream and drop anything at or below
/// it, which makes redelivery harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    stream: StreamRef,
    sequence_number: u64,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        stream: StreamRef,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            stream,
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream(&self) -> &StreamRef {
        &self.stream
    }

    pub fn tenant_id(&self) -> TenantId {
        self.stream.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.stream.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.stream.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// True when a consumer whose cursor is `applied` has not seen this event yet.
    pub fn is_new_for(&self, applied: Option<u64>) -> bool {
        applied.is_none_or(|last| self.sequence_number > last)
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Decodes the JSON payload into the module's typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Renamed {
        name: String,
    }

    fn envelope(seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            StreamRef {
                tenant_id: TenantId::new(),
                aggregate_id: AggregateId::new(),
                aggregate_type: "contacts.company".into(),
            },
            seq,
            "contacts.company.renamed",
            Utc::now(),
            json!({ "name": "Initech" }),
        )
    }

    #[test]
    fn cursor_admits_only_later_positions() {
        let env = envelope(3);
        assert!(env.is_new_for(None));
        assert!(env.is_new_for(Some(2)));
        assert!(!env.is_new_for(Some(3)));
        assert!(!env.is_new_for(Some(7)));
    }

    #[test]
    fn decodes_typed_payload() {
        let env = envelope(1);
        let decoded: Renamed = env.decode().unwrap();
        assert_eq!(decoded, Renamed { name: "Initech".into() });
        assert!(env.decode::<Vec<u8>>().is_err());
    }
}
