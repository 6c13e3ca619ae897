//! Read models built from committed events.
//!
//! Every record read model is the aggregate itself, folded with the same
//! `apply` the command side uses, so list and detail queries see exactly
//! the state commands validate against. Projections are:
//! - rebuildable from the event log ([`rebuild`])
//! - tenant-isolated
//! - idempotent under at-least-once delivery (per-stream cursors)

pub mod records;

use std::collections::HashMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use nimbus_core::{Aggregate, AggregateId, TenantId};
use nimbus_events::EventEnvelope;

use crate::event_store::StoredEvent;
use crate::read_model::{InMemoryTenantStore, TenantStore};

pub use records::{
    CaseProjection, CompanyProjection, CustomFieldProjection, LeadProjection,
    OpportunityProjection, PersonProjection, PurchaseOrderProjection, SecurityGroupProjection,
    StreamEvent,
};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("{projection}: failed to deserialize event: {message}")]
    Deserialize {
        projection: &'static str,
        message: String,
    },

    #[error("{projection}: tenant isolation violation: {message}")]
    TenantIsolation {
        projection: &'static str,
        message: String,
    },

    #[error("{projection}: non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence {
        projection: &'static str,
        last: u64,
        found: u64,
    },
}

/// A consumer of committed envelopes that maintains a read model.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Envelopes of other aggregate types must be ignored.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Forget all state before a full replay.
    fn reset(&self);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Last applied sequence number per `(tenant, aggregate)` stream.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn last(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.get(&CursorKey { tenant_id, aggregate_id }).copied())
            .unwrap_or(0)
    }

    /// `Ok(false)` for a duplicate that must be skipped, `Ok(true)` for the
    /// next event of the stream, an error for a gap.
    pub fn admit(
        &self,
        projection: &'static str,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<bool, ProjectionError> {
        let last = self.last(tenant_id, aggregate_id);
        if seq == 0 || (seq > last + 1) {
            return Err(ProjectionError::NonMonotonicSequence {
                projection,
                last,
                found: seq,
            });
        }
        Ok(seq > last)
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut c) = self.inner.write() {
            c.insert(CursorKey { tenant_id, aggregate_id }, seq);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut c) = self.inner.write() {
            c.clear();
        }
    }
}

/// Keeps the latest state of every record of one aggregate type.
pub struct RecordProjection<A> {
    name: &'static str,
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    store: InMemoryTenantStore<AggregateId, A>,
    cursors: StreamCursors,
}

impl<A> std::fmt::Debug for RecordProjection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProjection")
            .field("name", &self.name)
            .field("aggregate_type", &self.aggregate_type)
            .finish_non_exhaustive()
    }
}

impl<A> RecordProjection<A>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned + StreamEvent,
{
    pub fn new(name: &'static str, aggregate_type: &'static str, make: fn(AggregateId) -> A) -> Self {
        Self {
            name,
            aggregate_type,
            make,
            store: InMemoryTenantStore::new(),
            cursors: StreamCursors::default(),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<A> {
        self.store.get(tenant_id, &id)
    }

    /// Unordered; callers sort for presentation.
    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }
}

impl<A> Projection for RecordProjection<A>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned + StreamEvent,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.admit(self.name, tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let event: A::Event = envelope.decode().map_err(|e| {
            ProjectionError::Deserialize {
                projection: self.name,
                message: e.to_string(),
            }
        })?;

        if event.tenant_id() != tenant_id {
            return Err(ProjectionError::TenantIsolation {
                projection: self.name,
                message: "event tenant_id does not match envelope tenant_id".to_string(),
            });
        }
        if event.stream_id() != aggregate_id {
            return Err(ProjectionError::TenantIsolation {
                projection: self.name,
                message: "event record id does not match envelope aggregate_id".to_string(),
            });
        }

        let mut record = self
            .store
            .get(tenant_id, &aggregate_id)
            .unwrap_or_else(|| (self.make)(aggregate_id));
        record.apply(&event);
        self.store.upsert(tenant_id, aggregate_id, record);
        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear_all();
        self.cursors.clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReplayReport {
    pub events: u64,
    pub projections: usize,
}

/// Resets every projection and replays the log into it.
pub fn rebuild(
    projections: &[&dyn Projection],
    events: &[StoredEvent],
) -> Result<ReplayReport, ProjectionError> {
    for p in projections {
        p.reset();
    }
    for stored in events {
        let envelope = stored.to_envelope();
        for p in projections {
            p.apply_envelope(&envelope)?;
        }
    }
    tracing::info!(
        events = events.len(),
        projections = projections.len(),
        "read models rebuilt"
    );
    Ok(ReplayReport {
        events: events.len() as u64,
        projections: projections.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_skip_duplicates_and_reject_gaps() {
        let c = StreamCursors::default();
        let (t, a) = (TenantId::new(), AggregateId::new());
        assert!(c.admit("test", t, a, 1).unwrap());
        c.advance(t, a, 1);
        assert!(!c.admit("test", t, a, 1).unwrap());
        assert!(c.admit("test", t, a, 2).unwrap());
        assert!(c.admit("test", t, a, 4).is_err());
        assert!(c.admit("test", t, a, 0).is_err());
    }
}
