//! Bus used by the command path.
//!
//! Read models are updated inside `publish`, before the command returns, so
//! a client that creates a record can list it on the very next request.
//! After the projections have run the envelope is fanned out to ordinary
//! subscribers (audit listeners, tests).

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use nimbus_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

use crate::projections::{Projection, ProjectionError};

#[derive(Debug, Error)]
pub enum ProjectingBusError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("subscriber fan-out failed: {0}")]
    FanOut(String),
}

pub struct ProjectingBus {
    projections: Vec<Arc<dyn Projection>>,
    fanout: InMemoryEventBus<EventEnvelope<JsonValue>>,
}

impl std::fmt::Debug for ProjectingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.projections.iter().map(|p| p.name()).collect();
        f.debug_struct("ProjectingBus")
            .field("projections", &names)
            .finish_non_exhaustive()
    }
}

impl ProjectingBus {
    pub fn new(projections: Vec<Arc<dyn Projection>>) -> Self {
        Self {
            projections,
            fanout: InMemoryEventBus::new(),
        }
    }

    pub fn projections(&self) -> &[Arc<dyn Projection>] {
        &self.projections
    }
}

impl EventBus<EventEnvelope<JsonValue>> for ProjectingBus {
    type Error = ProjectingBusError;

    fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        for projection in &self.projections {
            if let Err(err) = projection.apply_envelope(&message) {
                tracing::error!(
                    projection = projection.name(),
                    aggregate_id = %message.aggregate_id(),
                    sequence_number = message.sequence_number(),
                    error = %err,
                    "projection rejected committed event"
                );
                return Err(err.into());
            }
        }
        self.fanout
            .publish(message)
            .map_err(|e| ProjectingBusError::FanOut(format!("{e:?}")))
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.fanout.subscribe()
    }
}
