//! Append-only event store boundary.
//!
//! Every CRM record (company, lead, purchase order, security group...) is a
//! stream of events keyed by `(tenant_id, aggregate_id)`. Read models are
//! derived from these streams and can be rebuilt from them at any time.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
