use chrono::{DateTime, Utc};

/// A fact recorded by a CRM aggregate.
///
/// Event types are dotted names scoped by module
/// (`pipeline.lead.created`, `security.group.moved`); the name and schema
/// version are stored next to the JSON payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time of the change (also used for audit columns).
    fn occurred_at(&self) -> DateTime<Utc>;
}
