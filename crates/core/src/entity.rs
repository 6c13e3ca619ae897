//! Entity trait: records with identity that are not event-sourced
//! (custom field definitions, ACL rows).

use crate::id::TenantId;

pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Team that owns the row.
    fn tenant_id(&self) -> TenantId;
}
