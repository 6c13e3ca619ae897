//! Aggregate type names; part of the stored event format.

pub const COMPANY: &str = "contacts.company";
pub const PERSON: &str = "contacts.person";
pub const LEAD: &str = "pipeline.lead";
pub const OPPORTUNITY: &str = "pipeline.opportunity";
pub const PURCHASE_ORDER: &str = "purchasing.order";
pub const SUPPORT_CASE: &str = "support.case";
pub const SECURITY_GROUP: &str = "security.group";
pub const CUSTOM_FIELD: &str = "custom_fields.field";
