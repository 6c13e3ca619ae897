//! Per-tenant custom fields: definitions and typed values.
//!
//! Records keep their fixed schema small; everything a team wants to track
//! beyond it (deal amount, win probability, close date...) is declared here
//! and stored as a code → value map on the record.

pub mod definition;
pub mod field;
pub mod value;

pub use definition::{
    CustomFieldDefinition, CustomFieldEntity, CustomFieldId, CustomFieldType, SelectOption,
};
pub use field::{
    CustomField, CustomFieldCommand, CustomFieldDefined, CustomFieldEvent, CustomFieldRevised,
    DefineCustomField, ReviseCustomField,
};
pub use value::{CustomFieldValue, CustomFieldValues};
