//! Event-sourced lifecycle of a custom field definition.
//!
//! Uniqueness of `(entity, code)` within a tenant needs the whole tenant's
//! catalogue and is checked by the registry before dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use nimbus_events::Event;

use crate::definition::{CustomFieldDefinition, CustomFieldId, SelectOption};

/// Aggregate root: CustomField.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    id: CustomFieldId,
    definition: Option<CustomFieldDefinition>,
    version: u64,
}

impl CustomField {
    pub fn empty(id: CustomFieldId) -> Self {
        Self {
            id,
            definition: None,
            version: 0,
        }
    }

    pub fn definition(&self) -> Option<&CustomFieldDefinition> {
        self.definition.as_ref()
    }
}

impl AggregateRoot for CustomField {
    type Id = CustomFieldId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineCustomField {
    pub definition: CustomFieldDefinition,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Label, options, flags and ordering can change; code, entity and type cannot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseCustomField {
    pub tenant_id: TenantId,
    pub field_id: CustomFieldId,
    pub label: Option<String>,
    pub options: Option<Vec<SelectOption>>,
    pub required: Option<bool>,
    pub active: Option<bool>,
    pub sort_order: Option<u32>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomFieldCommand {
    DefineCustomField(DefineCustomField),
    ReviseCustomField(ReviseCustomField),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDefined {
    pub definition: CustomFieldDefinition,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full revised definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldRevised {
    pub definition: CustomFieldDefinition,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomFieldEvent {
    CustomFieldDefined(CustomFieldDefined),
    CustomFieldRevised(CustomFieldRevised),
}

impl CustomFieldEvent {
    pub fn definition(&self) -> &CustomFieldDefinition {
        match self {
            CustomFieldEvent::CustomFieldDefined(e) => &e.definition,
            CustomFieldEvent::CustomFieldRevised(e) => &e.definition,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.definition().tenant_id
    }
}

impl Event for CustomFieldEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomFieldEvent::CustomFieldDefined(_) => "custom_fields.field.defined",
            CustomFieldEvent::CustomFieldRevised(_) => "custom_fields.field.revised",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomFieldEvent::CustomFieldDefined(e) => e.occurred_at,
            CustomFieldEvent::CustomFieldRevised(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CustomField {
    type Command = CustomFieldCommand;
    type Event = CustomFieldEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let definition = event.definition().clone();
        self.id = definition.id;
        self.definition = Some(definition);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomFieldCommand::DefineCustomField(cmd) => {
                if self.definition.is_some() {
                    return Err(DomainError::conflict("custom field already exists"));
                }
                Ok(vec![CustomFieldEvent::CustomFieldDefined(CustomFieldDefined {
                    definition: cmd.definition.clone(),
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CustomFieldCommand::ReviseCustomField(cmd) => {
                let current = self.definition.as_ref().ok_or_else(|| DomainError::not_found("custom field"))?;
                if current.tenant_id != cmd.tenant_id {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                if current.id != cmd.field_id {
                    return Err(DomainError::invariant("field_id mismatch"));
                }

                let mut revised = current.clone();
                if let Some(label) = &cmd.label {
                    let label = label.trim();
                    if label.is_empty() {
                        return Err(DomainError::validation("label cannot be empty"));
                    }
                    revised.label = label.to_string();
                }
                if let Some(options) = &cmd.options {
                    revised = revised.with_options(options.clone())?;
                }
                if let Some(required) = cmd.required {
                    revised.required = required;
                }
                if let Some(active) = cmd.active {
                    revised.active = active;
                }
                if let Some(sort_order) = cmd.sort_order {
                    revised.sort_order = sort_order;
                }

                Ok(vec![CustomFieldEvent::CustomFieldRevised(CustomFieldRevised {
                    definition: revised,
                    actor: cmd.actor,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CustomFieldEntity, CustomFieldType};

    fn defined() -> CustomField {
        let def = CustomFieldDefinition::new(
            TenantId::new(),
            CustomFieldEntity::Opportunity,
            "stage",
            "Stage",
            CustomFieldType::Select,
            Utc::now(),
        )
        .unwrap()
        .with_options(vec![SelectOption::new("open", "Open")])
        .unwrap();
        let mut field = CustomField::empty(def.id);
        let events = field
            .handle(&CustomFieldCommand::DefineCustomField(DefineCustomField {
                definition: def,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        field.apply(&events[0]);
        field
    }

    fn revise(field: &CustomField) -> ReviseCustomField {
        let def = field.definition().unwrap();
        ReviseCustomField {
            tenant_id: def.tenant_id,
            field_id: def.id,
            label: None,
            options: None,
            required: None,
            active: None,
            sort_order: None,
            actor: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn revise_replaces_options_and_flags() {
        let mut field = defined();
        let cmd = ReviseCustomField {
            label: Some(" Sales stage ".into()),
            options: Some(vec![SelectOption::new("open", "Open"), SelectOption::new("won", "Won")]),
            active: Some(false),
            ..revise(&field)
        };
        let events = field.handle(&CustomFieldCommand::ReviseCustomField(cmd)).unwrap();
        field.apply(&events[0]);
        let def = field.definition().unwrap();
        assert_eq!(def.label, "Sales stage");
        assert_eq!(def.options.len(), 2);
        assert!(!def.active);
        assert_eq!(field.version(), 2);
    }

    #[test]
    fn revise_rejects_blank_label_and_foreign_tenant() {
        let field = defined();
        let blank = ReviseCustomField {
            label: Some("  ".into()),
            ..revise(&field)
        };
        assert!(field.handle(&CustomFieldCommand::ReviseCustomField(blank)).is_err());

        let foreign = ReviseCustomField {
            tenant_id: TenantId::new(),
            ..revise(&field)
        };
        assert!(matches!(
            field.handle(&CustomFieldCommand::ReviseCustomField(foreign)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn define_twice_conflicts() {
        let field = defined();
        let err = field
            .handle(&CustomFieldCommand::DefineCustomField(DefineCustomField {
                definition: field.definition().unwrap().clone(),
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
