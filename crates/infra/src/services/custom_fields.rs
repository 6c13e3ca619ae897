//! Per-tenant custom field registry.

use std::collections::BTreeMap;

use serde::Deserialize;

use nimbus_custom_fields::{
    CustomField, CustomFieldCommand, CustomFieldDefinition, CustomFieldEntity, CustomFieldId,
    CustomFieldType, CustomFieldValue, CustomFieldValues, DefineCustomField, ReviseCustomField,
    SelectOption,
};
use nimbus_core::TenantId;

use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCustomField {
    pub entity: CustomFieldEntity,
    pub code: String,
    pub label: String,
    pub field_type: CustomFieldType,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sort_order: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomFieldChanges {
    pub label: Option<String>,
    pub options: Option<Vec<SelectOption>>,
    pub required: Option<bool>,
    pub active: Option<bool>,
    pub sort_order: Option<u32>,
}

pub struct CustomFieldService<'a> {
    crm: &'a Crm,
}

impl<'a> CustomFieldService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub fn define(
        &self,
        ctx: &CommandContext,
        input: NewCustomField,
    ) -> Result<CustomFieldDefinition, ServiceError> {
        let mut definition = CustomFieldDefinition::new(
            ctx.tenant_id,
            input.entity,
            input.code.trim(),
            input.label,
            input.field_type,
            ctx.now,
        )?
        .required(input.required)
        .sort_order(input.sort_order);
        if input.field_type.has_options() || !input.options.is_empty() {
            definition = definition.with_options(input.options)?;
        }
        self.register(ctx, definition)
    }

    /// Stores a fully built definition, enforcing `(entity, code)` uniqueness.
    pub fn register(
        &self,
        ctx: &CommandContext,
        definition: CustomFieldDefinition,
    ) -> Result<CustomFieldDefinition, ServiceError> {
        if self.find(ctx.tenant_id, definition.entity, &definition.code).is_some() {
            return Err(ServiceError::conflict(format!(
                "custom field '{}' already exists for {}",
                definition.code,
                definition.entity.as_str()
            )));
        }
        let id = definition.id;
        let code = definition.code.clone();
        self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            id.0,
            streams::CUSTOM_FIELD,
            CustomFieldCommand::DefineCustomField(DefineCustomField {
                definition,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
            |_, a| CustomField::empty(CustomFieldId::new(a)),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, field_id = %id, code = %code, "custom field defined");
        self.get(ctx.tenant_id, id)
    }

    pub fn revise(
        &self,
        ctx: &CommandContext,
        field_id: CustomFieldId,
        changes: CustomFieldChanges,
    ) -> Result<CustomFieldDefinition, ServiceError> {
        self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            field_id.0,
            streams::CUSTOM_FIELD,
            CustomFieldCommand::ReviseCustomField(ReviseCustomField {
                tenant_id: ctx.tenant_id,
                field_id,
                label: changes.label,
                options: changes.options,
                required: changes.required,
                active: changes.active,
                sort_order: changes.sort_order,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
            |_, a| CustomField::empty(CustomFieldId::new(a)),
        )?;
        self.get(ctx.tenant_id, field_id)
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        field_id: CustomFieldId,
    ) -> Result<CustomFieldDefinition, ServiceError> {
        self.crm
            .read()
            .custom_fields
            .get(tenant_id, field_id.0)
            .and_then(|f| f.definition().cloned())
            .ok_or(ServiceError::NotFound("custom field"))
    }

    /// Definitions of one entity, by sort order then code. Includes inactive ones.
    pub fn list(&self, tenant_id: TenantId, entity: CustomFieldEntity) -> Vec<CustomFieldDefinition> {
        let mut defs: Vec<_> = self
            .crm
            .read()
            .custom_fields
            .list(tenant_id)
            .into_iter()
            .filter_map(|f| f.definition().cloned())
            .filter(|d| d.entity == entity)
            .collect();
        defs.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.code.cmp(&b.code)));
        defs
    }

    pub fn find(
        &self,
        tenant_id: TenantId,
        entity: CustomFieldEntity,
        code: &str,
    ) -> Option<CustomFieldDefinition> {
        self.list(tenant_id, entity).into_iter().find(|d| d.code == code)
    }

    /// Checks a batch of value changes against the entity's definitions.
    /// `None` removes a value and is always allowed unless the field is required.
    pub fn validate_changes(
        &self,
        tenant_id: TenantId,
        entity: CustomFieldEntity,
        changes: &BTreeMap<String, Option<CustomFieldValue>>,
    ) -> Result<(), ServiceError> {
        let defs = self.list(tenant_id, entity);
        for (code, value) in changes {
            let def = defs
                .iter()
                .find(|d| &d.code == code)
                .ok_or_else(|| ServiceError::validation(format!("unknown custom field '{code}'")))?;
            match value {
                Some(v) => def.validate_value(v)?,
                None if def.required => {
                    return Err(ServiceError::validation(format!(
                        "custom field '{code}' is required"
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Full value set for a new record: every change valid, every active
    /// required field present.
    pub fn validate_initial(
        &self,
        tenant_id: TenantId,
        entity: CustomFieldEntity,
        values: &CustomFieldValues,
    ) -> Result<(), ServiceError> {
        let changes: BTreeMap<_, _> = values
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        self.validate_changes(tenant_id, entity, &changes)?;
        for def in self.list(tenant_id, entity) {
            if def.active && def.required && values.get(&def.code).is_none() {
                return Err(ServiceError::validation(format!(
                    "custom field '{}' is required",
                    def.code
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;

    fn stage_field() -> NewCustomField {
        NewCustomField {
            entity: CustomFieldEntity::Opportunity,
            code: "stage".into(),
            label: "Stage".into(),
            field_type: CustomFieldType::Select,
            options: vec![SelectOption::new("open", "Open"), SelectOption::new("won", "Won")],
            required: false,
            sort_order: 10,
        }
    }

    #[test]
    fn codes_are_unique_per_entity() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        crm.custom_fields().define(&ctx, stage_field()).unwrap();

        let err = crm.custom_fields().define(&ctx, stage_field()).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let on_leads = NewCustomField {
            entity: CustomFieldEntity::Lead,
            ..stage_field()
        };
        crm.custom_fields().define(&ctx, on_leads).unwrap();
    }

    #[test]
    fn changes_are_checked_against_definitions() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        crm.custom_fields().define(&ctx, stage_field()).unwrap();
        let svc = crm.custom_fields();

        let ok = BTreeMap::from([("stage".to_string(), Some(CustomFieldValue::Select("won".into())))]);
        svc.validate_changes(ctx.tenant_id, CustomFieldEntity::Opportunity, &ok).unwrap();

        let bad_option =
            BTreeMap::from([("stage".to_string(), Some(CustomFieldValue::Select("lost".into())))]);
        assert!(svc.validate_changes(ctx.tenant_id, CustomFieldEntity::Opportunity, &bad_option).is_err());

        let unknown = BTreeMap::from([("budget".to_string(), None)]);
        assert!(svc.validate_changes(ctx.tenant_id, CustomFieldEntity::Opportunity, &unknown).is_err());
    }

    #[test]
    fn revise_deactivates_a_field() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let def = crm.custom_fields().define(&ctx, stage_field()).unwrap();

        let revised = crm
            .custom_fields()
            .revise(&ctx, def.id, CustomFieldChanges { active: Some(false), ..Default::default() })
            .unwrap();
        assert!(!revised.active);

        let value = BTreeMap::from([("stage".to_string(), Some(CustomFieldValue::Select("won".into())))]);
        assert!(crm
            .custom_fields()
            .validate_changes(ctx.tenant_id, CustomFieldEntity::Opportunity, &value)
            .is_err());
    }
}
