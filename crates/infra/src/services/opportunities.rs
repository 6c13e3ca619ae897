//! Opportunities and their custom field values.

use std::collections::BTreeMap;

use serde::Deserialize;

use nimbus_contacts::{CompanyId, PersonId};
use nimbus_core::{AggregateRoot, TenantId};
use nimbus_custom_fields::{CustomFieldEntity, CustomFieldValue, CustomFieldValues};
use nimbus_pipeline::{
    CreateOpportunity, DeleteOpportunity, LeadId, Opportunity, OpportunityCommand, OpportunityId,
    RestoreOpportunity, SetCustomFieldValues, UpdateOpportunity,
};

use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewOpportunity {
    pub name: String,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
    #[serde(default)]
    pub custom_fields: CustomFieldValues,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OpportunityChanges {
    pub name: Option<String>,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
}

pub struct OpportunityService<'a> {
    crm: &'a Crm,
}

impl<'a> OpportunityService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub fn create(
        &self,
        ctx: &CommandContext,
        input: NewOpportunity,
    ) -> Result<Opportunity, ServiceError> {
        self.create_inner(ctx, input, None)
    }

    pub(crate) fn create_from_lead(
        &self,
        ctx: &CommandContext,
        input: NewOpportunity,
        lead_id: LeadId,
    ) -> Result<Opportunity, ServiceError> {
        self.create_inner(ctx, input, Some(lead_id))
    }

    fn create_inner(
        &self,
        ctx: &CommandContext,
        input: NewOpportunity,
        source_lead: Option<LeadId>,
    ) -> Result<Opportunity, ServiceError> {
        self.check_links(ctx.tenant_id, input.company_id, input.contact_id)?;
        self.crm.custom_fields().validate_initial(
            ctx.tenant_id,
            CustomFieldEntity::Opportunity,
            &input.custom_fields,
        )?;
        let opportunity_id = OpportunityId::generate();
        self.send(
            ctx,
            opportunity_id,
            OpportunityCommand::CreateOpportunity(CreateOpportunity {
                tenant_id: ctx.tenant_id,
                opportunity_id,
                name: input.name,
                company_id: input.company_id,
                contact_id: input.contact_id,
                source_lead,
                custom_fields: input.custom_fields,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, opportunity_id = %opportunity_id, "opportunity created");
        self.get(ctx.tenant_id, opportunity_id)
    }

    pub fn update(
        &self,
        ctx: &CommandContext,
        opportunity_id: OpportunityId,
        changes: OpportunityChanges,
    ) -> Result<Opportunity, ServiceError> {
        self.check_links(ctx.tenant_id, changes.company_id, changes.contact_id)?;
        self.send(
            ctx,
            opportunity_id,
            OpportunityCommand::UpdateOpportunity(UpdateOpportunity {
                tenant_id: ctx.tenant_id,
                opportunity_id,
                name: changes.name,
                company_id: changes.company_id,
                contact_id: changes.contact_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, opportunity_id)
    }

    /// Sets (`Some`) or clears (`None`) custom values after checking them
    /// against the tenant's opportunity fields.
    pub fn set_custom_fields(
        &self,
        ctx: &CommandContext,
        opportunity_id: OpportunityId,
        changes: BTreeMap<String, Option<CustomFieldValue>>,
    ) -> Result<Opportunity, ServiceError> {
        self.crm
            .custom_fields()
            .validate_changes(ctx.tenant_id, CustomFieldEntity::Opportunity, &changes)?;
        self.send(
            ctx,
            opportunity_id,
            OpportunityCommand::SetCustomFieldValues(SetCustomFieldValues {
                tenant_id: ctx.tenant_id,
                opportunity_id,
                changes,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, opportunity_id)
    }

    pub fn delete(&self, ctx: &CommandContext, opportunity_id: OpportunityId) -> Result<(), ServiceError> {
        self.send(
            ctx,
            opportunity_id,
            OpportunityCommand::DeleteOpportunity(DeleteOpportunity {
                tenant_id: ctx.tenant_id,
                opportunity_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, opportunity_id = %opportunity_id, "opportunity deleted");
        Ok(())
    }

    pub fn restore(
        &self,
        ctx: &CommandContext,
        opportunity_id: OpportunityId,
    ) -> Result<Opportunity, ServiceError> {
        self.send(
            ctx,
            opportunity_id,
            OpportunityCommand::RestoreOpportunity(RestoreOpportunity {
                tenant_id: ctx.tenant_id,
                opportunity_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, opportunity_id)
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        opportunity_id: OpportunityId,
    ) -> Result<Opportunity, ServiceError> {
        self.crm
            .read()
            .opportunities
            .get(tenant_id, opportunity_id.0)
            .ok_or(ServiceError::NotFound("opportunity"))
    }

    /// Live opportunities by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<Opportunity> {
        let mut out: Vec<_> = self
            .crm
            .read()
            .opportunities
            .list(tenant_id)
            .into_iter()
            .filter(|o| !o.is_deleted())
            .collect();
        out.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    fn check_links(
        &self,
        tenant_id: TenantId,
        company_id: Option<CompanyId>,
        contact_id: Option<PersonId>,
    ) -> Result<(), ServiceError> {
        let contacts = self.crm.contacts();
        if let Some(id) = company_id {
            contacts.live_company(tenant_id, id)?;
        }
        if let Some(id) = contact_id {
            contacts.live_person(tenant_id, id)?;
        }
        Ok(())
    }

    fn send(
        &self,
        ctx: &CommandContext,
        opportunity_id: OpportunityId,
        command: OpportunityCommand,
    ) -> Result<(), ServiceError> {
        self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            opportunity_id.0,
            streams::OPPORTUNITY,
            command,
            |_, id| Opportunity::empty(OpportunityId::new(id)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;

    fn deal(name: &str) -> NewOpportunity {
        NewOpportunity {
            name: name.into(),
            company_id: None,
            contact_id: None,
            custom_fields: CustomFieldValues::new(),
        }
    }

    #[test]
    fn custom_values_must_match_registered_fields() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        crm.metrics().ensure_default_fields(&ctx).unwrap();
        let opp = crm.opportunities().create(&ctx, deal("Renewal")).unwrap();

        let ok = BTreeMap::from([("probability".to_string(), Some(CustomFieldValue::Number(40.0)))]);
        let updated = crm.opportunities().set_custom_fields(&ctx, *opp.id(), ok).unwrap();
        assert_eq!(updated.custom_fields().get("probability"), Some(&CustomFieldValue::Number(40.0)));

        let wrong_type =
            BTreeMap::from([("probability".to_string(), Some(CustomFieldValue::Text("high".into())))]);
        assert!(crm.opportunities().set_custom_fields(&ctx, *opp.id(), wrong_type).is_err());

        let cleared = BTreeMap::from([("probability".to_string(), None)]);
        let updated = crm.opportunities().set_custom_fields(&ctx, *opp.id(), cleared).unwrap();
        assert!(updated.custom_fields().is_empty());
    }

    #[test]
    fn links_must_point_at_live_records() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let input = NewOpportunity {
            contact_id: Some(PersonId::generate()),
            ..deal("Ghost")
        };
        let err = crm.opportunities().create(&ctx, input).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("person")));
        assert!(crm.opportunities().list(ctx.tenant_id).is_empty());
    }
}
