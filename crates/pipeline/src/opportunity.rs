use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_contacts::{CompanyId, PersonId};
use nimbus_core::{
    Aggregate, AggregateRoot, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_custom_fields::{CustomFieldValue, CustomFieldValues};
use nimbus_events::Event;

use crate::lead::LeadId;

record_id!(
    /// Sales opportunity identifier.
    OpportunityId
);

/// Aggregate root: Opportunity.
///
/// Amount, probability, close date, stage and forecast category are custom
/// field values; [`crate::metrics`] derives the pipeline figures from them.
/// Values are checked against tenant definitions before dispatch, the
/// aggregate only guards record state.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    id: OpportunityId,
    tenant_id: Option<TenantId>,
    name: String,
    company_id: Option<CompanyId>,
    contact_id: Option<PersonId>,
    source_lead: Option<LeadId>,
    custom_fields: CustomFieldValues,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl Opportunity {
    pub fn empty(id: OpportunityId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            company_id: None,
            contact_id: None,
            source_lead: None,
            custom_fields: CustomFieldValues::new(),
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn contact_id(&self) -> Option<PersonId> {
        self.contact_id
    }

    pub fn source_lead(&self) -> Option<LeadId> {
        self.source_lead
    }

    pub fn custom_fields(&self) -> &CustomFieldValues {
        &self.custom_fields
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }
}

impl AggregateRoot for Opportunity {
    type Id = OpportunityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOpportunity {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub name: String,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
    pub source_lead: Option<LeadId>,
    pub custom_fields: CustomFieldValues,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOpportunity {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub name: Option<String>,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Patch of custom values: `Some` sets, `None` clears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCustomFieldValues {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub changes: BTreeMap<String, Option<CustomFieldValue>>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOpportunity {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOpportunity {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpportunityCommand {
    CreateOpportunity(CreateOpportunity),
    UpdateOpportunity(UpdateOpportunity),
    SetCustomFieldValues(SetCustomFieldValues),
    DeleteOpportunity(DeleteOpportunity),
    RestoreOpportunity(RestoreOpportunity),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCreated {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub name: String,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
    pub source_lead: Option<LeadId>,
    pub custom_fields: CustomFieldValues,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityUpdated {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub name: String,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValuesChanged {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub changes: BTreeMap<String, Option<CustomFieldValue>>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityDeleted {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRestored {
    pub tenant_id: TenantId,
    pub opportunity_id: OpportunityId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpportunityEvent {
    OpportunityCreated(OpportunityCreated),
    OpportunityUpdated(OpportunityUpdated),
    CustomFieldValuesChanged(CustomFieldValuesChanged),
    OpportunityDeleted(OpportunityDeleted),
    OpportunityRestored(OpportunityRestored),
}

impl OpportunityEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            OpportunityEvent::OpportunityCreated(e) => e.tenant_id,
            OpportunityEvent::OpportunityUpdated(e) => e.tenant_id,
            OpportunityEvent::CustomFieldValuesChanged(e) => e.tenant_id,
            OpportunityEvent::OpportunityDeleted(e) => e.tenant_id,
            OpportunityEvent::OpportunityRestored(e) => e.tenant_id,
        }
    }

    pub fn opportunity_id(&self) -> OpportunityId {
        match self {
            OpportunityEvent::OpportunityCreated(e) => e.opportunity_id,
            OpportunityEvent::OpportunityUpdated(e) => e.opportunity_id,
            OpportunityEvent::CustomFieldValuesChanged(e) => e.opportunity_id,
            OpportunityEvent::OpportunityDeleted(e) => e.opportunity_id,
            OpportunityEvent::OpportunityRestored(e) => e.opportunity_id,
        }
    }
}

impl Event for OpportunityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OpportunityEvent::OpportunityCreated(_) => "pipeline.opportunity.created",
            OpportunityEvent::OpportunityUpdated(_) => "pipeline.opportunity.updated",
            OpportunityEvent::CustomFieldValuesChanged(_) => {
                "pipeline.opportunity.custom_fields_changed"
            }
            OpportunityEvent::OpportunityDeleted(_) => "pipeline.opportunity.deleted",
            OpportunityEvent::OpportunityRestored(_) => "pipeline.opportunity.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OpportunityEvent::OpportunityCreated(e) => e.occurred_at,
            OpportunityEvent::OpportunityUpdated(e) => e.occurred_at,
            OpportunityEvent::CustomFieldValuesChanged(e) => e.occurred_at,
            OpportunityEvent::OpportunityDeleted(e) => e.occurred_at,
            OpportunityEvent::OpportunityRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Opportunity {
    type Command = OpportunityCommand;
    type Event = OpportunityEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OpportunityEvent::OpportunityCreated(e) => {
                self.id = e.opportunity_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.company_id = e.company_id;
                self.contact_id = e.contact_id;
                self.source_lead = e.source_lead;
                self.custom_fields = e.custom_fields.clone();
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            OpportunityEvent::OpportunityUpdated(e) => {
                self.name = e.name.clone();
                self.company_id = e.company_id;
                self.contact_id = e.contact_id;
                self.audit.touch(e.actor, e.occurred_at);
            }
            OpportunityEvent::CustomFieldValuesChanged(e) => {
                self.custom_fields.apply_changes(&e.changes);
                self.audit.touch(e.actor, e.occurred_at);
            }
            OpportunityEvent::OpportunityDeleted(e) => {
                self.audit.mark_deleted(e.actor, e.occurred_at)
            }
            OpportunityEvent::OpportunityRestored(e) => self.audit.restore(e.actor, e.occurred_at),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OpportunityCommand::CreateOpportunity(cmd) => self.handle_create(cmd),
            OpportunityCommand::UpdateOpportunity(cmd) => self.handle_update(cmd),
            OpportunityCommand::SetCustomFieldValues(cmd) => self.handle_set_values(cmd),
            OpportunityCommand::DeleteOpportunity(cmd) => self.handle_delete(cmd),
            OpportunityCommand::RestoreOpportunity(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Opportunity {
    fn ensure_existing(
        &self,
        tenant_id: TenantId,
        opportunity_id: OpportunityId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("opportunity"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != opportunity_id {
            return Err(DomainError::invariant("opportunity_id mismatch"));
        }
        Ok(())
    }

    fn ensure_writable(
        &self,
        tenant_id: TenantId,
        opportunity_id: OpportunityId,
    ) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, opportunity_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("opportunity"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOpportunity) -> Result<Vec<OpportunityEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("opportunity already exists"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![OpportunityEvent::OpportunityCreated(OpportunityCreated {
            tenant_id: cmd.tenant_id,
            opportunity_id: cmd.opportunity_id,
            name: name.to_string(),
            company_id: cmd.company_id,
            contact_id: cmd.contact_id,
            source_lead: cmd.source_lead,
            custom_fields: cmd.custom_fields.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateOpportunity) -> Result<Vec<OpportunityEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.opportunity_id)?;
        let name = match cmd.name.as_deref().map(str::trim) {
            Some("") => return Err(DomainError::validation("name cannot be empty")),
            Some(n) => n.to_string(),
            None => self.name.clone(),
        };
        Ok(vec![OpportunityEvent::OpportunityUpdated(OpportunityUpdated {
            tenant_id: cmd.tenant_id,
            opportunity_id: cmd.opportunity_id,
            name,
            company_id: cmd.company_id.or(self.company_id),
            contact_id: cmd.contact_id.or(self.contact_id),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_values(
        &self,
        cmd: &SetCustomFieldValues,
    ) -> Result<Vec<OpportunityEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.opportunity_id)?;
        if cmd.changes.is_empty() {
            return Err(DomainError::validation("no custom field changes"));
        }
        Ok(vec![OpportunityEvent::CustomFieldValuesChanged(
            CustomFieldValuesChanged {
                tenant_id: cmd.tenant_id,
                opportunity_id: cmd.opportunity_id,
                changes: cmd.changes.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_delete(&self, cmd: &DeleteOpportunity) -> Result<Vec<OpportunityEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.opportunity_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("opportunity is already deleted"));
        }
        Ok(vec![OpportunityEvent::OpportunityDeleted(OpportunityDeleted {
            tenant_id: cmd.tenant_id,
            opportunity_id: cmd.opportunity_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(
        &self,
        cmd: &RestoreOpportunity,
    ) -> Result<Vec<OpportunityEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.opportunity_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("opportunity is not deleted"));
        }
        Ok(vec![OpportunityEvent::OpportunityRestored(OpportunityRestored {
            tenant_id: cmd.tenant_id,
            opportunity_id: cmd.opportunity_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::{Currency, Money};

    fn created() -> (Opportunity, TenantId, OpportunityId) {
        let tenant_id = TenantId::new();
        let opportunity_id = OpportunityId::generate();
        let mut opp = Opportunity::empty(opportunity_id);
        let mut custom_fields = CustomFieldValues::new();
        custom_fields.set(
            "amount",
            CustomFieldValue::Currency(Money::new(1_000_000, Currency::usd())),
        );
        let events = opp
            .handle(&OpportunityCommand::CreateOpportunity(CreateOpportunity {
                tenant_id,
                opportunity_id,
                name: "Acme renewal".into(),
                company_id: None,
                contact_id: None,
                source_lead: None,
                custom_fields,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            opp.apply(e);
        }
        (opp, tenant_id, opportunity_id)
    }

    #[test]
    fn create_keeps_initial_custom_values() {
        let (opp, _, _) = created();
        assert_eq!(opp.name(), "Acme renewal");
        assert!(opp.custom_fields().get("amount").is_some());
        assert_eq!(opp.version(), 1);
    }

    #[test]
    fn custom_value_patch_sets_and_clears() {
        let (mut opp, tenant_id, opportunity_id) = created();
        let mut changes = BTreeMap::new();
        changes.insert("amount".to_string(), None);
        changes.insert(
            "probability".to_string(),
            Some(CustomFieldValue::Number(40.0)),
        );
        let events = opp
            .handle(&OpportunityCommand::SetCustomFieldValues(SetCustomFieldValues {
                tenant_id,
                opportunity_id,
                changes,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        opp.apply(&events[0]);

        assert!(opp.custom_fields().get("amount").is_none());
        assert_eq!(
            opp.custom_fields().get("probability").and_then(|v| v.as_number()),
            Some(40.0)
        );
    }

    #[test]
    fn deleted_opportunity_rejects_value_changes() {
        let (mut opp, tenant_id, opportunity_id) = created();
        let events = opp
            .handle(&OpportunityCommand::DeleteOpportunity(DeleteOpportunity {
                tenant_id,
                opportunity_id,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        opp.apply(&events[0]);

        let mut changes = BTreeMap::new();
        changes.insert("probability".to_string(), Some(CustomFieldValue::Number(10.0)));
        let err = opp
            .handle(&OpportunityCommand::SetCustomFieldValues(SetCustomFieldValues {
                tenant_id,
                opportunity_id,
                changes,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::deleted("opportunity"));
    }

    #[test]
    fn blank_rename_is_rejected() {
        let (opp, tenant_id, opportunity_id) = created();
        let err = opp
            .handle(&OpportunityCommand::UpdateOpportunity(UpdateOpportunity {
                tenant_id,
                opportunity_id,
                name: Some("  ".into()),
                company_id: None,
                contact_id: None,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
