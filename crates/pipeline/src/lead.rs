use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_contacts::{CompanyId, PersonId, normalize_email};
use nimbus_core::{
    Aggregate, AggregateRoot, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_events::Event;

use crate::duplicates::DuplicateMatch;
use crate::opportunity::OpportunityId;

record_id!(
    /// Sales lead identifier.
    LeadId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Unqualified,
    Converted,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Unqualified => "unqualified",
            LeadStatus::Converted => "converted",
        }
    }

    pub fn can_convert(&self) -> bool {
        matches!(
            self,
            LeadStatus::New | LeadStatus::Contacted | LeadStatus::Qualified
        )
    }
}

impl core::str::FromStr for LeadStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "qualified" => Ok(Self::Qualified),
            "unqualified" => Ok(Self::Unqualified),
            "converted" => Ok(Self::Converted),
            other => Err(DomainError::validation(format!("unknown lead status '{other}'"))),
        }
    }
}

/// Records produced when a lead was converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadConversion {
    pub company_id: Option<CompanyId>,
    pub person_id: PersonId,
    pub opportunity_id: OpportunityId,
}

/// Descriptive lead fields shared by create/update commands and events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDetails {
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
}

impl LeadDetails {
    pub fn full_name(&self) -> String {
        nimbus_contacts::full_name(&self.first_name, &self.last_name)
    }

    fn normalized(&self) -> Result<Self, DomainError> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        if first_name.is_empty() && last_name.is_empty() {
            return Err(DomainError::validation("first or last name is required"));
        }
        let email = match trimmed(&self.email) {
            Some(e) => Some(normalize_email(&e)?),
            None => None,
        };
        Ok(Self {
            first_name,
            last_name,
            company_name: trimmed(&self.company_name),
            email,
            phone: trimmed(&self.phone),
            source: trimmed(&self.source),
        })
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Aggregate root: Lead.
#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    id: LeadId,
    tenant_id: Option<TenantId>,
    details: LeadDetails,
    status: LeadStatus,
    duplicates: Vec<DuplicateMatch>,
    conversion: Option<LeadConversion>,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl Lead {
    pub fn empty(id: LeadId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: LeadDetails::default(),
            status: LeadStatus::New,
            duplicates: Vec::new(),
            conversion: None,
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn details(&self) -> &LeadDetails {
        &self.details
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    pub fn duplicates(&self) -> &[DuplicateMatch] {
        &self.duplicates
    }

    pub fn conversion(&self) -> Option<&LeadConversion> {
        self.conversion.as_ref()
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }
}

impl AggregateRoot for Lead {
    type Id = LeadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Replaces the descriptive fields. Not allowed once converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLeadStatus {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub status: LeadStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDuplicates {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub matches: Vec<DuplicateMatch>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub conversion: LeadConversion,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeadCommand {
    CreateLead(CreateLead),
    UpdateLead(UpdateLead),
    ChangeLeadStatus(ChangeLeadStatus),
    FlagDuplicates(FlagDuplicates),
    ConvertLead(ConvertLead),
    DeleteLead(DeleteLead),
    RestoreLead(RestoreLead),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCreated {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadUpdated {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadStatusChanged {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub from: LeadStatus,
    pub to: LeadStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Best-effort enrichment recorded after creation; replaces earlier flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatesFlagged {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub matches: Vec<DuplicateMatch>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadConverted {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub conversion: LeadConversion,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDeleted {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRestored {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeadEvent {
    LeadCreated(LeadCreated),
    LeadUpdated(LeadUpdated),
    LeadStatusChanged(LeadStatusChanged),
    DuplicatesFlagged(DuplicatesFlagged),
    LeadConverted(LeadConverted),
    LeadDeleted(LeadDeleted),
    LeadRestored(LeadRestored),
}

impl LeadEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            LeadEvent::LeadCreated(e) => e.tenant_id,
            LeadEvent::LeadUpdated(e) => e.tenant_id,
            LeadEvent::LeadStatusChanged(e) => e.tenant_id,
            LeadEvent::DuplicatesFlagged(e) => e.tenant_id,
            LeadEvent::LeadConverted(e) => e.tenant_id,
            LeadEvent::LeadDeleted(e) => e.tenant_id,
            LeadEvent::LeadRestored(e) => e.tenant_id,
        }
    }

    pub fn lead_id(&self) -> LeadId {
        match self {
            LeadEvent::LeadCreated(e) => e.lead_id,
            LeadEvent::LeadUpdated(e) => e.lead_id,
            LeadEvent::LeadStatusChanged(e) => e.lead_id,
            LeadEvent::DuplicatesFlagged(e) => e.lead_id,
            LeadEvent::LeadConverted(e) => e.lead_id,
            LeadEvent::LeadDeleted(e) => e.lead_id,
            LeadEvent::LeadRestored(e) => e.lead_id,
        }
    }
}

impl Event for LeadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeadEvent::LeadCreated(_) => "pipeline.lead.created",
            LeadEvent::LeadUpdated(_) => "pipeline.lead.updated",
            LeadEvent::LeadStatusChanged(_) => "pipeline.lead.status_changed",
            LeadEvent::DuplicatesFlagged(_) => "pipeline.lead.duplicates_flagged",
            LeadEvent::LeadConverted(_) => "pipeline.lead.converted",
            LeadEvent::LeadDeleted(_) => "pipeline.lead.deleted",
            LeadEvent::LeadRestored(_) => "pipeline.lead.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LeadEvent::LeadCreated(e) => e.occurred_at,
            LeadEvent::LeadUpdated(e) => e.occurred_at,
            LeadEvent::LeadStatusChanged(e) => e.occurred_at,
            LeadEvent::DuplicatesFlagged(e) => e.occurred_at,
            LeadEvent::LeadConverted(e) => e.occurred_at,
            LeadEvent::LeadDeleted(e) => e.occurred_at,
            LeadEvent::LeadRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lead {
    type Command = LeadCommand;
    type Event = LeadEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeadEvent::LeadCreated(e) => {
                self.id = e.lead_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = LeadStatus::New;
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            LeadEvent::LeadUpdated(e) => {
                self.details = e.details.clone();
                self.audit.touch(e.actor, e.occurred_at);
            }
            LeadEvent::LeadStatusChanged(e) => {
                self.status = e.to;
                self.audit.touch(e.actor, e.occurred_at);
            }
            LeadEvent::DuplicatesFlagged(e) => {
                // Enrichment only; editor columns are left alone.
                self.duplicates = e.matches.clone();
            }
            LeadEvent::LeadConverted(e) => {
                self.status = LeadStatus::Converted;
                self.conversion = Some(e.conversion);
                self.audit.touch(e.actor, e.occurred_at);
            }
            LeadEvent::LeadDeleted(e) => self.audit.mark_deleted(e.actor, e.occurred_at),
            LeadEvent::LeadRestored(e) => self.audit.restore(e.actor, e.occurred_at),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LeadCommand::CreateLead(cmd) => self.handle_create(cmd),
            LeadCommand::UpdateLead(cmd) => self.handle_update(cmd),
            LeadCommand::ChangeLeadStatus(cmd) => self.handle_change_status(cmd),
            LeadCommand::FlagDuplicates(cmd) => self.handle_flag_duplicates(cmd),
            LeadCommand::ConvertLead(cmd) => self.handle_convert(cmd),
            LeadCommand::DeleteLead(cmd) => self.handle_delete(cmd),
            LeadCommand::RestoreLead(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Lead {
    fn ensure_existing(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("lead"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != lead_id {
            return Err(DomainError::invariant("lead_id mismatch"));
        }
        Ok(())
    }

    fn ensure_writable(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, lead_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("lead"));
        }
        Ok(())
    }

    fn ensure_not_converted(&self) -> Result<(), DomainError> {
        if self.status == LeadStatus::Converted {
            return Err(DomainError::invariant("lead is already converted"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateLead) -> Result<Vec<LeadEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lead already exists"));
        }
        Ok(vec![LeadEvent::LeadCreated(LeadCreated {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            details: cmd.details.normalized()?,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_not_converted()?;
        Ok(vec![LeadEvent::LeadUpdated(LeadUpdated {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            details: cmd.details.normalized()?,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeLeadStatus) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_not_converted()?;
        if cmd.status == LeadStatus::Converted {
            return Err(DomainError::validation(
                "use lead conversion to mark a lead converted",
            ));
        }
        if cmd.status == self.status {
            return Err(DomainError::conflict(format!(
                "lead is already {}",
                self.status.as_str()
            )));
        }
        Ok(vec![LeadEvent::LeadStatusChanged(LeadStatusChanged {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            from: self.status,
            to: cmd.status,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_flag_duplicates(&self, cmd: &FlagDuplicates) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.lead_id)?;
        if cmd.matches.iter().any(|m| m.lead_id == self.id) {
            return Err(DomainError::validation("a lead cannot duplicate itself"));
        }
        if cmd.matches.iter().any(|m| !(0.0..=100.0).contains(&m.score)) {
            return Err(DomainError::validation("duplicate score must be within 0..=100"));
        }
        Ok(vec![LeadEvent::DuplicatesFlagged(DuplicatesFlagged {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            matches: cmd.matches.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &ConvertLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.lead_id)?;
        if !self.status.can_convert() {
            return Err(DomainError::invariant(format!(
                "cannot convert a lead in status {}",
                self.status.as_str()
            )));
        }
        Ok(vec![LeadEvent::LeadConverted(LeadConverted {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            conversion: cmd.conversion,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lead_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("lead is already deleted"));
        }
        Ok(vec![LeadEvent::LeadDeleted(LeadDeleted {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.lead_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("lead is not deleted"));
        }
        Ok(vec![LeadEvent::LeadRestored(LeadRestored {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme_details() -> LeadDetails {
        LeadDetails {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            company_name: Some("Acme".into()),
            email: Some("Jane@Acme.com ".into()),
            phone: Some("555 0100".into()),
            source: Some(" ".into()),
        }
    }

    fn created_lead() -> (Lead, TenantId, LeadId) {
        let tenant_id = TenantId::new();
        let lead_id = LeadId::generate();
        let mut lead = Lead::empty(lead_id);
        let events = lead
            .handle(&LeadCommand::CreateLead(CreateLead {
                tenant_id,
                lead_id,
                details: acme_details(),
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            lead.apply(e);
        }
        (lead, tenant_id, lead_id)
    }

    fn apply_all(lead: &mut Lead, events: Vec<LeadEvent>) {
        for e in &events {
            lead.apply(e);
        }
    }

    fn status_cmd(tenant_id: TenantId, lead_id: LeadId, status: LeadStatus) -> LeadCommand {
        LeadCommand::ChangeLeadStatus(ChangeLeadStatus {
            tenant_id,
            lead_id,
            status,
            actor: None,
            occurred_at: Utc::now(),
        })
    }

    fn convert_cmd(tenant_id: TenantId, lead_id: LeadId) -> LeadCommand {
        LeadCommand::ConvertLead(ConvertLead {
            tenant_id,
            lead_id,
            conversion: LeadConversion {
                company_id: Some(CompanyId::generate()),
                person_id: PersonId::generate(),
                opportunity_id: OpportunityId::generate(),
            },
            actor: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_starts_new_with_normalized_details() {
        let (lead, _, _) = created_lead();
        assert_eq!(lead.status(), LeadStatus::New);
        assert_eq!(lead.details().email.as_deref(), Some("jane@acme.com"));
        assert_eq!(lead.details().source, None);
        assert_eq!(lead.details().full_name(), "Jane Doe");
    }

    #[test]
    fn status_cannot_be_set_to_converted_directly() {
        let (lead, tenant_id, lead_id) = created_lead();
        let err = lead
            .handle(&status_cmd(tenant_id, lead_id, LeadStatus::Converted))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unqualified_lead_cannot_be_converted() {
        let (mut lead, tenant_id, lead_id) = created_lead();
        let events = lead
            .handle(&status_cmd(tenant_id, lead_id, LeadStatus::Unqualified))
            .unwrap();
        apply_all(&mut lead, events);

        let err = lead.handle(&convert_cmd(tenant_id, lead_id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn converted_lead_is_terminal() {
        let (mut lead, tenant_id, lead_id) = created_lead();
        let events = lead.handle(&convert_cmd(tenant_id, lead_id)).unwrap();
        apply_all(&mut lead, events);
        assert_eq!(lead.status(), LeadStatus::Converted);
        assert!(lead.conversion().is_some());

        assert!(lead.handle(&convert_cmd(tenant_id, lead_id)).is_err());
        assert!(
            lead.handle(&status_cmd(tenant_id, lead_id, LeadStatus::Qualified))
                .is_err()
        );
    }

    #[test]
    fn flagging_duplicates_replaces_previous_matches() {
        let (mut lead, tenant_id, lead_id) = created_lead();
        let other = LeadId::generate();
        let flag = |matches| {
            LeadCommand::FlagDuplicates(FlagDuplicates {
                tenant_id,
                lead_id,
                matches,
                occurred_at: Utc::now(),
            })
        };

        let events = lead
            .handle(&flag(vec![DuplicateMatch { lead_id: other, score: 70.0 }]))
            .unwrap();
        apply_all(&mut lead, events);
        assert_eq!(lead.duplicates().len(), 1);

        let events = lead.handle(&flag(Vec::new())).unwrap();
        apply_all(&mut lead, events);
        assert!(lead.duplicates().is_empty());

        let err = lead
            .handle(&flag(vec![DuplicateMatch { lead_id, score: 100.0 }]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deleted_lead_rejects_status_changes() {
        let (mut lead, tenant_id, lead_id) = created_lead();
        let events = lead
            .handle(&LeadCommand::DeleteLead(DeleteLead {
                tenant_id,
                lead_id,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        apply_all(&mut lead, events);

        let err = lead
            .handle(&status_cmd(tenant_id, lead_id, LeadStatus::Contacted))
            .unwrap_err();
        assert_eq!(err, DomainError::deleted("lead"));
    }
}
