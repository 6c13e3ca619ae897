use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_contacts::{CompanyId, PersonId};
use nimbus_core::{
    Aggregate, AggregateRoot, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_events::Event;

record_id!(
    /// Support case identifier.
    SupportCaseId
);

/// `CS-000042` style case number.
pub fn format_case_number(sequence: u64) -> String {
    format!("CS-{sequence:06}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl CasePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CasePriority::Low => "low",
            CasePriority::Medium => "medium",
            CasePriority::High => "high",
            CasePriority::Urgent => "urgent",
        }
    }
}

impl core::str::FromStr for CasePriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(DomainError::validation(format!("unknown priority '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    New,
    Assigned,
    InProgress,
    Pending,
    Resolved,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::New => "new",
            CaseStatus::Assigned => "assigned",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Pending => "pending",
            CaseStatus::Resolved => "resolved",
            CaseStatus::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, CaseStatus::Resolved | CaseStatus::Closed)
    }
}

impl core::str::FromStr for CaseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "new" => Ok(Self::New),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(DomainError::validation(format!("unknown case status '{other}'"))),
        }
    }
}

/// Editable descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDetails {
    pub subject: String,
    pub description: Option<String>,
    pub priority: CasePriority,
    pub case_type: Option<String>,
    pub origin: Option<String>,
    pub company_id: Option<CompanyId>,
    pub contact_id: Option<PersonId>,
}

impl Default for CaseDetails {
    fn default() -> Self {
        Self {
            subject: String::new(),
            description: None,
            priority: CasePriority::Medium,
            case_type: None,
            origin: None,
            company_id: None,
            contact_id: None,
        }
    }
}

impl CaseDetails {
    fn normalized(&self) -> Result<Self, DomainError> {
        let subject = self.subject.trim();
        if subject.is_empty() {
            return Err(DomainError::validation("subject cannot be empty"));
        }
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            subject: subject.to_string(),
            description: clean(&self.description),
            priority: self.priority,
            case_type: clean(&self.case_type),
            origin: clean(&self.origin),
            company_id: self.company_id,
            contact_id: self.contact_id,
        })
    }
}

/// Aggregate root: SupportCase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportCase {
    id: SupportCaseId,
    tenant_id: Option<TenantId>,
    case_number: String,
    details: CaseDetails,
    status: CaseStatus,
    assignee: Option<UserId>,
    resolution: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl SupportCase {
    pub fn empty(id: SupportCaseId) -> Self {
        Self {
            id,
            tenant_id: None,
            case_number: String::new(),
            details: CaseDetails::default(),
            status: CaseStatus::New,
            assignee: None,
            resolution: None,
            resolved_at: None,
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn case_number(&self) -> &str {
        &self.case_number
    }

    pub fn details(&self) -> &CaseDetails {
        &self.details
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn assignee(&self) -> Option<UserId> {
        self.assignee
    }

    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }
}

impl AggregateRoot for SupportCase {
    type Id = SupportCaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCase {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub case_number: String,
    pub details: CaseDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCaseDetails {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub details: CaseDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCase {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub assignee: UserId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Move between working states (`in_progress`, `pending`) or close a
/// resolved case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCaseStatus {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub to: CaseStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveCase {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub resolution: String,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenCase {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCase {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCase {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportCaseCommand {
    OpenCase(OpenCase),
    UpdateCaseDetails(UpdateCaseDetails),
    AssignCase(AssignCase),
    ChangeCaseStatus(ChangeCaseStatus),
    ResolveCase(ResolveCase),
    ReopenCase(ReopenCase),
    DeleteCase(DeleteCase),
    RestoreCase(RestoreCase),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOpened {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub case_number: String,
    pub details: CaseDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDetailsUpdated {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub details: CaseDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAssigned {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub assignee: UserId,
    /// Status after assignment (`assigned` for new cases, unchanged otherwise).
    pub status: CaseStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStatusChanged {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResolved {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub resolution: String,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReopened {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDeleted {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRestored {
    pub tenant_id: TenantId,
    pub case_id: SupportCaseId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportCaseEvent {
    CaseOpened(CaseOpened),
    CaseDetailsUpdated(CaseDetailsUpdated),
    CaseAssigned(CaseAssigned),
    CaseStatusChanged(CaseStatusChanged),
    CaseResolved(CaseResolved),
    CaseReopened(CaseReopened),
    CaseDeleted(CaseDeleted),
    CaseRestored(CaseRestored),
}

impl SupportCaseEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            SupportCaseEvent::CaseOpened(e) => e.tenant_id,
            SupportCaseEvent::CaseDetailsUpdated(e) => e.tenant_id,
            SupportCaseEvent::CaseAssigned(e) => e.tenant_id,
            SupportCaseEvent::CaseStatusChanged(e) => e.tenant_id,
            SupportCaseEvent::CaseResolved(e) => e.tenant_id,
            SupportCaseEvent::CaseReopened(e) => e.tenant_id,
            SupportCaseEvent::CaseDeleted(e) => e.tenant_id,
            SupportCaseEvent::CaseRestored(e) => e.tenant_id,
        }
    }

    pub fn case_id(&self) -> SupportCaseId {
        match self {
            SupportCaseEvent::CaseOpened(e) => e.case_id,
            SupportCaseEvent::CaseDetailsUpdated(e) => e.case_id,
            SupportCaseEvent::CaseAssigned(e) => e.case_id,
            SupportCaseEvent::CaseStatusChanged(e) => e.case_id,
            SupportCaseEvent::CaseResolved(e) => e.case_id,
            SupportCaseEvent::CaseReopened(e) => e.case_id,
            SupportCaseEvent::CaseDeleted(e) => e.case_id,
            SupportCaseEvent::CaseRestored(e) => e.case_id,
        }
    }
}

impl Event for SupportCaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupportCaseEvent::CaseOpened(_) => "support.case.opened",
            SupportCaseEvent::CaseDetailsUpdated(_) => "support.case.details_updated",
            SupportCaseEvent::CaseAssigned(_) => "support.case.assigned",
            SupportCaseEvent::CaseStatusChanged(_) => "support.case.status_changed",
            SupportCaseEvent::CaseResolved(_) => "support.case.resolved",
            SupportCaseEvent::CaseReopened(_) => "support.case.reopened",
            SupportCaseEvent::CaseDeleted(_) => "support.case.deleted",
            SupportCaseEvent::CaseRestored(_) => "support.case.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupportCaseEvent::CaseOpened(e) => e.occurred_at,
            SupportCaseEvent::CaseDetailsUpdated(e) => e.occurred_at,
            SupportCaseEvent::CaseAssigned(e) => e.occurred_at,
            SupportCaseEvent::CaseStatusChanged(e) => e.occurred_at,
            SupportCaseEvent::CaseResolved(e) => e.occurred_at,
            SupportCaseEvent::CaseReopened(e) => e.occurred_at,
            SupportCaseEvent::CaseDeleted(e) => e.occurred_at,
            SupportCaseEvent::CaseRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SupportCase {
    type Command = SupportCaseCommand;
    type Event = SupportCaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupportCaseEvent::CaseOpened(e) => {
                self.id = e.case_id;
                self.tenant_id = Some(e.tenant_id);
                self.case_number = e.case_number.clone();
                self.details = e.details.clone();
                self.status = CaseStatus::New;
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            SupportCaseEvent::CaseDetailsUpdated(e) => {
                self.details = e.details.clone();
                self.audit.touch(e.actor, e.occurred_at);
            }
            SupportCaseEvent::CaseAssigned(e) => {
                self.assignee = Some(e.assignee);
                self.status = e.status;
                self.audit.touch(e.actor, e.occurred_at);
            }
            SupportCaseEvent::CaseStatusChanged(e) => {
                self.status = e.to;
                self.audit.touch(e.actor, e.occurred_at);
            }
            SupportCaseEvent::CaseResolved(e) => {
                self.status = CaseStatus::Resolved;
                self.resolution = Some(e.resolution.clone());
                self.resolved_at = Some(e.occurred_at);
                self.audit.touch(e.actor, e.occurred_at);
            }
            SupportCaseEvent::CaseReopened(e) => {
                self.status = CaseStatus::InProgress;
                self.resolution = None;
                self.resolved_at = None;
                self.audit.touch(e.actor, e.occurred_at);
            }
            SupportCaseEvent::CaseDeleted(e) => self.audit.mark_deleted(e.actor, e.occurred_at),
            SupportCaseEvent::CaseRestored(e) => self.audit.restore(e.actor, e.occurred_at),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupportCaseCommand::OpenCase(cmd) => self.handle_open(cmd),
            SupportCaseCommand::UpdateCaseDetails(cmd) => self.handle_update(cmd),
            SupportCaseCommand::AssignCase(cmd) => self.handle_assign(cmd),
            SupportCaseCommand::ChangeCaseStatus(cmd) => self.handle_change_status(cmd),
            SupportCaseCommand::ResolveCase(cmd) => self.handle_resolve(cmd),
            SupportCaseCommand::ReopenCase(cmd) => self.handle_reopen(cmd),
            SupportCaseCommand::DeleteCase(cmd) => self.handle_delete(cmd),
            SupportCaseCommand::RestoreCase(cmd) => self.handle_restore(cmd),
        }
    }
}

impl SupportCase {
    fn ensure_existing(&self, tenant_id: TenantId, case_id: SupportCaseId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("support case"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != case_id {
            return Err(DomainError::invariant("case_id mismatch"));
        }
        Ok(())
    }

    fn ensure_writable(&self, tenant_id: TenantId, case_id: SupportCaseId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, case_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("support case"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.status.is_open() {
            return Err(DomainError::invariant(format!(
                "case is {}; reopen it first",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenCase) -> Result<Vec<SupportCaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("support case already exists"));
        }
        if cmd.case_number.trim().is_empty() {
            return Err(DomainError::validation("case number is required"));
        }
        Ok(vec![SupportCaseEvent::CaseOpened(CaseOpened {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            case_number: cmd.case_number.trim().to_string(),
            details: cmd.details.normalized()?,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCaseDetails) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.case_id)?;
        Ok(vec![SupportCaseEvent::CaseDetailsUpdated(CaseDetailsUpdated {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            details: cmd.details.normalized()?,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignCase) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.case_id)?;
        self.ensure_open()?;
        let status = match self.status {
            CaseStatus::New => CaseStatus::Assigned,
            other => other,
        };
        Ok(vec![SupportCaseEvent::CaseAssigned(CaseAssigned {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            assignee: cmd.assignee,
            status,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeCaseStatus) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.case_id)?;
        use CaseStatus::*;
        let allowed = matches!(
            (self.status, cmd.to),
            (New | Assigned | Pending, InProgress)
                | (New | Assigned | InProgress, Pending)
                | (Resolved, Closed)
        );
        if !allowed {
            return Err(DomainError::invariant(format!(
                "cannot move case from {} to {}",
                self.status.as_str(),
                cmd.to.as_str()
            )));
        }
        Ok(vec![SupportCaseEvent::CaseStatusChanged(CaseStatusChanged {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            from: self.status,
            to: cmd.to,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve(&self, cmd: &ResolveCase) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.case_id)?;
        self.ensure_open()?;
        let resolution = cmd.resolution.trim();
        if resolution.is_empty() {
            return Err(DomainError::validation("resolution is required"));
        }
        Ok(vec![SupportCaseEvent::CaseResolved(CaseResolved {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            resolution: resolution.to_string(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenCase) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.case_id)?;
        if self.status.is_open() {
            return Err(DomainError::invariant("only resolved or closed cases can be reopened"));
        }
        Ok(vec![SupportCaseEvent::CaseReopened(CaseReopened {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteCase) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.case_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("support case is already deleted"));
        }
        Ok(vec![SupportCaseEvent::CaseDeleted(CaseDeleted {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreCase) -> Result<Vec<SupportCaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.case_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("support case is not deleted"));
        }
        Ok(vec![SupportCaseEvent::CaseRestored(CaseRestored {
            tenant_id: cmd.tenant_id,
            case_id: cmd.case_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
