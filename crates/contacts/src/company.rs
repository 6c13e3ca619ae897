use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_core::{
    Aggregate, AggregateRoot, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_events::Event;

use crate::contact::{ContactInfo, blank_to_none};

record_id!(
    /// Company identifier (customers, prospects, partners and suppliers).
    CompanyId
);

/// Relationship of a company to the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyKind {
    Customer,
    Prospect,
    Partner,
    Supplier,
}

impl CompanyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyKind::Customer => "customer",
            CompanyKind::Prospect => "prospect",
            CompanyKind::Partner => "partner",
            CompanyKind::Supplier => "supplier",
        }
    }
}

impl core::str::FromStr for CompanyKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "prospect" => Ok(Self::Prospect),
            "partner" => Ok(Self::Partner),
            "supplier" | "vendor" => Ok(Self::Supplier),
            other => Err(DomainError::validation(format!("unknown company kind '{other}'"))),
        }
    }
}

/// Aggregate root: Company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    id: CompanyId,
    tenant_id: Option<TenantId>,
    kind: CompanyKind,
    name: String,
    contact: ContactInfo,
    account_owner: Option<UserId>,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl Company {
    /// Empty instance for rehydration.
    pub fn empty(id: CompanyId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: CompanyKind::Prospect,
            name: String::new(),
            contact: ContactInfo::default(),
            account_owner: None,
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn kind(&self) -> CompanyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn account_owner(&self) -> Option<UserId> {
        self.account_owner
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }
}

impl AggregateRoot for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub kind: CompanyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub account_owner: Option<UserId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub kind: Option<CompanyKind>,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub account_owner: Option<UserId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyCommand {
    CreateCompany(CreateCompany),
    UpdateCompany(UpdateCompany),
    DeleteCompany(DeleteCompany),
    RestoreCompany(RestoreCompany),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyCreated {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub kind: CompanyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub account_owner: Option<UserId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full post-update state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyUpdated {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub kind: CompanyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub account_owner: Option<UserId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDeleted {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRestored {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyEvent {
    CompanyCreated(CompanyCreated),
    CompanyUpdated(CompanyUpdated),
    CompanyDeleted(CompanyDeleted),
    CompanyRestored(CompanyRestored),
}

impl CompanyEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            CompanyEvent::CompanyCreated(e) => e.tenant_id,
            CompanyEvent::CompanyUpdated(e) => e.tenant_id,
            CompanyEvent::CompanyDeleted(e) => e.tenant_id,
            CompanyEvent::CompanyRestored(e) => e.tenant_id,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        match self {
            CompanyEvent::CompanyCreated(e) => e.company_id,
            CompanyEvent::CompanyUpdated(e) => e.company_id,
            CompanyEvent::CompanyDeleted(e) => e.company_id,
            CompanyEvent::CompanyRestored(e) => e.company_id,
        }
    }
}

impl Event for CompanyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::CompanyCreated(_) => "contacts.company.created",
            CompanyEvent::CompanyUpdated(_) => "contacts.company.updated",
            CompanyEvent::CompanyDeleted(_) => "contacts.company.deleted",
            CompanyEvent::CompanyRestored(_) => "contacts.company.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CompanyEvent::CompanyCreated(e) => e.occurred_at,
            CompanyEvent::CompanyUpdated(e) => e.occurred_at,
            CompanyEvent::CompanyDeleted(e) => e.occurred_at,
            CompanyEvent::CompanyRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Company {
    type Command = CompanyCommand;
    type Event = CompanyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CompanyEvent::CompanyCreated(e) => {
                self.id = e.company_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.account_owner = e.account_owner;
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            CompanyEvent::CompanyUpdated(e) => {
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.account_owner = e.account_owner;
                self.audit.touch(e.actor, e.occurred_at);
            }
            CompanyEvent::CompanyDeleted(e) => self.audit.mark_deleted(e.actor, e.occurred_at),
            CompanyEvent::CompanyRestored(e) => self.audit.restore(e.actor, e.occurred_at),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CompanyCommand::CreateCompany(cmd) => self.handle_create(cmd),
            CompanyCommand::UpdateCompany(cmd) => self.handle_update(cmd),
            CompanyCommand::DeleteCompany(cmd) => self.handle_delete(cmd),
            CompanyCommand::RestoreCompany(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Company {
    fn ensure_existing(&self, tenant_id: TenantId, company_id: CompanyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("company"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != company_id {
            return Err(DomainError::invariant("company_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("company already exists"));
        }
        let name = validated_name(&cmd.name)?;
        let contact = cmd.contact.normalized()?;

        Ok(vec![CompanyEvent::CompanyCreated(CompanyCreated {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            kind: cmd.kind,
            name,
            contact,
            account_owner: cmd.account_owner,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.company_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("company"));
        }

        let name = match &cmd.name {
            Some(n) => validated_name(n)?,
            None => self.name.clone(),
        };
        let contact = match &cmd.contact {
            Some(c) => c.normalized()?,
            None => self.contact.clone(),
        };

        Ok(vec![CompanyEvent::CompanyUpdated(CompanyUpdated {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            kind: cmd.kind.unwrap_or(self.kind),
            name,
            contact,
            account_owner: cmd.account_owner.or(self.account_owner),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.company_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("company is already deleted"));
        }
        Ok(vec![CompanyEvent::CompanyDeleted(CompanyDeleted {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.company_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("company is not deleted"));
        }
        Ok(vec![CompanyEvent::CompanyRestored(CompanyRestored {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validated_name(raw: &str) -> Result<String, DomainError> {
    blank_to_none(&Some(raw.to_string()))
        .ok_or_else(|| DomainError::validation("name cannot be empty"))
}
