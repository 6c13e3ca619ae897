use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_core::{
    Aggregate, AggregateRoot, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_events::Event;

use crate::company::CompanyId;
use crate::contact::{blank_to_none, normalize_email};

record_id!(
    /// Individual contact, optionally attached to a company.
    PersonId
);

/// Aggregate root: Person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    id: PersonId,
    tenant_id: Option<TenantId>,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    job_title: Option<String>,
    company_id: Option<CompanyId>,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl Person {
    pub fn empty(id: PersonId) -> Self {
        Self {
            id,
            tenant_id: None,
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            phone: None,
            job_title: None,
            company_id: None,
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// "First Last", or whichever half is present.
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn job_title(&self) -> Option<&str> {
        self.job_title.as_deref()
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }
}

pub fn full_name(first: &str, last: &str) -> String {
    match (first.trim(), last.trim()) {
        ("", l) => l.to_string(),
        (f, "") => f.to_string(),
        (f, l) => format!("{f} {l}"),
    }
}

impl AggregateRoot for Person {
    type Id = PersonId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePerson {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_id: Option<CompanyId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePerson {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_id: Option<CompanyId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePerson {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePerson {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonCommand {
    CreatePerson(CreatePerson),
    UpdatePerson(UpdatePerson),
    DeletePerson(DeletePerson),
    RestorePerson(RestorePerson),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonCreated {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_id: Option<CompanyId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonUpdated {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_id: Option<CompanyId>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDeleted {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRestored {
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonEvent {
    PersonCreated(PersonCreated),
    PersonUpdated(PersonUpdated),
    PersonDeleted(PersonDeleted),
    PersonRestored(PersonRestored),
}

impl PersonEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            PersonEvent::PersonCreated(e) => e.tenant_id,
            PersonEvent::PersonUpdated(e) => e.tenant_id,
            PersonEvent::PersonDeleted(e) => e.tenant_id,
            PersonEvent::PersonRestored(e) => e.tenant_id,
        }
    }

    pub fn person_id(&self) -> PersonId {
        match self {
            PersonEvent::PersonCreated(e) => e.person_id,
            PersonEvent::PersonUpdated(e) => e.person_id,
            PersonEvent::PersonDeleted(e) => e.person_id,
            PersonEvent::PersonRestored(e) => e.person_id,
        }
    }
}

impl Event for PersonEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PersonEvent::PersonCreated(_) => "contacts.person.created",
            PersonEvent::PersonUpdated(_) => "contacts.person.updated",
            PersonEvent::PersonDeleted(_) => "contacts.person.deleted",
            PersonEvent::PersonRestored(_) => "contacts.person.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PersonEvent::PersonCreated(e) => e.occurred_at,
            PersonEvent::PersonUpdated(e) => e.occurred_at,
            PersonEvent::PersonDeleted(e) => e.occurred_at,
            PersonEvent::PersonRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Person {
    type Command = PersonCommand;
    type Event = PersonEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PersonEvent::PersonCreated(e) => {
                self.id = e.person_id;
                self.tenant_id = Some(e.tenant_id);
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.email = e.email.clone();
                self.phone = e.phone.clone();
                self.job_title = e.job_title.clone();
                self.company_id = e.company_id;
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            PersonEvent::PersonUpdated(e) => {
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.email = e.email.clone();
                self.phone = e.phone.clone();
                self.job_title = e.job_title.clone();
                self.company_id = e.company_id;
                self.audit.touch(e.actor, e.occurred_at);
            }
            PersonEvent::PersonDeleted(e) => self.audit.mark_deleted(e.actor, e.occurred_at),
            PersonEvent::PersonRestored(e) => self.audit.restore(e.actor, e.occurred_at),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PersonCommand::CreatePerson(cmd) => self.handle_create(cmd),
            PersonCommand::UpdatePerson(cmd) => self.handle_update(cmd),
            PersonCommand::DeletePerson(cmd) => self.handle_delete(cmd),
            PersonCommand::RestorePerson(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Person {
    fn ensure_existing(&self, tenant_id: TenantId, person_id: PersonId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("person"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != person_id {
            return Err(DomainError::invariant("person_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePerson) -> Result<Vec<PersonEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("person already exists"));
        }
        let first_name = cmd.first_name.trim().to_string();
        let last_name = cmd.last_name.trim().to_string();
        ensure_named(&first_name, &last_name)?;

        Ok(vec![PersonEvent::PersonCreated(PersonCreated {
            tenant_id: cmd.tenant_id,
            person_id: cmd.person_id,
            first_name,
            last_name,
            email: optional_email(&cmd.email)?,
            phone: blank_to_none(&cmd.phone),
            job_title: blank_to_none(&cmd.job_title),
            company_id: cmd.company_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdatePerson) -> Result<Vec<PersonEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.person_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("person"));
        }

        let first_name = cmd
            .first_name
            .as_deref()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| self.first_name.clone());
        let last_name = cmd
            .last_name
            .as_deref()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| self.last_name.clone());
        ensure_named(&first_name, &last_name)?;

        let email = match &cmd.email {
            Some(_) => optional_email(&cmd.email)?,
            None => self.email.clone(),
        };

        Ok(vec![PersonEvent::PersonUpdated(PersonUpdated {
            tenant_id: cmd.tenant_id,
            person_id: cmd.person_id,
            first_name,
            last_name,
            email,
            phone: blank_to_none(&cmd.phone).or_else(|| self.phone.clone()),
            job_title: blank_to_none(&cmd.job_title).or_else(|| self.job_title.clone()),
            company_id: cmd.company_id.or(self.company_id),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeletePerson) -> Result<Vec<PersonEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.person_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("person is already deleted"));
        }
        Ok(vec![PersonEvent::PersonDeleted(PersonDeleted {
            tenant_id: cmd.tenant_id,
            person_id: cmd.person_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestorePerson) -> Result<Vec<PersonEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.person_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("person is not deleted"));
        }
        Ok(vec![PersonEvent::PersonRestored(PersonRestored {
            tenant_id: cmd.tenant_id,
            person_id: cmd.person_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn ensure_named(first: &str, last: &str) -> Result<(), DomainError> {
    if first.is_empty() && last.is_empty() {
        return Err(DomainError::validation("first or last name is required"));
    }
    Ok(())
}

fn optional_email(raw: &Option<String>) -> Result<Option<String>, DomainError> {
    blank_to_none(raw).map(|e| normalize_email(&e)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(tenant_id: TenantId, person_id: PersonId) -> PersonCommand {
        PersonCommand::CreatePerson(CreatePerson {
            tenant_id,
            person_id,
            first_name: " Jane ".into(),
            last_name: "Doe".into(),
            email: Some("JANE@acme.com".into()),
            phone: Some("".into()),
            job_title: Some("CTO".into()),
            company_id: Some(CompanyId::generate()),
            actor: None,
            occurred_at: Utc::now(),
        })
    }

    fn created() -> (Person, TenantId, PersonId) {
        let tenant_id = TenantId::new();
        let person_id = PersonId::generate();
        let mut person = Person::empty(person_id);
        for e in person.handle(&create(tenant_id, person_id)).unwrap() {
            person.apply(&e);
        }
        (person, tenant_id, person_id)
    }

    #[test]
    fn create_normalizes_fields() {
        let (person, _, _) = created();
        assert_eq!(person.full_name(), "Jane Doe");
        assert_eq!(person.email(), Some("jane@acme.com"));
        assert_eq!(person.phone(), None);
        assert_eq!(person.job_title(), Some("CTO"));
        assert_eq!(person.version(), 1);
    }

    #[test]
    fn name_is_required() {
        let person = Person::empty(PersonId::generate());
        let cmd = PersonCommand::CreatePerson(CreatePerson {
            tenant_id: TenantId::new(),
            person_id: PersonId::generate(),
            first_name: " ".into(),
            last_name: "".into(),
            email: None,
            phone: None,
            job_title: None,
            company_id: None,
            actor: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(person.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn update_merges_with_current_state() {
        let (mut person, tenant_id, person_id) = created();
        let events = person
            .handle(&PersonCommand::UpdatePerson(UpdatePerson {
                tenant_id,
                person_id,
                first_name: None,
                last_name: Some("Smith".into()),
                email: None,
                phone: Some("555-0100".into()),
                job_title: None,
                company_id: None,
                actor: Some(UserId::new()),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        person.apply(&events[0]);
        assert_eq!(person.full_name(), "Jane Smith");
        assert_eq!(person.email(), Some("jane@acme.com"));
        assert_eq!(person.phone(), Some("555-0100"));
        assert!(person.audit().updated_by.is_some());
    }

    #[test]
    fn deleted_person_is_read_only() {
        let (mut person, tenant_id, person_id) = created();
        let events = person
            .handle(&PersonCommand::DeletePerson(DeletePerson {
                tenant_id,
                person_id,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        person.apply(&events[0]);

        let err = person
            .handle(&PersonCommand::UpdatePerson(UpdatePerson {
                tenant_id,
                person_id,
                first_name: Some("J".into()),
                last_name: None,
                email: None,
                phone: None,
                job_title: None,
                company_id: None,
                actor: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::deleted("person"));
    }

    #[test]
    fn full_name_handles_missing_halves() {
        assert_eq!(full_name("", "Doe"), "Doe");
        assert_eq!(full_name("Jane", " "), "Jane");
    }
}
