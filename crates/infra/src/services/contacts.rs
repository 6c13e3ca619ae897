//! Companies and people.

use serde::Deserialize;

use nimbus_contacts::{
    Company, CompanyCommand, CompanyId, CompanyKind, ContactInfo, CreateCompany, CreatePerson,
    DeleteCompany, DeletePerson, Person, PersonCommand, PersonId, RestoreCompany, RestorePerson,
    UpdateCompany, UpdatePerson,
};
use nimbus_core::{AggregateRoot, TenantId, UserId};

use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCompany {
    pub kind: CompanyKind,
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub account_owner: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompanyChanges {
    pub kind: Option<CompanyKind>,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub account_owner: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPerson {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_id: Option<CompanyId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PersonChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_id: Option<CompanyId>,
}

pub struct ContactService<'a> {
    crm: &'a Crm,
}

fn company_shell(_: TenantId, id: nimbus_core::AggregateId) -> Company {
    Company::empty(CompanyId::new(id))
}

fn person_shell(_: TenantId, id: nimbus_core::AggregateId) -> Person {
    Person::empty(PersonId::new(id))
}

impl<'a> ContactService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub fn create_company(
        &self,
        ctx: &CommandContext,
        input: NewCompany,
    ) -> Result<Company, ServiceError> {
        let company_id = CompanyId::generate();
        self.send_company(
            ctx,
            company_id,
            CompanyCommand::CreateCompany(CreateCompany {
                tenant_id: ctx.tenant_id,
                company_id,
                kind: input.kind,
                name: input.name,
                contact: input.contact,
                account_owner: input.account_owner,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        let company = self.company(ctx.tenant_id, company_id)?;
        tracing::info!(tenant_id = %ctx.tenant_id, company_id = %company_id, kind = company.kind().as_str(), "company created");
        Ok(company)
    }

    pub fn update_company(
        &self,
        ctx: &CommandContext,
        company_id: CompanyId,
        changes: CompanyChanges,
    ) -> Result<Company, ServiceError> {
        self.send_company(
            ctx,
            company_id,
            CompanyCommand::UpdateCompany(UpdateCompany {
                tenant_id: ctx.tenant_id,
                company_id,
                kind: changes.kind,
                name: changes.name,
                contact: changes.contact,
                account_owner: changes.account_owner,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.company(ctx.tenant_id, company_id)
    }

    pub fn delete_company(&self, ctx: &CommandContext, company_id: CompanyId) -> Result<(), ServiceError> {
        self.send_company(
            ctx,
            company_id,
            CompanyCommand::DeleteCompany(DeleteCompany {
                tenant_id: ctx.tenant_id,
                company_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, company_id = %company_id, "company deleted");
        Ok(())
    }

    pub fn restore_company(
        &self,
        ctx: &CommandContext,
        company_id: CompanyId,
    ) -> Result<Company, ServiceError> {
        self.send_company(
            ctx,
            company_id,
            CompanyCommand::RestoreCompany(RestoreCompany {
                tenant_id: ctx.tenant_id,
                company_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.company(ctx.tenant_id, company_id)
    }

    /// A company as stored, deleted or not.
    pub fn company(&self, tenant_id: TenantId, company_id: CompanyId) -> Result<Company, ServiceError> {
        self.crm
            .read()
            .companies
            .get(tenant_id, company_id.0)
            .ok_or(ServiceError::NotFound("company"))
    }

    /// A company that exists and is not deleted.
    pub fn live_company(&self, tenant_id: TenantId, company_id: CompanyId) -> Result<Company, ServiceError> {
        self.company(tenant_id, company_id)
            .ok()
            .filter(|c| !c.is_deleted())
            .ok_or(ServiceError::NotFound("company"))
    }

    /// Non-deleted companies by name, optionally of one kind.
    pub fn list_companies(&self, tenant_id: TenantId, kind: Option<CompanyKind>) -> Vec<Company> {
        let mut out: Vec<_> = self
            .crm
            .read()
            .companies
            .list(tenant_id)
            .into_iter()
            .filter(|c| !c.is_deleted() && kind.is_none_or(|k| c.kind() == k))
            .collect();
        out.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    /// Case-insensitive exact name match among live companies.
    pub fn find_company_by_name(&self, tenant_id: TenantId, name: &str) -> Option<Company> {
        let wanted = name.trim().to_lowercase();
        self.list_companies(tenant_id, None)
            .into_iter()
            .find(|c| c.name().trim().to_lowercase() == wanted)
    }

    pub fn create_person(&self, ctx: &CommandContext, input: NewPerson) -> Result<Person, ServiceError> {
        if let Some(company_id) = input.company_id {
            self.live_company(ctx.tenant_id, company_id)?;
        }
        let person_id = PersonId::generate();
        self.send_person(
            ctx,
            person_id,
            PersonCommand::CreatePerson(CreatePerson {
                tenant_id: ctx.tenant_id,
                person_id,
                first_name: input.first_name,
                last_name: input.last_name,
                email: input.email,
                phone: input.phone,
                job_title: input.job_title,
                company_id: input.company_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, person_id = %person_id, "person created");
        self.person(ctx.tenant_id, person_id)
    }

    pub fn update_person(
        &self,
        ctx: &CommandContext,
        person_id: PersonId,
        changes: PersonChanges,
    ) -> Result<Person, ServiceError> {
        if let Some(company_id) = changes.company_id {
            self.live_company(ctx.tenant_id, company_id)?;
        }
        self.send_person(
            ctx,
            person_id,
            PersonCommand::UpdatePerson(UpdatePerson {
                tenant_id: ctx.tenant_id,
                person_id,
                first_name: changes.first_name,
                last_name: changes.last_name,
                email: changes.email,
                phone: changes.phone,
                job_title: changes.job_title,
                company_id: changes.company_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.person(ctx.tenant_id, person_id)
    }

    pub fn delete_person(&self, ctx: &CommandContext, person_id: PersonId) -> Result<(), ServiceError> {
        self.send_person(
            ctx,
            person_id,
            PersonCommand::DeletePerson(DeletePerson {
                tenant_id: ctx.tenant_id,
                person_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, person_id = %person_id, "person deleted");
        Ok(())
    }

    pub fn restore_person(&self, ctx: &CommandContext, person_id: PersonId) -> Result<Person, ServiceError> {
        self.send_person(
            ctx,
            person_id,
            PersonCommand::RestorePerson(RestorePerson {
                tenant_id: ctx.tenant_id,
                person_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.person(ctx.tenant_id, person_id)
    }

    pub fn person(&self, tenant_id: TenantId, person_id: PersonId) -> Result<Person, ServiceError> {
        self.crm
            .read()
            .people
            .get(tenant_id, person_id.0)
            .ok_or(ServiceError::NotFound("person"))
    }

    pub fn live_person(&self, tenant_id: TenantId, person_id: PersonId) -> Result<Person, ServiceError> {
        self.person(tenant_id, person_id)
            .ok()
            .filter(|p| !p.is_deleted())
            .ok_or(ServiceError::NotFound("person"))
    }

    /// Non-deleted people by last then first name, optionally of one company.
    pub fn list_people(&self, tenant_id: TenantId, company_id: Option<CompanyId>) -> Vec<Person> {
        let mut out: Vec<_> = self
            .crm
            .read()
            .people
            .list(tenant_id)
            .into_iter()
            .filter(|p| !p.is_deleted() && company_id.is_none_or(|c| p.company_id() == Some(c)))
            .collect();
        out.sort_by(|a, b| {
            (a.last_name().to_lowercase(), a.first_name().to_lowercase(), *a.id())
                .cmp(&(b.last_name().to_lowercase(), b.first_name().to_lowercase(), *b.id()))
        });
        out
    }

    fn send_company(
        &self,
        ctx: &CommandContext,
        company_id: CompanyId,
        command: CompanyCommand,
    ) -> Result<(), ServiceError> {
        self.crm
            .dispatcher()
            .dispatch(ctx.tenant_id, company_id.0, streams::COMPANY, command, company_shell)?;
        Ok(())
    }

    fn send_person(
        &self,
        ctx: &CommandContext,
        person_id: PersonId,
        command: PersonCommand,
    ) -> Result<(), ServiceError> {
        self.crm
            .dispatcher()
            .dispatch(ctx.tenant_id, person_id.0, streams::PERSON, command, person_shell)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;

    fn acme() -> NewCompany {
        NewCompany {
            kind: CompanyKind::Customer,
            name: "Acme".into(),
            contact: ContactInfo::default(),
            account_owner: None,
        }
    }

    fn jane(company_id: Option<CompanyId>) -> NewPerson {
        NewPerson {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: Some("Jane@Acme.com".into()),
            phone: None,
            job_title: None,
            company_id,
        }
    }

    #[test]
    fn deleted_companies_drop_out_of_listings_until_restored() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let svc = crm.contacts();
        let acme = svc.create_company(&ctx, acme()).unwrap();

        svc.delete_company(&ctx, *acme.id()).unwrap();
        assert!(svc.list_companies(ctx.tenant_id, None).is_empty());
        assert!(svc.company(ctx.tenant_id, *acme.id()).unwrap().is_deleted());

        svc.restore_company(&ctx, *acme.id()).unwrap();
        assert_eq!(svc.list_companies(ctx.tenant_id, Some(CompanyKind::Customer)).len(), 1);
        assert!(svc.list_companies(ctx.tenant_id, Some(CompanyKind::Supplier)).is_empty());
    }

    #[test]
    fn people_must_reference_a_live_company() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let svc = crm.contacts();

        let err = svc.create_person(&ctx, jane(Some(CompanyId::generate()))).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("company")));

        let acme = svc.create_company(&ctx, acme()).unwrap();
        let person = svc.create_person(&ctx, jane(Some(*acme.id()))).unwrap();
        assert_eq!(person.company_id(), Some(*acme.id()));
        assert_eq!(person.email(), Some("jane@acme.com"));
        assert_eq!(svc.list_people(ctx.tenant_id, Some(*acme.id())).len(), 1);
    }

    #[test]
    fn tenants_do_not_see_each_others_contacts() {
        let crm = Crm::in_memory(CrmSettings::default());
        let a = CommandContext::new(TenantId::new(), None);
        let b = CommandContext::new(TenantId::new(), None);
        let acme = crm.contacts().create_company(&a, acme()).unwrap();

        assert!(crm.contacts().list_companies(b.tenant_id, None).is_empty());
        assert!(crm.contacts().company(b.tenant_id, *acme.id()).is_err());
        assert!(crm.contacts().find_company_by_name(a.tenant_id, " ACME ").is_some());
    }
}
