//! Lead capture, qualification and conversion.

use serde::Deserialize;

use nimbus_contacts::{Company, CompanyKind, ContactInfo, Person};
use nimbus_core::{AggregateRoot, TenantId};
use nimbus_custom_fields::{CustomFieldEntity, CustomFieldValues};
use nimbus_pipeline::{
    ChangeLeadStatus, ConvertLead, CreateLead, DeleteLead, Lead, LeadCommand, LeadConversion,
    LeadDetails, LeadId, LeadStatus, Opportunity, RestoreLead, UpdateLead,
};

use super::contacts::{NewCompany, NewPerson};
use super::opportunities::NewOpportunity;
use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

/// Everything a conversion produced.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub lead: Lead,
    pub company: Option<Company>,
    pub person: Person,
    pub opportunity: Opportunity,
    pub conversion: LeadConversion,
    /// `false` when the lead was linked to an existing same-name company.
    pub company_created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConvertOptions {
    pub opportunity_name: Option<String>,
}

pub struct LeadService<'a> {
    crm: &'a Crm,
}

impl<'a> LeadService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    /// Creates the lead and then flags likely duplicates. Detection problems
    /// never fail the create.
    pub fn create(&self, ctx: &CommandContext, details: LeadDetails) -> Result<Lead, ServiceError> {
        let lead_id = LeadId::generate();
        self.send(
            ctx,
            lead_id,
            LeadCommand::CreateLead(CreateLead {
                tenant_id: ctx.tenant_id,
                lead_id,
                details,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, lead_id = %lead_id, "lead created");
        self.crm.duplicates().flag(ctx, lead_id);
        self.get(ctx.tenant_id, lead_id)
    }

    pub fn update(
        &self,
        ctx: &CommandContext,
        lead_id: LeadId,
        details: LeadDetails,
    ) -> Result<Lead, ServiceError> {
        self.send(
            ctx,
            lead_id,
            LeadCommand::UpdateLead(UpdateLead {
                tenant_id: ctx.tenant_id,
                lead_id,
                details,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, lead_id)
    }

    pub fn change_status(
        &self,
        ctx: &CommandContext,
        lead_id: LeadId,
        status: LeadStatus,
    ) -> Result<Lead, ServiceError> {
        self.send(
            ctx,
            lead_id,
            LeadCommand::ChangeLeadStatus(ChangeLeadStatus {
                tenant_id: ctx.tenant_id,
                lead_id,
                status,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, lead_id = %lead_id, status = status.as_str(), "lead status changed");
        self.get(ctx.tenant_id, lead_id)
    }

    pub fn delete(&self, ctx: &CommandContext, lead_id: LeadId) -> Result<(), ServiceError> {
        self.send(
            ctx,
            lead_id,
            LeadCommand::DeleteLead(DeleteLead {
                tenant_id: ctx.tenant_id,
                lead_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, lead_id = %lead_id, "lead deleted");
        Ok(())
    }

    pub fn restore(&self, ctx: &CommandContext, lead_id: LeadId) -> Result<Lead, ServiceError> {
        self.send(
            ctx,
            lead_id,
            LeadCommand::RestoreLead(RestoreLead {
                tenant_id: ctx.tenant_id,
                lead_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, lead_id)
    }

    pub fn get(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<Lead, ServiceError> {
        self.crm
            .read()
            .leads
            .get(tenant_id, lead_id.0)
            .ok_or(ServiceError::NotFound("lead"))
    }

    /// Live leads, newest first.
    pub fn list(&self, tenant_id: TenantId, status: Option<LeadStatus>) -> Vec<Lead> {
        let mut out: Vec<_> = self
            .crm
            .read()
            .leads
            .list(tenant_id)
            .into_iter()
            .filter(|l| !l.is_deleted() && status.is_none_or(|s| l.status() == s))
            .collect();
        out.sort_by(|a, b| {
            b.audit()
                .created_at
                .cmp(&a.audit().created_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    /// Turns a lead into a company (unless one with the same name exists), a
    /// person and an opportunity, then marks it converted. The records are
    /// written one after another; a failure part way leaves the earlier ones.
    pub fn convert(
        &self,
        ctx: &CommandContext,
        lead_id: LeadId,
        options: ConvertOptions,
    ) -> Result<ConversionResult, ServiceError> {
        let lead = self.get(ctx.tenant_id, lead_id)?;
        if lead.is_deleted() {
            return Err(ServiceError::NotFound("lead"));
        }
        if !lead.status().can_convert() {
            return Err(ServiceError::InvariantViolation(format!(
                "cannot convert a lead in status {}",
                lead.status().as_str()
            )));
        }
        self.crm.custom_fields().validate_initial(
            ctx.tenant_id,
            CustomFieldEntity::Opportunity,
            &CustomFieldValues::new(),
        )?;

        let details = lead.details().clone();
        let contacts = self.crm.contacts();

        let (company, company_created) = match details.company_name.as_deref() {
            Some(name) => match contacts.find_company_by_name(ctx.tenant_id, name) {
                Some(existing) => (Some(existing), false),
                None => {
                    let created = contacts.create_company(
                        ctx,
                        NewCompany {
                            kind: CompanyKind::Prospect,
                            name: name.to_string(),
                            contact: ContactInfo {
                                email: details.email.clone(),
                                phone: details.phone.clone(),
                                ..ContactInfo::default()
                            },
                            account_owner: ctx.actor,
                        },
                    )?;
                    (Some(created), true)
                }
            },
            None => (None, false),
        };
        let company_id = company.as_ref().map(|c| *c.id());

        let person = contacts.create_person(
            ctx,
            NewPerson {
                first_name: details.first_name.clone(),
                last_name: details.last_name.clone(),
                email: details.email.clone(),
                phone: details.phone.clone(),
                job_title: None,
                company_id,
            },
        )?;

        let opportunity_name = options
            .opportunity_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| match &details.company_name {
                Some(c) => format!("{c} - {}", details.full_name()),
                None => details.full_name(),
            });
        let opportunity = self.crm.opportunities().create_from_lead(
            ctx,
            NewOpportunity {
                name: opportunity_name,
                company_id,
                contact_id: Some(*person.id()),
                custom_fields: CustomFieldValues::new(),
            },
            lead_id,
        )?;

        let conversion = LeadConversion {
            company_id,
            person_id: *person.id(),
            opportunity_id: *opportunity.id(),
        };
        self.send(
            ctx,
            lead_id,
            LeadCommand::ConvertLead(ConvertLead {
                tenant_id: ctx.tenant_id,
                lead_id,
                conversion,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            lead_id = %lead_id,
            opportunity_id = %conversion.opportunity_id,
            company_created,
            "lead converted"
        );

        Ok(ConversionResult {
            lead: self.get(ctx.tenant_id, lead_id)?,
            company,
            person,
            opportunity,
            conversion,
            company_created,
        })
    }

    fn send(&self, ctx: &CommandContext, lead_id: LeadId, command: LeadCommand) -> Result<(), ServiceError> {
        self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            lead_id.0,
            streams::LEAD,
            command,
            |_, id| Lead::empty(LeadId::new(id)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;

    fn details(first: &str, last: &str, company: Option<&str>, email: Option<&str>) -> LeadDetails {
        LeadDetails {
            first_name: first.into(),
            last_name: last.into(),
            company_name: company.map(str::to_string),
            email: email.map(str::to_string),
            ..LeadDetails::default()
        }
    }

    #[test]
    fn second_matching_lead_is_flagged() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let first = crm
            .leads()
            .create(&ctx, details("Jane", "Doe", Some("Acme"), Some("jane@acme.com")))
            .unwrap();
        assert!(first.duplicates().is_empty());

        let second = crm
            .leads()
            .create(&ctx, details("Jane", "Doe", None, Some("JANE@acme.com")))
            .unwrap();
        assert_eq!(second.duplicates().len(), 1);
        assert_eq!(second.duplicates()[0].lead_id, *first.id());
        assert!(second.duplicates()[0].score >= 60.0);
    }

    #[test]
    fn deleted_leads_are_not_candidates() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let first = crm
            .leads()
            .create(&ctx, details("Jane", "Doe", None, Some("jane@acme.com")))
            .unwrap();
        crm.leads().delete(&ctx, *first.id()).unwrap();

        let second = crm
            .leads()
            .create(&ctx, details("Jane", "Doe", None, Some("jane@acme.com")))
            .unwrap();
        assert!(second.duplicates().is_empty());
        assert_eq!(crm.leads().list(ctx.tenant_id, None).len(), 1);
    }

    #[test]
    fn invalid_query_reads_as_no_duplicates() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let lead = crm.leads().create(&ctx, details("Jane", "Doe", None, None)).unwrap();
        let bad = nimbus_pipeline::DuplicateQuery { threshold: 150.0, limit: 5 };

        assert!(crm.duplicates().find(ctx.tenant_id, *lead.id(), Some(bad)).is_err());
        assert!(crm.duplicates().try_find(ctx.tenant_id, *lead.id(), Some(bad)).is_empty());
    }

    #[test]
    fn conversion_reuses_a_same_name_company() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let acme = crm
            .contacts()
            .create_company(
                &ctx,
                NewCompany {
                    kind: CompanyKind::Customer,
                    name: "Acme".into(),
                    contact: ContactInfo::default(),
                    account_owner: None,
                },
            )
            .unwrap();
        let lead = crm
            .leads()
            .create(&ctx, details("Jane", "Doe", Some("acme"), Some("jane@acme.com")))
            .unwrap();

        let result = crm.leads().convert(&ctx, *lead.id(), ConvertOptions::default()).unwrap();
        assert!(!result.company_created);
        assert_eq!(result.conversion.company_id, Some(*acme.id()));
        assert_eq!(result.lead.status(), LeadStatus::Converted);
        assert_eq!(result.opportunity.source_lead(), Some(*lead.id()));
        assert_eq!(result.person.company_id(), Some(*acme.id()));

        let again = crm.leads().convert(&ctx, *lead.id(), ConvertOptions::default());
        assert!(matches!(again, Err(ServiceError::InvariantViolation(_))));
    }

    #[test]
    fn unqualified_leads_cannot_convert() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let lead = crm.leads().create(&ctx, details("Bob", "Stone", None, None)).unwrap();
        crm.leads().change_status(&ctx, *lead.id(), LeadStatus::Unqualified).unwrap();

        let err = crm.leads().convert(&ctx, *lead.id(), ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ServiceError::InvariantViolation(_)));
        assert!(crm.contacts().list_people(ctx.tenant_id, None).is_empty());
    }
}
