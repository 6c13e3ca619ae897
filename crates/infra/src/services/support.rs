//! Support cases with per-tenant case numbers.

use nimbus_core::{AggregateRoot, TenantId, UserId};
use nimbus_support::{
    AssignCase, CaseDetails, CaseStatus, ChangeCaseStatus, DeleteCase, OpenCase, ReopenCase,
    ResolveCase, RestoreCase, SupportCase, SupportCaseCommand, SupportCaseId, UpdateCaseDetails,
    format_case_number,
};

use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

pub type NewCase = CaseDetails;

pub struct SupportCaseService<'a> {
    crm: &'a Crm,
}

impl<'a> SupportCaseService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub fn open(&self, ctx: &CommandContext, details: NewCase) -> Result<SupportCase, ServiceError> {
        self.check_links(ctx.tenant_id, &details)?;
        let case_id = SupportCaseId::generate();
        let case_number = format_case_number(self.crm.next_case_sequence(ctx.tenant_id)?);
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::OpenCase(OpenCase {
                tenant_id: ctx.tenant_id,
                case_id,
                case_number: case_number.clone(),
                details,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, case_id = %case_id, case_number = %case_number, "support case opened");
        self.get(ctx.tenant_id, case_id)
    }

    pub fn update_details(
        &self,
        ctx: &CommandContext,
        case_id: SupportCaseId,
        details: CaseDetails,
    ) -> Result<SupportCase, ServiceError> {
        self.check_links(ctx.tenant_id, &details)?;
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::UpdateCaseDetails(UpdateCaseDetails {
                tenant_id: ctx.tenant_id,
                case_id,
                details,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, case_id)
    }

    pub fn assign(
        &self,
        ctx: &CommandContext,
        case_id: SupportCaseId,
        assignee: UserId,
    ) -> Result<SupportCase, ServiceError> {
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::AssignCase(AssignCase {
                tenant_id: ctx.tenant_id,
                case_id,
                assignee,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, case_id = %case_id, assignee = %assignee, "support case assigned");
        self.get(ctx.tenant_id, case_id)
    }

    pub fn change_status(
        &self,
        ctx: &CommandContext,
        case_id: SupportCaseId,
        to: CaseStatus,
    ) -> Result<SupportCase, ServiceError> {
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::ChangeCaseStatus(ChangeCaseStatus {
                tenant_id: ctx.tenant_id,
                case_id,
                to,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, case_id = %case_id, status = to.as_str(), "support case status changed");
        self.get(ctx.tenant_id, case_id)
    }

    pub fn resolve(
        &self,
        ctx: &CommandContext,
        case_id: SupportCaseId,
        resolution: String,
    ) -> Result<SupportCase, ServiceError> {
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::ResolveCase(ResolveCase {
                tenant_id: ctx.tenant_id,
                case_id,
                resolution,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, case_id = %case_id, "support case resolved");
        self.get(ctx.tenant_id, case_id)
    }

    pub fn reopen(&self, ctx: &CommandContext, case_id: SupportCaseId) -> Result<SupportCase, ServiceError> {
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::ReopenCase(ReopenCase {
                tenant_id: ctx.tenant_id,
                case_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, case_id = %case_id, "support case reopened");
        self.get(ctx.tenant_id, case_id)
    }

    pub fn delete(&self, ctx: &CommandContext, case_id: SupportCaseId) -> Result<(), ServiceError> {
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::DeleteCase(DeleteCase {
                tenant_id: ctx.tenant_id,
                case_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, case_id = %case_id, "support case deleted");
        Ok(())
    }

    pub fn restore(&self, ctx: &CommandContext, case_id: SupportCaseId) -> Result<SupportCase, ServiceError> {
        self.send(
            ctx,
            case_id,
            SupportCaseCommand::RestoreCase(RestoreCase {
                tenant_id: ctx.tenant_id,
                case_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, case_id)
    }

    pub fn get(&self, tenant_id: TenantId, case_id: SupportCaseId) -> Result<SupportCase, ServiceError> {
        self.crm
            .read()
            .support_cases
            .get(tenant_id, case_id.0)
            .ok_or(ServiceError::NotFound("support case"))
    }

    /// Live cases by case number, optionally filtered.
    pub fn list(
        &self,
        tenant_id: TenantId,
        status: Option<CaseStatus>,
        assignee: Option<UserId>,
    ) -> Vec<SupportCase> {
        let mut out: Vec<_> = self
            .crm
            .read()
            .support_cases
            .list(tenant_id)
            .into_iter()
            .filter(|c| {
                !c.is_deleted()
                    && status.is_none_or(|s| c.status() == s)
                    && assignee.is_none_or(|u| c.assignee() == Some(u))
            })
            .collect();
        out.sort_by(|a, b| {
            a.case_number()
                .cmp(b.case_number())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    fn check_links(&self, tenant_id: TenantId, details: &CaseDetails) -> Result<(), ServiceError> {
        let contacts = self.crm.contacts();
        if let Some(id) = details.company_id {
            contacts.live_company(tenant_id, id)?;
        }
        if let Some(id) = details.contact_id {
            contacts.live_person(tenant_id, id)?;
        }
        Ok(())
    }

    fn send(
        &self,
        ctx: &CommandContext,
        case_id: SupportCaseId,
        command: SupportCaseCommand,
    ) -> Result<(), ServiceError> {
        self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            case_id.0,
            streams::SUPPORT_CASE,
            command,
            |_, id| SupportCase::empty(SupportCaseId::new(id)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;

    fn printer_jam() -> CaseDetails {
        CaseDetails {
            subject: "Printer jams".into(),
            ..CaseDetails::default()
        }
    }

    #[test]
    fn case_numbers_count_up_per_tenant() {
        let crm = Crm::in_memory(CrmSettings::default());
        let a = CommandContext::new(TenantId::new(), None);
        let b = CommandContext::new(TenantId::new(), None);

        assert_eq!(crm.support().open(&a, printer_jam()).unwrap().case_number(), "CS-000001");
        assert_eq!(crm.support().open(&a, printer_jam()).unwrap().case_number(), "CS-000002");
        assert_eq!(crm.support().open(&b, printer_jam()).unwrap().case_number(), "CS-000001");
    }

    #[test]
    fn counter_resumes_after_replay() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        crm.support().open(&ctx, printer_jam()).unwrap();
        crm.support().open(&ctx, printer_jam()).unwrap();

        crm.replay().unwrap();
        assert_eq!(crm.support().open(&ctx, printer_jam()).unwrap().case_number(), "CS-000003");
    }

    #[test]
    fn resolve_then_reopen_returns_to_in_progress() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let agent = UserId::new();
        let case = crm.support().open(&ctx, printer_jam()).unwrap();

        crm.support().assign(&ctx, *case.id(), agent).unwrap();
        let resolved = crm.support().resolve(&ctx, *case.id(), "Replaced roller".into()).unwrap();
        assert_eq!(resolved.status(), CaseStatus::Resolved);
        assert_eq!(resolved.resolution(), Some("Replaced roller"));

        let reopened = crm.support().reopen(&ctx, *case.id()).unwrap();
        assert_eq!(reopened.status(), CaseStatus::InProgress);
        assert_eq!(crm.support().list(ctx.tenant_id, None, Some(agent)).len(), 1);
    }
}
