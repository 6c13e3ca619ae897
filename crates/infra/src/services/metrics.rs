//! Derived opportunity figures and the pipeline dashboard.

use nimbus_core::TenantId;
use nimbus_custom_fields::{CustomFieldDefinition, CustomFieldEntity};
use nimbus_pipeline::metrics::{STAGE_FIELD, is_open_stage};
use nimbus_pipeline::{
    MetricsInput, Opportunity, OpportunityId, OpportunityMetrics, PipelineSummary,
    standard_opportunity_fields, summarize_pipeline,
};

use super::ServiceError;
use crate::crm::{CommandContext, Crm};

pub struct OpportunityMetricsService<'a> {
    crm: &'a Crm,
}

impl<'a> OpportunityMetricsService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    pub fn metrics(
        &self,
        tenant_id: TenantId,
        opportunity_id: OpportunityId,
    ) -> Result<OpportunityMetrics, ServiceError> {
        let opportunity = self.crm.opportunities().get(tenant_id, opportunity_id)?;
        let definitions = self.definitions(tenant_id);
        Ok(compute(&opportunity, &definitions))
    }

    /// Open (not closed won/lost) live opportunities grouped by stage.
    pub fn pipeline_summary(&self, tenant_id: TenantId) -> PipelineSummary {
        let definitions = self.definitions(tenant_id);
        let stage_order: Vec<String> = definitions
            .iter()
            .find(|d| d.code == STAGE_FIELD)
            .map(|d| d.options.iter().map(|o| o.label.clone()).collect())
            .unwrap_or_default();

        let open: Vec<OpportunityMetrics> = self
            .crm
            .opportunities()
            .list(tenant_id)
            .iter()
            .filter(|o| {
                let input = input_for(o, &definitions);
                is_open_stage(input.stage_value())
            })
            .map(|o| compute(o, &definitions))
            .collect();

        summarize_pipeline(&open, &stage_order)
    }

    /// Registers any of the standard opportunity fields the tenant lacks.
    /// Returns the ones created by this call.
    pub fn ensure_default_fields(
        &self,
        ctx: &CommandContext,
    ) -> Result<Vec<CustomFieldDefinition>, ServiceError> {
        let registry = self.crm.custom_fields();
        let mut created = Vec::new();
        for definition in standard_opportunity_fields(ctx.tenant_id, ctx.now)? {
            if registry
                .find(ctx.tenant_id, CustomFieldEntity::Opportunity, &definition.code)
                .is_none()
            {
                created.push(registry.register(ctx, definition)?);
            }
        }
        if !created.is_empty() {
            tracing::info!(tenant_id = %ctx.tenant_id, fields = created.len(), "default opportunity fields registered");
        }
        Ok(created)
    }

    fn definitions(&self, tenant_id: TenantId) -> Vec<CustomFieldDefinition> {
        self.crm
            .custom_fields()
            .list(tenant_id, CustomFieldEntity::Opportunity)
    }
}

fn input_for<'a>(
    opportunity: &'a Opportunity,
    definitions: &'a [CustomFieldDefinition],
) -> MetricsInput<'a> {
    MetricsInput {
        values: opportunity.custom_fields(),
        definitions,
        created_at: opportunity.audit().created_at,
    }
}

fn compute(opportunity: &Opportunity, definitions: &[CustomFieldDefinition]) -> OpportunityMetrics {
    input_for(opportunity, definitions).compute()
}
