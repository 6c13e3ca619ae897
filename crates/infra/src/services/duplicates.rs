//! Lead duplicate detection over the lead read model.

use nimbus_core::{AggregateRoot, TenantId};
use nimbus_pipeline::{
    DuplicateMatch, DuplicateQuery, FlagDuplicates, Lead, LeadCommand, LeadId, LeadProfile,
    ScoringWeights, rank_duplicates,
};

use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

pub struct LeadDuplicateDetectionService<'a> {
    crm: &'a Crm,
    weights: ScoringWeights,
}

impl<'a> LeadDuplicateDetectionService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self {
            crm,
            weights: ScoringWeights::default(),
        }
    }

    /// Ranked matches for `lead_id` among the tenant's other live leads.
    /// `query` falls back to the configured threshold and limit.
    pub fn find(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        query: Option<DuplicateQuery>,
    ) -> Result<Vec<DuplicateMatch>, ServiceError> {
        let query = query.unwrap_or(self.crm.settings().duplicates);
        let subject = self
            .crm
            .read()
            .leads
            .get(tenant_id, lead_id.0)
            .ok_or(ServiceError::NotFound("lead"))?;
        let subject = LeadProfile::from_details(lead_id, subject.details());

        let candidates: Vec<LeadProfile> = self
            .crm
            .read()
            .leads
            .list(tenant_id)
            .iter()
            .filter(|l| !l.is_deleted())
            .map(|l| LeadProfile::from_details(*l.id(), l.details()))
            .collect();

        Ok(rank_duplicates(&subject, &candidates, &query, &self.weights)?)
    }

    /// [`find`](Self::find) that never fails: errors are logged and read as
    /// "no duplicates".
    pub fn try_find(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        query: Option<DuplicateQuery>,
    ) -> Vec<DuplicateMatch> {
        match self.find(tenant_id, lead_id, query) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(tenant_id = %tenant_id, lead_id = %lead_id, error = %err, "duplicate detection failed");
                Vec::new()
            }
        }
    }

    /// Runs detection and records any matches on the lead. Best effort.
    pub fn flag(&self, ctx: &CommandContext, lead_id: LeadId) -> Vec<DuplicateMatch> {
        let matches = self.try_find(ctx.tenant_id, lead_id, None);
        if matches.is_empty() {
            return matches;
        }
        let result = self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            lead_id.0,
            streams::LEAD,
            LeadCommand::FlagDuplicates(FlagDuplicates {
                tenant_id: ctx.tenant_id,
                lead_id,
                matches: matches.clone(),
                occurred_at: ctx.now,
            }),
            |_, id| Lead::empty(LeadId::new(id)),
        );
        match result {
            Ok(_) => {
                tracing::info!(tenant_id = %ctx.tenant_id, lead_id = %lead_id, matches = matches.len(), "duplicates flagged");
            }
            Err(err) => {
                tracing::warn!(tenant_id = %ctx.tenant_id, lead_id = %lead_id, error = %err, "could not record duplicates");
            }
        }
        matches
    }
}
