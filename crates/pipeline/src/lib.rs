//! Sales pipeline domain module: leads, opportunities, metrics and
//! duplicate scoring.
//!
//! Pure business rules: no IO, no HTTP, no storage.

pub mod duplicates;
pub mod lead;
pub mod metrics;
pub mod opportunity;
pub mod similarity;

pub use duplicates::{
    DuplicateMatch, DuplicateQuery, LeadProfile, ScoringWeights, duplicate_score, rank_duplicates,
};
pub use lead::{
    ChangeLeadStatus, ConvertLead, CreateLead, DeleteLead, DuplicatesFlagged, FlagDuplicates,
    Lead, LeadCommand, LeadConversion, LeadConverted, LeadCreated, LeadDeleted, LeadDetails,
    LeadEvent, LeadId, LeadRestored, LeadStatus, LeadStatusChanged, LeadUpdated, RestoreLead,
    UpdateLead,
};
pub use metrics::{
    CurrencyTotal, MetricsInput, OpportunityMetrics, PipelineSummary, StageSummary,
    standard_opportunity_fields, summarize_pipeline,
};
pub use opportunity::{
    CreateOpportunity, CustomFieldValuesChanged, DeleteOpportunity, Opportunity,
    OpportunityCommand, OpportunityCreated, OpportunityDeleted, OpportunityEvent, OpportunityId,
    OpportunityRestored, OpportunityUpdated, RestoreOpportunity, SetCustomFieldValues,
    UpdateOpportunity,
};
