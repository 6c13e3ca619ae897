//! Application services: the write paths that need more than one record
//! (uniqueness, references, hierarchy) and the derived read paths
//! (metrics, duplicates, effective access).
//!
//! Services borrow a [`Crm`]; obtain them through its accessors.

pub mod contacts;
pub mod custom_fields;
pub mod duplicates;
pub mod leads;
pub mod metrics;
pub mod opportunities;
pub mod purchasing;
pub mod security_groups;
pub mod support;

use thiserror::Error;

use nimbus_core::DomainError;
use nimbus_security::HierarchyError;

use crate::command_dispatcher::DispatchError;
use crate::crm::Crm;
use crate::event_store::EventStoreError;
use crate::projections::ProjectionError;

pub use contacts::{CompanyChanges, ContactService, NewCompany, NewPerson, PersonChanges};
pub use custom_fields::{CustomFieldChanges, CustomFieldService, NewCustomField};
pub use duplicates::LeadDuplicateDetectionService;
pub use leads::{ConversionResult, ConvertOptions, LeadService};
pub use metrics::OpportunityMetricsService;
pub use opportunities::{NewOpportunity, OpportunityChanges, OpportunityService};
pub use purchasing::{NewPurchaseOrder, PurchaseOrderService};
pub use security_groups::{GroupChanges, GroupNode, NewGroup, ParentChange, SecurityGroupService};
pub use support::{NewCase, SupportCaseService};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => ServiceError::Validation(msg),
            DispatchError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DispatchError::Conflict(msg) => ServiceError::Conflict(msg),
            DispatchError::NotFound(kind) => ServiceError::NotFound(kind),
            other => ServiceError::Dispatch(other),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        DispatchError::from(value).into()
    }
}

impl From<HierarchyError> for ServiceError {
    fn from(value: HierarchyError) -> Self {
        DomainError::from(value).into()
    }
}

impl Crm {
    pub fn custom_fields(&self) -> CustomFieldService<'_> {
        CustomFieldService::new(self)
    }

    pub fn contacts(&self) -> ContactService<'_> {
        ContactService::new(self)
    }

    pub fn leads(&self) -> LeadService<'_> {
        LeadService::new(self)
    }

    pub fn duplicates(&self) -> LeadDuplicateDetectionService<'_> {
        LeadDuplicateDetectionService::new(self)
    }

    pub fn opportunities(&self) -> OpportunityService<'_> {
        OpportunityService::new(self)
    }

    pub fn metrics(&self) -> OpportunityMetricsService<'_> {
        OpportunityMetricsService::new(self)
    }

    pub fn purchase_orders(&self) -> PurchaseOrderService<'_> {
        PurchaseOrderService::new(self)
    }

    pub fn support(&self) -> SupportCaseService<'_> {
        SupportCaseService::new(self)
    }

    pub fn security_groups(&self) -> SecurityGroupService<'_> {
        SecurityGroupService::new(self)
    }
}
