//! Record projections for every aggregate type, and the stream names they
//! are stored under.

use nimbus_contacts::{Company, CompanyEvent, CompanyId, Person, PersonEvent, PersonId};
use nimbus_core::{AggregateId, TenantId};
use nimbus_custom_fields::{CustomField, CustomFieldEvent, CustomFieldId};
use nimbus_pipeline::{Lead, LeadEvent, LeadId, Opportunity, OpportunityEvent, OpportunityId};
use nimbus_purchasing::{PurchaseOrder, PurchaseOrderEvent, PurchaseOrderId};
use nimbus_security::{SecurityGroup, SecurityGroupEvent, SecurityGroupId};
use nimbus_support::{SupportCase, SupportCaseEvent, SupportCaseId};

use super::RecordProjection;
use crate::streams;

/// Stream coordinates carried inside an event payload; checked against the
/// envelope before the event is folded.
pub trait StreamEvent {
    fn tenant_id(&self) -> TenantId;
    fn stream_id(&self) -> AggregateId;
}

impl StreamEvent for CompanyEvent {
    fn tenant_id(&self) -> TenantId {
        CompanyEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.company_id().0
    }
}

impl StreamEvent for PersonEvent {
    fn tenant_id(&self) -> TenantId {
        PersonEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.person_id().0
    }
}

impl StreamEvent for LeadEvent {
    fn tenant_id(&self) -> TenantId {
        LeadEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.lead_id().0
    }
}

impl StreamEvent for OpportunityEvent {
    fn tenant_id(&self) -> TenantId {
        OpportunityEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.opportunity_id().0
    }
}

impl StreamEvent for PurchaseOrderEvent {
    fn tenant_id(&self) -> TenantId {
        PurchaseOrderEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.order_id().0
    }
}

impl StreamEvent for SupportCaseEvent {
    fn tenant_id(&self) -> TenantId {
        SupportCaseEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.case_id().0
    }
}

impl StreamEvent for SecurityGroupEvent {
    fn tenant_id(&self) -> TenantId {
        SecurityGroupEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.group_id().0
    }
}

impl StreamEvent for CustomFieldEvent {
    fn tenant_id(&self) -> TenantId {
        CustomFieldEvent::tenant_id(self)
    }
    fn stream_id(&self) -> AggregateId {
        self.definition().id.0
    }
}

pub type CompanyProjection = RecordProjection<Company>;
pub type PersonProjection = RecordProjection<Person>;
pub type LeadProjection = RecordProjection<Lead>;
pub type OpportunityProjection = RecordProjection<Opportunity>;
pub type PurchaseOrderProjection = RecordProjection<PurchaseOrder>;
pub type CaseProjection = RecordProjection<SupportCase>;
pub type SecurityGroupProjection = RecordProjection<SecurityGroup>;
pub type CustomFieldProjection = RecordProjection<CustomField>;

pub fn companies() -> CompanyProjection {
    RecordProjection::new("contacts.companies", streams::COMPANY, |id| {
        Company::empty(CompanyId::new(id))
    })
}

pub fn people() -> PersonProjection {
    RecordProjection::new("contacts.people", streams::PERSON, |id| {
        Person::empty(PersonId::new(id))
    })
}

pub fn leads() -> LeadProjection {
    RecordProjection::new("pipeline.leads", streams::LEAD, |id| Lead::empty(LeadId::new(id)))
}

pub fn opportunities() -> OpportunityProjection {
    RecordProjection::new("pipeline.opportunities", streams::OPPORTUNITY, |id| {
        Opportunity::empty(OpportunityId::new(id))
    })
}

pub fn purchase_orders() -> PurchaseOrderProjection {
    RecordProjection::new("purchasing.orders", streams::PURCHASE_ORDER, |id| {
        PurchaseOrder::empty(PurchaseOrderId::new(id))
    })
}

pub fn support_cases() -> CaseProjection {
    RecordProjection::new("support.cases", streams::SUPPORT_CASE, |id| {
        SupportCase::empty(SupportCaseId::new(id))
    })
}

pub fn security_groups() -> SecurityGroupProjection {
    RecordProjection::new("security.groups", streams::SECURITY_GROUP, |id| {
        SecurityGroup::empty(SecurityGroupId::new(id))
    })
}

pub fn custom_fields() -> CustomFieldProjection {
    RecordProjection::new("custom_fields.fields", streams::CUSTOM_FIELD, |id| {
        CustomField::empty(CustomFieldId::new(id))
    })
}
