//! Request bodies the services do not already accept, plus JSON views of
//! the record aggregates.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use nimbus_contacts::{Company, CompanyKind, Person};
use nimbus_core::{AggregateId, AggregateRoot, RecordAudit, UserId};
use nimbus_custom_fields::{CustomFieldEntity, CustomFieldValue};
use nimbus_infra::services::ConversionResult;
use nimbus_pipeline::{Lead, LeadStatus, Opportunity};
use nimbus_purchasing::{PurchaseOrder, PurchaseOrderStatus};
use nimbus_security::{AccessLevel, RecordType, SecurityGroup};
use nimbus_support::{CaseStatus, SupportCase};

use crate::app::errors::ApiError;

/// Parses a path segment into a typed record id.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::invalid_id(what))
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StatusRequest<S> {
    pub status: S,
}

#[derive(Debug, Deserialize)]
pub struct AssignCaseRequest {
    pub assignee: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ResolveCaseRequest {
    pub resolution: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct RecordAccessRequest {
    pub record_type: RecordType,
    pub record_ids: Vec<AggregateId>,
    /// Ignored on revoke.
    pub level: Option<AccessLevel>,
}

#[derive(Debug, Deserialize)]
pub struct EffectiveAccessQuery {
    pub user_id: UserId,
    pub record_type: RecordType,
    pub record_id: AggregateId,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentsRequest {
    #[serde(default)]
    pub order_discount_minor: i64,
    #[serde(default)]
    pub shipping_minor: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount_minor: i64,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateSearchQuery {
    pub threshold: Option<f64>,
    pub limit: Option<usize>,
}

/// Partial custom value update; `null` clears a value.
#[derive(Debug, Deserialize)]
pub struct CustomValuesRequest {
    pub values: BTreeMap<String, Option<CustomFieldValue>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyListQuery {
    pub kind: Option<CompanyKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PersonListQuery {
    pub company_id: Option<nimbus_contacts::CompanyId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadListQuery {
    pub status: Option<LeadStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<PurchaseOrderStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaseListQuery {
    pub status: Option<CaseStatus>,
    pub assignee: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct FieldListQuery {
    pub entity: CustomFieldEntity,
}

// -------------------------
// Response mapping
// -------------------------

pub fn items(values: Vec<Value>) -> Value {
    json!({ "items": values })
}

fn audit_to_json(audit: &RecordAudit) -> Value {
    json!({
        "created_by": audit.created_by,
        "updated_by": audit.updated_by,
        "created_at": audit.created_at,
        "updated_at": audit.updated_at,
        "deleted_at": audit.deleted_at,
    })
}

pub fn company_to_json(c: &Company) -> Value {
    json!({
        "id": c.id(),
        "kind": c.kind(),
        "name": c.name(),
        "contact": c.contact(),
        "account_owner": c.account_owner(),
        "version": c.version(),
        "audit": audit_to_json(c.audit()),
    })
}

pub fn person_to_json(p: &Person) -> Value {
    json!({
        "id": p.id(),
        "first_name": p.first_name(),
        "last_name": p.last_name(),
        "full_name": p.full_name(),
        "email": p.email(),
        "phone": p.phone(),
        "job_title": p.job_title(),
        "company_id": p.company_id(),
        "version": p.version(),
        "audit": audit_to_json(p.audit()),
    })
}

pub fn lead_to_json(l: &Lead) -> Value {
    json!({
        "id": l.id(),
        "details": l.details(),
        "full_name": l.details().full_name(),
        "status": l.status(),
        "duplicates": l.duplicates(),
        "conversion": l.conversion(),
        "version": l.version(),
        "audit": audit_to_json(l.audit()),
    })
}

pub fn opportunity_to_json(o: &Opportunity) -> Value {
    json!({
        "id": o.id(),
        "name": o.name(),
        "company_id": o.company_id(),
        "contact_id": o.contact_id(),
        "source_lead": o.source_lead(),
        "custom_fields": o.custom_fields(),
        "version": o.version(),
        "audit": audit_to_json(o.audit()),
    })
}

pub fn conversion_to_json(r: &ConversionResult) -> Value {
    json!({
        "lead": lead_to_json(&r.lead),
        "company": r.company.as_ref().map(company_to_json),
        "company_created": r.company_created,
        "person": person_to_json(&r.person),
        "opportunity": opportunity_to_json(&r.opportunity),
    })
}

pub fn purchase_order_to_json(po: &PurchaseOrder) -> Value {
    let (order_discount, shipping) = po.adjustments();
    json!({
        "id": po.id(),
        "order_number": po.order_number(),
        "supplier_id": po.supplier_id(),
        "currency": po.currency(),
        "status": po.status(),
        "expected_on": po.expected_on(),
        "lines": po.lines(),
        "order_discount_minor": order_discount,
        "shipping_minor": shipping,
        "totals": po.totals(),
        "payments": po.payments(),
        "payment_status": po.payment_status(),
        "version": po.version(),
        "audit": audit_to_json(po.audit()),
    })
}

pub fn case_to_json(c: &SupportCase) -> Value {
    json!({
        "id": c.id(),
        "case_number": c.case_number(),
        "details": c.details(),
        "status": c.status(),
        "assignee": c.assignee(),
        "resolution": c.resolution(),
        "resolved_at": c.resolved_at(),
        "version": c.version(),
        "audit": audit_to_json(c.audit()),
    })
}

pub fn group_to_json(g: &SecurityGroup) -> Value {
    let grants: Vec<Value> = g
        .grants()
        .iter()
        .map(|(record, level)| {
            json!({
                "record_type": record.record_type,
                "record_id": record.record_id,
                "level": level,
            })
        })
        .collect();
    json!({
        "id": g.id(),
        "name": g.name(),
        "description": g.description(),
        "parent_id": g.parent_id(),
        "level": g.level(),
        "position": g.position(),
        "inherit_permissions": g.inherit_permissions(),
        "active": g.is_active(),
        "members": g.members(),
        "grants": grants,
        "version": g.version(),
        "audit": audit_to_json(g.audit()),
    })
}
