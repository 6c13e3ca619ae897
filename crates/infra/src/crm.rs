//! The assembled back end: event store, projecting bus, read models and
//! the settings the services read.
//!
//! `Crm` is cheap to share behind an `Arc`; every service borrows it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use nimbus_core::{TenantId, UserId};
use nimbus_events::{EventBus, EventEnvelope, Subscription};
use nimbus_pipeline::DuplicateQuery;

use crate::command_dispatcher::CommandDispatcher;
use crate::event_bus::ProjectingBus;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::projections::{
    CaseProjection, CompanyProjection, CustomFieldProjection, LeadProjection,
    OpportunityProjection, PersonProjection, Projection, PurchaseOrderProjection, ReplayReport,
    SecurityGroupProjection, rebuild, records,
};
use crate::services::ServiceError;

pub type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, Arc<ProjectingBus>>;

/// Who is writing, for which tenant, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub tenant_id: TenantId,
    pub actor: Option<UserId>,
    pub now: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(tenant_id: TenantId, actor: Option<UserId>) -> Self {
        Self {
            tenant_id,
            actor,
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrmSettings {
    pub duplicates: DuplicateQuery,
}

impl Default for CrmSettings {
    fn default() -> Self {
        Self {
            duplicates: DuplicateQuery::default(),
        }
    }
}

/// Every record read model, one projection per aggregate type.
#[derive(Debug, Clone)]
pub struct ReadModels {
    pub companies: Arc<CompanyProjection>,
    pub people: Arc<PersonProjection>,
    pub leads: Arc<LeadProjection>,
    pub opportunities: Arc<OpportunityProjection>,
    pub purchase_orders: Arc<PurchaseOrderProjection>,
    pub support_cases: Arc<CaseProjection>,
    pub security_groups: Arc<SecurityGroupProjection>,
    pub custom_fields: Arc<CustomFieldProjection>,
}

impl ReadModels {
    fn new() -> Self {
        Self {
            companies: Arc::new(records::companies()),
            people: Arc::new(records::people()),
            leads: Arc::new(records::leads()),
            opportunities: Arc::new(records::opportunities()),
            purchase_orders: Arc::new(records::purchase_orders()),
            support_cases: Arc::new(records::support_cases()),
            security_groups: Arc::new(records::security_groups()),
            custom_fields: Arc::new(records::custom_fields()),
        }
    }

    fn all(&self) -> Vec<Arc<dyn Projection>> {
        vec![
            self.custom_fields.clone() as Arc<dyn Projection>,
            self.companies.clone() as Arc<dyn Projection>,
            self.people.clone() as Arc<dyn Projection>,
            self.leads.clone() as Arc<dyn Projection>,
            self.opportunities.clone() as Arc<dyn Projection>,
            self.purchase_orders.clone() as Arc<dyn Projection>,
            self.support_cases.clone() as Arc<dyn Projection>,
            self.security_groups.clone() as Arc<dyn Projection>,
        ]
    }
}

pub struct Crm {
    dispatcher: Dispatcher,
    read: ReadModels,
    settings: CrmSettings,
    /// Last issued case sequence per tenant; seeded from the read model.
    case_sequences: Mutex<HashMap<TenantId, u64>>,
}

impl std::fmt::Debug for Crm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crm")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Crm {
    /// Empty in-memory back end for tests and local runs.
    pub fn in_memory(settings: CrmSettings) -> Self {
        Self::assemble(Arc::new(InMemoryEventStore::new()), settings)
    }

    /// Back end over an existing store; read models are rebuilt from its log.
    pub fn open(store: Arc<dyn EventStore>, settings: CrmSettings) -> Result<Self, ServiceError> {
        let crm = Self::assemble(store, settings);
        crm.replay()?;
        Ok(crm)
    }

    fn assemble(store: Arc<dyn EventStore>, settings: CrmSettings) -> Self {
        let read = ReadModels::new();
        let bus = Arc::new(ProjectingBus::new(read.all()));
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            read,
            settings,
            case_sequences: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn read(&self) -> &ReadModels {
        &self.read
    }

    pub fn settings(&self) -> &CrmSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    /// Drops every read model and replays the full event log.
    pub fn replay(&self) -> Result<ReplayReport, ServiceError> {
        let events = self.dispatcher.store().load_all()?;
        let projections = self.read.all();
        let refs: Vec<&dyn Projection> = projections.iter().map(|p| p.as_ref()).collect();
        let report = rebuild(&refs, &events)?;
        if let Ok(mut seq) = self.case_sequences.lock() {
            seq.clear();
        }
        Ok(report)
    }

    /// Next value of the tenant's case counter.
    pub(crate) fn next_case_sequence(&self, tenant_id: TenantId) -> Result<u64, ServiceError> {
        let mut seq = self
            .case_sequences
            .lock()
            .map_err(|_| ServiceError::Unavailable("case counter lock poisoned".into()))?;
        let last = match seq.get(&tenant_id) {
            Some(last) => *last,
            None => self
                .read
                .support_cases
                .list(tenant_id)
                .iter()
                .filter_map(|c| parse_case_sequence(c.case_number()))
                .max()
                .unwrap_or(0),
        };
        let next = last + 1;
        seq.insert(tenant_id, next);
        Ok(next)
    }
}

fn parse_case_sequence(number: &str) -> Option<u64> {
    number.strip_prefix("CS-")?.parse().ok()
}
