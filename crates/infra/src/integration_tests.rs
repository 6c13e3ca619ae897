//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → ProjectingBus → Projection → ReadModel
//!
//! Verifies:
//! - Commands produce events that update read models before dispatch returns
//! - Subscribers see the same events after the projections
//! - Tenant isolation is preserved
//! - Optimistic concurrency conflicts are detected
//! - Replaying the log rebuilds identical read models

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use nimbus_contacts::{Company, CompanyCommand, CompanyId, CompanyKind, ContactInfo, CreateCompany};
    use nimbus_core::{AggregateId, AggregateRoot, Currency, ExpectedVersion, TenantId, UserId};
    use nimbus_pipeline::{LeadDetails, LeadStatus};
    use nimbus_purchasing::{LineInput, PurchaseOrderStatus};

    use crate::command_dispatcher::DispatchError;
    use crate::crm::{CommandContext, Crm, CrmSettings};
    use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
    use crate::services::{ConvertOptions, NewCase, NewCompany, NewPurchaseOrder, ServiceError};
    use crate::streams;

    fn setup() -> (Crm, CommandContext) {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), Some(UserId::new()));
        (crm, ctx)
    }

    fn lead(first: &str, last: &str, company: Option<&str>, email: Option<&str>) -> LeadDetails {
        LeadDetails {
            first_name: first.into(),
            last_name: last.into(),
            company_name: company.map(str::to_string),
            email: email.map(str::to_string),
            ..LeadDetails::default()
        }
    }

    fn supplier(crm: &Crm, ctx: &CommandContext, name: &str) -> Company {
        crm.contacts()
            .create_company(
                ctx,
                NewCompany {
                    kind: CompanyKind::Supplier,
                    name: name.into(),
                    contact: ContactInfo::default(),
                    account_owner: None,
                },
            )
            .unwrap()
    }

    fn create_company_command(tenant_id: TenantId, company_id: CompanyId, name: &str) -> CompanyCommand {
        CompanyCommand::CreateCompany(CreateCompany {
            tenant_id,
            company_id,
            kind: CompanyKind::Customer,
            name: name.into(),
            contact: ContactInfo::default(),
            account_owner: None,
            actor: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_updates_read_model_before_returning() {
        let (crm, ctx) = setup();
        let company_id = CompanyId::generate();

        let events = crm
            .dispatcher()
            .dispatch::<Company>(
                ctx.tenant_id,
                company_id.0,
                streams::COMPANY,
                create_company_command(ctx.tenant_id, company_id, "Acme"),
                |_, id| Company::empty(CompanyId::new(id)),
            )
            .expect("create should succeed");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number, 1);

        let company = crm.read().companies.get(ctx.tenant_id, company_id.0).unwrap();
        assert_eq!(company.name(), "Acme");
        assert_eq!(company.version(), 1);
    }

    #[test]
    fn subscribers_receive_committed_events() {
        let (crm, ctx) = setup();
        let sub = crm.subscribe();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            while let Ok(env) = sub.recv_timeout(Duration::from_secs(2)) {
                if tx.send(env).is_err() {
                    break;
                }
            }
        });

        let company = supplier(&crm, &ctx, "Bolt Supply");

        let env = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("subscriber should see the event");
        assert_eq!(env.tenant_id(), ctx.tenant_id);
        assert_eq!(env.aggregate_id(), company.id().0);
        assert_eq!(env.aggregate_type(), streams::COMPANY);
        assert_eq!(env.sequence_number(), 1);
    }

    #[test]
    fn rejected_command_changes_nothing() {
        let (crm, ctx) = setup();
        let company_id = CompanyId::generate();
        let command = || create_company_command(ctx.tenant_id, company_id, "Acme");
        let dispatch = |cmd| {
            crm.dispatcher().dispatch::<Company>(
                ctx.tenant_id,
                company_id.0,
                streams::COMPANY,
                cmd,
                |_, id| Company::empty(CompanyId::new(id)),
            )
        };

        dispatch(command()).unwrap();
        let err = dispatch(command()).unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)), "got {err:?}");

        let stream = crm
            .dispatcher()
            .store()
            .load_stream(ctx.tenant_id, company_id.0)
            .unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(crm.read().companies.get(ctx.tenant_id, company_id.0).unwrap().version(), 1);
    }

    #[test]
    fn blank_names_are_rejected_without_events() {
        let (crm, ctx) = setup();
        let err = crm
            .contacts()
            .create_company(
                &ctx,
                NewCompany {
                    kind: CompanyKind::Customer,
                    name: "   ".into(),
                    contact: ContactInfo::default(),
                    account_owner: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "got {err:?}");
        assert!(crm.dispatcher().store().load_all().unwrap().is_empty());
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        let event = || UncommittedEvent {
            event_id: uuid::Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: streams::LEAD.into(),
            event_type: "pipeline.lead.updated".into(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };

        store.append(vec![event()], ExpectedVersion::Exact(0)).unwrap();
        // Both writers read version 1; only the first one wins.
        store.append(vec![event()], ExpectedVersion::Exact(1)).unwrap();
        let err = store.append(vec![event()], ExpectedVersion::Exact(1)).unwrap_err();
        assert!(err.to_string().contains("optimistic concurrency"));
        assert_eq!(store.event_count(), 2);
    }

    #[test]
    fn tenants_never_see_each_others_records() {
        let crm = Crm::in_memory(CrmSettings::default());
        let a = CommandContext::new(TenantId::new(), None);
        let b = CommandContext::new(TenantId::new(), None);

        let acme = supplier(&crm, &a, "Acme");
        supplier(&crm, &b, "Acme");
        crm.leads().create(&a, lead("Jane", "Doe", Some("Acme"), Some("jane@acme.com"))).unwrap();
        let other = crm
            .leads()
            .create(&b, lead("Jane", "Doe", Some("Acme"), Some("jane@acme.com")))
            .unwrap();

        // Same data in another tenant is not a duplicate.
        assert!(other.duplicates().is_empty());
        assert_eq!(crm.contacts().list_companies(a.tenant_id, None).len(), 1);
        assert!(crm.read().companies.get(b.tenant_id, acme.id().0).is_none());
        assert!(matches!(
            crm.contacts().company(b.tenant_id, *acme.id()),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn acme_lead_is_flagged_as_duplicate_of_first() {
        let (crm, ctx) = setup();
        let first = crm
            .leads()
            .create(&ctx, lead("Ann", "Lee", Some("Acme"), Some("ann@acme.io")))
            .unwrap();
        assert!(crm.duplicates().find(ctx.tenant_id, *first.id(), None).unwrap().is_empty());

        let second = crm
            .leads()
            .create(&ctx, lead("Ann", "Lee", Some("Acme"), Some("ann@acme.io")))
            .unwrap();
        let matches = crm.duplicates().find(ctx.tenant_id, *second.id(), None).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].lead_id, *first.id());
        assert!(matches[0].score >= crm.settings().duplicates.threshold);
        assert_eq!(second.duplicates(), matches.as_slice());
    }

    #[test]
    fn lead_to_opportunity_to_pipeline() {
        let (crm, ctx) = setup();
        crm.metrics().ensure_default_fields(&ctx).unwrap();

        let lead = crm
            .leads()
            .create(&ctx, lead("Sam", "Ortiz", Some("Globex"), Some("sam@globex.com")))
            .unwrap();
        crm.leads().change_status(&ctx, *lead.id(), LeadStatus::Qualified).unwrap();
        let result = crm.leads().convert(&ctx, *lead.id(), ConvertOptions::default()).unwrap();

        assert!(result.company_created);
        assert_eq!(result.lead.status(), LeadStatus::Converted);
        assert_eq!(result.opportunity.name(), "Globex - Sam Ortiz");
        assert_eq!(result.person.company_id(), result.conversion.company_id);

        // A converted lead cannot convert twice.
        let again = crm.leads().convert(&ctx, *lead.id(), ConvertOptions::default());
        assert!(matches!(again, Err(ServiceError::InvariantViolation(_))));

        let summary = crm.metrics().pipeline_summary(ctx.tenant_id);
        assert_eq!(summary.opportunity_count, 1);
    }

    #[test]
    fn purchase_order_lines_roll_up_into_totals() {
        let (crm, ctx) = setup();
        let vendor = supplier(&crm, &ctx, "Bolt Supply");
        let order = crm
            .purchase_orders()
            .create(
                &ctx,
                NewPurchaseOrder {
                    order_number: None,
                    supplier_id: *vendor.id(),
                    currency: Currency::new("USD").unwrap(),
                    expected_on: None,
                    lines: vec![
                        LineInput {
                            description: "Bolts".into(),
                            product_code: Some("B-1".into()),
                            quantity: 100,
                            unit_price_minor: 25,
                            discount_bp: 0,
                            tax_rate_bp: 1000,
                        },
                        LineInput {
                            description: "Nuts".into(),
                            product_code: None,
                            quantity: 100,
                            unit_price_minor: 10,
                            discount_bp: 1000,
                            tax_rate_bp: 0,
                        },
                    ],
                },
            )
            .unwrap();

        assert_eq!(order.order_number(), "PO-000001");
        let totals = order.totals();
        assert_eq!(totals.subtotal, 3500);
        assert_eq!(totals.discount_total, 100);
        assert_eq!(totals.tax_total, 250);
        assert_eq!(totals.total, 3650);
        assert_eq!(order.status(), PurchaseOrderStatus::Draft);
    }

    #[test]
    fn replay_rebuilds_the_same_read_models() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let crm = Crm::open(store.clone(), CrmSettings::default()).unwrap();
        let ctx = CommandContext::new(TenantId::new(), None);

        let vendor = supplier(&crm, &ctx, "Bolt Supply");
        let first = crm.leads().create(&ctx, lead("Ann", "Lee", None, Some("ann@x.io"))).unwrap();
        let second = crm.leads().create(&ctx, lead("Ann", "Lee", None, Some("ann@x.io"))).unwrap();
        crm.leads().delete(&ctx, *first.id()).unwrap();
        let case = crm
            .support()
            .open(&ctx, NewCase { subject: "Broken widget".into(), ..NewCase::default() })
            .unwrap();

        let reopened = Crm::open(store, CrmSettings::default()).unwrap();
        assert_eq!(
            reopened.contacts().company(ctx.tenant_id, *vendor.id()).unwrap().version(),
            vendor.version()
        );
        assert!(reopened.leads().get(ctx.tenant_id, *first.id()).unwrap().is_deleted());
        assert_eq!(
            reopened.leads().get(ctx.tenant_id, *second.id()).unwrap().duplicates(),
            crm.leads().get(ctx.tenant_id, *second.id()).unwrap().duplicates()
        );
        assert_eq!(
            reopened.support().get(ctx.tenant_id, *case.id()).unwrap().case_number(),
            case.case_number()
        );
        assert_eq!(reopened.leads().list(ctx.tenant_id, None).len(), 1);
    }

    #[test]
    fn concurrent_writers_keep_streams_gapless() {
        let crm = Arc::new(Crm::in_memory(CrmSettings::default()));
        let ctx = CommandContext::new(TenantId::new(), None);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let crm = crm.clone();
                std::thread::spawn(move || {
                    crm.support()
                        .open(&ctx, NewCase { subject: format!("Case {i}"), ..NewCase::default() })
                        .unwrap()
                })
            })
            .collect();
        let mut numbers: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().case_number().to_string())
            .collect();
        numbers.sort();
        numbers.dedup();

        assert_eq!(numbers.len(), 8);
        assert_eq!(crm.support().list(ctx.tenant_id, None, None).len(), 8);
        for event in crm.dispatcher().store().load_all().unwrap() {
            assert_eq!(event.sequence_number, 1);
        }
    }
}
