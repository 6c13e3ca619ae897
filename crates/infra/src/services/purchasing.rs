//! Purchase orders against supplier companies.

use chrono::NaiveDate;
use serde::Deserialize;

use nimbus_contacts::CompanyId;
use nimbus_core::{AggregateRoot, Currency, TenantId};
use nimbus_purchasing::{
    AddLine, ChangeStatus, CreatePurchaseOrder, DeletePurchaseOrder, LineInput, Payment,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderStatus, RecordPayment,
    RemoveLine, RestorePurchaseOrder, SetAdjustments, UpdateLine,
};

use super::ServiceError;
use crate::crm::{CommandContext, Crm};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPurchaseOrder {
    /// Generated as `PO-000001` style when absent.
    pub order_number: Option<String>,
    pub supplier_id: CompanyId,
    pub currency: Currency,
    pub expected_on: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Vec<LineInput>,
}

pub struct PurchaseOrderService<'a> {
    crm: &'a Crm,
}

impl<'a> PurchaseOrderService<'a> {
    pub(crate) fn new(crm: &'a Crm) -> Self {
        Self { crm }
    }

    /// Creates a draft order and adds any initial lines.
    pub fn create(
        &self,
        ctx: &CommandContext,
        input: NewPurchaseOrder,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.crm.contacts().live_company(ctx.tenant_id, input.supplier_id)?;

        let existing = self.all(ctx.tenant_id);
        let order_number = match input.order_number.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => {
                if existing.iter().any(|o| o.order_number().eq_ignore_ascii_case(&n)) {
                    return Err(ServiceError::conflict(format!(
                        "order number '{n}' is already in use"
                    )));
                }
                n
            }
            _ => format!("PO-{:06}", existing.len() + 1),
        };

        let order_id = PurchaseOrderId::generate();
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                order_number: order_number.clone(),
                supplier_id: input.supplier_id,
                currency: input.currency,
                expected_on: input.expected_on,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, order_id = %order_id, order_number = %order_number, "purchase order created");

        for line in input.lines {
            self.add_line(ctx, order_id, line)?;
        }
        self.get(ctx.tenant_id, order_id)
    }

    pub fn add_line(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        line: LineInput,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::AddLine(AddLine {
                tenant_id: ctx.tenant_id,
                order_id,
                line,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, order_id)
    }

    pub fn update_line(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        line_no: u32,
        line: LineInput,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::UpdateLine(UpdateLine {
                tenant_id: ctx.tenant_id,
                order_id,
                line_no,
                line,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, order_id)
    }

    pub fn remove_line(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        line_no: u32,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::RemoveLine(RemoveLine {
                tenant_id: ctx.tenant_id,
                order_id,
                line_no,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, order_id)
    }

    pub fn set_adjustments(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        order_discount: i64,
        shipping: i64,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::SetAdjustments(SetAdjustments {
                tenant_id: ctx.tenant_id,
                order_id,
                order_discount,
                shipping,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, order_id)
    }

    pub fn change_status(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        to: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::ChangeStatus(ChangeStatus {
                tenant_id: ctx.tenant_id,
                order_id,
                to,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, order_id = %order_id, status = to.as_str(), "purchase order status changed");
        self.get(ctx.tenant_id, order_id)
    }

    pub fn record_payment(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        payment: Payment,
    ) -> Result<PurchaseOrder, ServiceError> {
        let amount = payment.amount_minor;
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::RecordPayment(RecordPayment {
                tenant_id: ctx.tenant_id,
                order_id,
                payment,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, order_id = %order_id, amount, "payment recorded");
        self.get(ctx.tenant_id, order_id)
    }

    pub fn delete(&self, ctx: &CommandContext, order_id: PurchaseOrderId) -> Result<(), ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::DeletePurchaseOrder(DeletePurchaseOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        tracing::info!(tenant_id = %ctx.tenant_id, order_id = %order_id, "purchase order deleted");
        Ok(())
    }

    pub fn restore(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.send(
            ctx,
            order_id,
            PurchaseOrderCommand::RestorePurchaseOrder(RestorePurchaseOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        self.get(ctx.tenant_id, order_id)
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.crm
            .read()
            .purchase_orders
            .get(tenant_id, order_id.0)
            .ok_or(ServiceError::NotFound("purchase order"))
    }

    /// Live orders by order number.
    pub fn list(
        &self,
        tenant_id: TenantId,
        status: Option<PurchaseOrderStatus>,
    ) -> Vec<PurchaseOrder> {
        let mut out: Vec<_> = self
            .all(tenant_id)
            .into_iter()
            .filter(|o| !o.is_deleted() && status.is_none_or(|s| o.status() == s))
            .collect();
        out.sort_by(|a, b| {
            a.order_number()
                .cmp(b.order_number())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    fn all(&self, tenant_id: TenantId) -> Vec<PurchaseOrder> {
        self.crm.read().purchase_orders.list(tenant_id)
    }

    fn send(
        &self,
        ctx: &CommandContext,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> Result<(), ServiceError> {
        self.crm.dispatcher().dispatch(
            ctx.tenant_id,
            order_id.0,
            streams::PURCHASE_ORDER,
            command,
            |_, id| PurchaseOrder::empty(PurchaseOrderId::new(id)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::CrmSettings;
    use crate::services::NewCompany;
    use nimbus_contacts::{CompanyKind, ContactInfo};
    use nimbus_purchasing::PaymentStatus;

    fn supplier(crm: &Crm, ctx: &CommandContext) -> CompanyId {
        let company = crm
            .contacts()
            .create_company(
                ctx,
                NewCompany {
                    kind: CompanyKind::Supplier,
                    name: "Bolts Ltd".into(),
                    contact: ContactInfo::default(),
                    account_owner: None,
                },
            )
            .unwrap();
        *company.id()
    }

    fn bolts(qty: i64) -> LineInput {
        LineInput {
            description: "M8 bolt".into(),
            product_code: Some("M8".into()),
            quantity: qty,
            unit_price_minor: 250,
            discount_bp: 0,
            tax_rate_bp: 2_000,
        }
    }

    fn order(supplier_id: CompanyId) -> NewPurchaseOrder {
        NewPurchaseOrder {
            order_number: None,
            supplier_id,
            currency: Currency::new("EUR").unwrap(),
            expected_on: None,
            lines: vec![bolts(100)],
        }
    }

    #[test]
    fn totals_follow_lines_and_payments() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let svc = crm.purchase_orders();
        let po = svc.create(&ctx, order(supplier(&crm, &ctx))).unwrap();
        assert_eq!(po.order_number(), "PO-000001");
        assert_eq!(po.totals().total, 30_000);

        let po = svc.set_adjustments(&ctx, *po.id(), 0, 1_000).unwrap();
        assert_eq!(po.totals().total, 31_000);

        for to in [
            PurchaseOrderStatus::Submitted,
            PurchaseOrderStatus::Approved,
        ] {
            svc.change_status(&ctx, *po.id(), to).unwrap();
        }
        let payment = Payment {
            amount_minor: 31_000,
            paid_on: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            reference: None,
        };
        let po = svc.record_payment(&ctx, *po.id(), payment).unwrap();
        assert_eq!(po.payment_status(), PaymentStatus::Paid);
        assert_eq!(po.totals().balance_due, 0);
    }

    #[test]
    fn supplier_must_exist_and_numbers_are_unique() {
        let crm = Crm::in_memory(CrmSettings::default());
        let ctx = CommandContext::new(TenantId::new(), None);
        let svc = crm.purchase_orders();

        let err = svc.create(&ctx, order(CompanyId::generate())).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("company")));

        let supplier_id = supplier(&crm, &ctx);
        let numbered = NewPurchaseOrder {
            order_number: Some("PO-7".into()),
            ..order(supplier_id)
        };
        svc.create(&ctx, numbered.clone()).unwrap();
        assert!(matches!(svc.create(&ctx, numbered), Err(ServiceError::Conflict(_))));
    }
}
