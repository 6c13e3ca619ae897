use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use nimbus_contacts::CompanyId;
use nimbus_core::{
    Aggregate, AggregateRoot, Currency, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_events::Event;

use crate::totals::{LineInput, OrderTotals, PaymentStatus, PurchaseOrderLine};

record_id!(
    /// Purchase order identifier.
    PurchaseOrderId
);

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    Approved,
    Ordered,
    Received,
    Closed,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Submitted => "submitted",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Closed => "closed",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    /// Allowed workflow edges. A submitted order can be sent back to draft.
    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Draft)
                | (Submitted, Approved)
                | (Approved, Ordered)
                | (Ordered, Received)
                | (Received, Closed)
                | (Draft | Submitted | Approved | Ordered, Cancelled)
        )
    }

    pub fn accepts_payments(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Approved
                | PurchaseOrderStatus::Ordered
                | PurchaseOrderStatus::Received
                | PurchaseOrderStatus::Closed
        )
    }
}

impl core::str::FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "approved" => Ok(Self::Approved),
            "ordered" => Ok(Self::Ordered),
            "received" => Ok(Self::Received),
            "closed" => Ok(Self::Closed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown purchase order status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount_minor: i64,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
}

/// Aggregate root: PurchaseOrder.
///
/// Lines, adjustments and payments live inside the aggregate so a single
/// append keeps header totals consistent with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    order_number: String,
    supplier_id: Option<CompanyId>,
    currency: Currency,
    expected_on: Option<NaiveDate>,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseOrderLine>,
    last_line_no: u32,
    order_discount: i64,
    shipping: i64,
    payments: Vec<Payment>,
    totals: OrderTotals,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            order_number: String::new(),
            supplier_id: None,
            currency: Currency::usd(),
            expected_on: None,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            last_line_no: 0,
            order_discount: 0,
            shipping: 0,
            payments: Vec::new(),
            totals: OrderTotals::default(),
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn supplier_id(&self) -> Option<CompanyId> {
        self.supplier_id
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.totals.payment_status()
    }

    pub fn expected_on(&self) -> Option<NaiveDate> {
        self.expected_on
    }

    /// `(order_discount, shipping)` in minor units.
    pub fn adjustments(&self) -> (i64, i64) {
        (self.order_discount, self.shipping)
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub order_number: String,
    pub supplier_id: CompanyId,
    pub currency: Currency,
    pub expected_on: Option<NaiveDate>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: LineInput,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub line: LineInput,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Order-level discount and shipping, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAdjustments {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub order_discount: i64,
    pub shipping: i64,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub to: PurchaseOrderStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub payment: Payment,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    SetAdjustments(SetAdjustments),
    ChangeStatus(ChangeStatus),
    RecordPayment(RecordPayment),
    DeletePurchaseOrder(DeletePurchaseOrder),
    RestorePurchaseOrder(RestorePurchaseOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub order_number: String,
    pub supplier_id: CompanyId,
    pub currency: Currency,
    pub expected_on: Option<NaiveDate>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: PurchaseOrderLine,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: PurchaseOrderLine,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentsSet {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub order_discount: i64,
    pub shipping: i64,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Emitted after every change that affects money so read models never
/// recompute totals themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsRecalculated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub totals: OrderTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub payment: Payment,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDeleted {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRestored {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    AdjustmentsSet(AdjustmentsSet),
    TotalsRecalculated(TotalsRecalculated),
    StatusChanged(StatusChanged),
    PaymentRecorded(PaymentRecorded),
    PurchaseOrderDeleted(PurchaseOrderDeleted),
    PurchaseOrderRestored(PurchaseOrderRestored),
}

impl PurchaseOrderEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.tenant_id,
            PurchaseOrderEvent::LineAdded(e) => e.tenant_id,
            PurchaseOrderEvent::LineUpdated(e) => e.tenant_id,
            PurchaseOrderEvent::LineRemoved(e) => e.tenant_id,
            PurchaseOrderEvent::AdjustmentsSet(e) => e.tenant_id,
            PurchaseOrderEvent::TotalsRecalculated(e) => e.tenant_id,
            PurchaseOrderEvent::StatusChanged(e) => e.tenant_id,
            PurchaseOrderEvent::PaymentRecorded(e) => e.tenant_id,
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => e.tenant_id,
            PurchaseOrderEvent::PurchaseOrderRestored(e) => e.tenant_id,
        }
    }

    pub fn order_id(&self) -> PurchaseOrderId {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.order_id,
            PurchaseOrderEvent::LineAdded(e) => e.order_id,
            PurchaseOrderEvent::LineUpdated(e) => e.order_id,
            PurchaseOrderEvent::LineRemoved(e) => e.order_id,
            PurchaseOrderEvent::AdjustmentsSet(e) => e.order_id,
            PurchaseOrderEvent::TotalsRecalculated(e) => e.order_id,
            PurchaseOrderEvent::StatusChanged(e) => e.order_id,
            PurchaseOrderEvent::PaymentRecorded(e) => e.order_id,
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => e.order_id,
            PurchaseOrderEvent::PurchaseOrderRestored(e) => e.order_id,
        }
    }
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::LineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::LineUpdated(_) => "purchasing.order.line_updated",
            PurchaseOrderEvent::LineRemoved(_) => "purchasing.order.line_removed",
            PurchaseOrderEvent::AdjustmentsSet(_) => "purchasing.order.adjustments_set",
            PurchaseOrderEvent::TotalsRecalculated(_) => "purchasing.order.totals_recalculated",
            PurchaseOrderEvent::StatusChanged(_) => "purchasing.order.status_changed",
            PurchaseOrderEvent::PaymentRecorded(_) => "purchasing.order.payment_recorded",
            PurchaseOrderEvent::PurchaseOrderDeleted(_) => "purchasing.order.deleted",
            PurchaseOrderEvent::PurchaseOrderRestored(_) => "purchasing.order.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::LineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::LineUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::LineRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::AdjustmentsSet(e) => e.occurred_at,
            PurchaseOrderEvent::TotalsRecalculated(e) => e.occurred_at,
            PurchaseOrderEvent::StatusChanged(e) => e.occurred_at,
            PurchaseOrderEvent::PaymentRecorded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.order_number = e.order_number.clone();
                self.supplier_id = Some(e.supplier_id);
                self.currency = e.currency.clone();
                self.expected_on = e.expected_on;
                self.status = PurchaseOrderStatus::Draft;
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            PurchaseOrderEvent::LineAdded(e) => {
                self.last_line_no = self.last_line_no.max(e.line.line_no);
                self.lines.push(e.line.clone());
                self.audit.touch(e.actor, e.occurred_at);
            }
            PurchaseOrderEvent::LineUpdated(e) => {
                if let Some(l) = self.lines.iter_mut().find(|l| l.line_no == e.line.line_no) {
                    *l = e.line.clone();
                }
                self.audit.touch(e.actor, e.occurred_at);
            }
            PurchaseOrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
                self.audit.touch(e.actor, e.occurred_at);
            }
            PurchaseOrderEvent::AdjustmentsSet(e) => {
                self.order_discount = e.order_discount;
                self.shipping = e.shipping;
                self.audit.touch(e.actor, e.occurred_at);
            }
            PurchaseOrderEvent::TotalsRecalculated(e) => self.totals = e.totals,
            PurchaseOrderEvent::StatusChanged(e) => {
                self.status = e.to;
                self.audit.touch(e.actor, e.occurred_at);
            }
            PurchaseOrderEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.audit.touch(e.actor, e.occurred_at);
            }
            PurchaseOrderEvent::PurchaseOrderDeleted(e) => {
                self.audit.mark_deleted(e.actor, e.occurred_at)
            }
            PurchaseOrderEvent::PurchaseOrderRestored(e) => {
                self.audit.restore(e.actor, e.occurred_at)
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            PurchaseOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseOrderCommand::SetAdjustments(cmd) => self.handle_adjustments(cmd),
            PurchaseOrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            PurchaseOrderCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            PurchaseOrderCommand::DeletePurchaseOrder(cmd) => self.handle_delete(cmd),
            PurchaseOrderCommand::RestorePurchaseOrder(cmd) => self.handle_restore(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase order"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_writable(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, order_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("purchase order"));
        }
        Ok(())
    }

    fn ensure_draft(&self) -> Result<(), DomainError> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(format!(
                "lines can only change while the order is draft (status: {})",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn recalculated(
        &self,
        tenant_id: TenantId,
        lines: &[PurchaseOrderLine],
        order_discount: i64,
        shipping: i64,
        amount_paid: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrderEvent, DomainError> {
        let totals = OrderTotals::compute(lines, order_discount, shipping, amount_paid)?;
        Ok(PurchaseOrderEvent::TotalsRecalculated(TotalsRecalculated {
            tenant_id,
            order_id: self.id,
            totals,
            occurred_at,
        }))
    }

    fn handle_create(&self, cmd: &CreatePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        let order_number = cmd.order_number.trim();
        if order_number.is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(PurchaseOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            order_number: order_number.to_string(),
            supplier_id: cmd.supplier_id,
            currency: cmd.currency.clone(),
            expected_on: cmd.expected_on,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.order_id)?;
        self.ensure_draft()?;

        let line = cmd.line.clone().into_line(self.last_line_no + 1)?;
        let mut lines = self.lines.clone();
        lines.push(line.clone());
        let totals = self.recalculated(
            cmd.tenant_id,
            &lines,
            self.order_discount,
            self.shipping,
            self.totals.amount_paid,
            cmd.occurred_at,
        )?;

        Ok(vec![
            PurchaseOrderEvent::LineAdded(LineAdded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            totals,
        ])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.order_id)?;
        self.ensure_draft()?;

        let line = cmd.line.clone().into_line(cmd.line_no)?;
        let mut lines = self.lines.clone();
        let slot = lines
            .iter_mut()
            .find(|l| l.line_no == cmd.line_no)
            .ok_or_else(|| DomainError::validation(format!("line {} does not exist", cmd.line_no)))?;
        *slot = line.clone();
        let totals = self.recalculated(
            cmd.tenant_id,
            &lines,
            self.order_discount,
            self.shipping,
            self.totals.amount_paid,
            cmd.occurred_at,
        )?;

        Ok(vec![
            PurchaseOrderEvent::LineUpdated(LineUpdated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            totals,
        ])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.order_id)?;
        self.ensure_draft()?;

        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::validation(format!(
                "line {} does not exist",
                cmd.line_no
            )));
        }
        let lines: Vec<_> = self
            .lines
            .iter()
            .filter(|l| l.line_no != cmd.line_no)
            .cloned()
            .collect();
        // Removing a line can push an existing order discount over the net amount.
        let totals = self.recalculated(
            cmd.tenant_id,
            &lines,
            self.order_discount,
            self.shipping,
            self.totals.amount_paid,
            cmd.occurred_at,
        )?;

        Ok(vec![
            PurchaseOrderEvent::LineRemoved(LineRemoved {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line_no: cmd.line_no,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            totals,
        ])
    }

    fn handle_adjustments(&self, cmd: &SetAdjustments) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.order_id)?;
        self.ensure_draft()?;

        let totals = self.recalculated(
            cmd.tenant_id,
            &self.lines,
            cmd.order_discount,
            cmd.shipping,
            self.totals.amount_paid,
            cmd.occurred_at,
        )?;
        Ok(vec![
            PurchaseOrderEvent::AdjustmentsSet(AdjustmentsSet {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                order_discount: cmd.order_discount,
                shipping: cmd.shipping,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            totals,
        ])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.order_id)?;

        if !self.status.can_transition_to(cmd.to) {
            return Err(DomainError::invariant(format!(
                "cannot move purchase order from {} to {}",
                self.status.as_str(),
                cmd.to.as_str()
            )));
        }
        if cmd.to == PurchaseOrderStatus::Submitted && self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot submit a purchase order without lines",
            ));
        }

        Ok(vec![PurchaseOrderEvent::StatusChanged(StatusChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.to,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.order_id)?;

        if !self.status.accepts_payments() {
            return Err(DomainError::invariant(format!(
                "payments are not accepted while the order is {}",
                self.status.as_str()
            )));
        }
        if cmd.payment.amount_minor <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if cmd.payment.amount_minor > self.totals.balance_due {
            return Err(DomainError::validation(format!(
                "payment of {} exceeds balance due {}",
                cmd.payment.amount_minor, self.totals.balance_due
            )));
        }

        let totals = self.recalculated(
            cmd.tenant_id,
            &self.lines,
            self.order_discount,
            self.shipping,
            self.totals.amount_paid + cmd.payment.amount_minor,
            cmd.occurred_at,
        )?;
        Ok(vec![
            PurchaseOrderEvent::PaymentRecorded(PaymentRecorded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                payment: cmd.payment.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            totals,
        ])
    }

    fn handle_delete(&self, cmd: &DeletePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("purchase order is already deleted"));
        }
        Ok(vec![PurchaseOrderEvent::PurchaseOrderDeleted(PurchaseOrderDeleted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestorePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("purchase order is not deleted"));
        }
        Ok(vec![PurchaseOrderEvent::PurchaseOrderRestored(PurchaseOrderRestored {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
