//! Purchasing domain module (purchase orders with priced lines, event-sourced).
//!
//! Pure business rules: no IO, no HTTP, no storage.

pub mod order;
pub mod totals;

pub use order::{
    AddLine, AdjustmentsSet, ChangeStatus, CreatePurchaseOrder, DeletePurchaseOrder, LineAdded,
    LineRemoved, LineUpdated, Payment, PaymentRecorded, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderCreated, PurchaseOrderDeleted, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderRestored, PurchaseOrderStatus, RecordPayment, RemoveLine, RestorePurchaseOrder,
    SetAdjustments, StatusChanged, TotalsRecalculated, UpdateLine,
};
pub use totals::{LineAmounts, LineInput, OrderTotals, PaymentStatus, PurchaseOrderLine};
