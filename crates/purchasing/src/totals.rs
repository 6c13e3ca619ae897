//! Purchase order financial figures.
//!
//! All amounts are integer minor units of the order currency. Percentages are
//! basis points (1% = 100 bp) and every rounding step is half away from zero.

use serde::{Deserialize, Serialize};

use nimbus_core::money::apply_basis_points;
use nimbus_core::{DomainError, DomainResult};

pub const MAX_BASIS_POINTS: u32 = 10_000;

/// One priced line on a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub description: String,
    pub product_code: Option<String>,
    pub quantity: i64,
    pub unit_price_minor: i64,
    pub discount_bp: u32,
    pub tax_rate_bp: u32,
}

/// Caller-supplied line fields; the aggregate assigns `line_no`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub description: String,
    pub product_code: Option<String>,
    pub quantity: i64,
    pub unit_price_minor: i64,
    #[serde(default)]
    pub discount_bp: u32,
    #[serde(default)]
    pub tax_rate_bp: u32,
}

impl LineInput {
    pub fn into_line(self, line_no: u32) -> DomainResult<PurchaseOrderLine> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(DomainError::validation("line description cannot be empty"));
        }
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.unit_price_minor < 0 {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if self.discount_bp > MAX_BASIS_POINTS {
            return Err(DomainError::validation("line discount cannot exceed 100%"));
        }
        if self.tax_rate_bp > MAX_BASIS_POINTS {
            return Err(DomainError::validation("tax rate cannot exceed 100%"));
        }
        let line = PurchaseOrderLine {
            line_no,
            description,
            product_code: self
                .product_code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            quantity: self.quantity,
            unit_price_minor: self.unit_price_minor,
            discount_bp: self.discount_bp,
            tax_rate_bp: self.tax_rate_bp,
        };
        line.amounts()?;
        Ok(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    /// `subtotal - discount + tax`.
    pub total: i64,
}

impl PurchaseOrderLine {
    pub fn amounts(&self) -> DomainResult<LineAmounts> {
        let subtotal = self
            .quantity
            .checked_mul(self.unit_price_minor)
            .ok_or_else(|| DomainError::validation("line amount overflow"))?;
        let discount = apply_basis_points(subtotal, self.discount_bp);
        let tax = apply_basis_points(subtotal - discount, self.tax_rate_bp);
        Ok(LineAmounts {
            subtotal,
            discount,
            tax,
            total: subtotal - discount + tax,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

/// Header figures kept in sync with lines, adjustments and payments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: i64,
    /// Line discounts plus the order-level discount.
    pub discount_total: i64,
    pub tax_total: i64,
    pub shipping: i64,
    pub total: i64,
    pub amount_paid: i64,
    pub balance_due: i64,
}

impl OrderTotals {
    pub fn compute(
        lines: &[PurchaseOrderLine],
        order_discount: i64,
        shipping: i64,
        amount_paid: i64,
    ) -> DomainResult<Self> {
        if order_discount < 0 {
            return Err(DomainError::validation("order discount cannot be negative"));
        }
        if shipping < 0 {
            return Err(DomainError::validation("shipping cannot be negative"));
        }

        let overflow = || DomainError::validation("order amount overflow");
        let (mut subtotal, mut line_discounts, mut tax_total) = (0i64, 0i64, 0i64);
        for line in lines {
            let a = line.amounts()?;
            subtotal = subtotal.checked_add(a.subtotal).ok_or_else(overflow)?;
            line_discounts = line_discounts.checked_add(a.discount).ok_or_else(overflow)?;
            tax_total = tax_total.checked_add(a.tax).ok_or_else(overflow)?;
        }

        if order_discount > subtotal - line_discounts {
            return Err(DomainError::validation(
                "order discount cannot exceed the net line amount",
            ));
        }

        let discount_total = line_discounts + order_discount;
        let total = (subtotal - discount_total)
            .checked_add(tax_total)
            .and_then(|t| t.checked_add(shipping))
            .ok_or_else(overflow)?;

        Ok(Self {
            subtotal,
            discount_total,
            tax_total,
            shipping,
            total,
            amount_paid,
            balance_due: total - amount_paid,
        })
    }

    pub fn payment_status(&self) -> PaymentStatus {
        if self.amount_paid <= 0 {
            PaymentStatus::Unpaid
        } else if self.balance_due <= 0 {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(qty: i64, price: i64, discount_bp: u32, tax_bp: u32) -> PurchaseOrderLine {
        LineInput {
            description: "Widget".into(),
            product_code: None,
            quantity: qty,
            unit_price_minor: price,
            discount_bp,
            tax_rate_bp: tax_bp,
        }
        .into_line(1)
        .unwrap()
    }

    #[test]
    fn line_amounts_apply_discount_before_tax() {
        // 3 x 10.00, 10% off, 20% tax
        let a = line(3, 1000, 1000, 2000).amounts().unwrap();
        assert_eq!(a.subtotal, 3000);
        assert_eq!(a.discount, 300);
        assert_eq!(a.tax, 540);
        assert_eq!(a.total, 3240);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        // 1 x 0.05 at 10% = 0.5 cent -> 1 cent
        let a = line(1, 5, 1000, 0).amounts().unwrap();
        assert_eq!(a.discount, 1);
    }

    #[test]
    fn order_totals_include_discount_and_shipping() {
        let lines = vec![line(2, 5000, 0, 1000), line(1, 2000, 500, 0)];
        let t = OrderTotals::compute(&lines, 1000, 1500, 0).unwrap();
        assert_eq!(t.subtotal, 12_000);
        assert_eq!(t.discount_total, 1100);
        assert_eq!(t.tax_total, 1000);
        assert_eq!(t.shipping, 1500);
        assert_eq!(t.total, 12_000 - 1100 + 1000 + 1500);
        assert_eq!(t.balance_due, t.total);
        assert_eq!(t.payment_status(), PaymentStatus::Unpaid);
    }

    #[test]
    fn order_discount_cannot_exceed_net() {
        let lines = vec![line(1, 1000, 5000, 0)];
        assert!(OrderTotals::compute(&lines, 501, 0, 0).is_err());
        assert!(OrderTotals::compute(&lines, 500, 0, 0).is_ok());
    }

    #[test]
    fn payment_status_follows_balance() {
        let lines = vec![line(1, 1000, 0, 0)];
        let partial = OrderTotals::compute(&lines, 0, 0, 400).unwrap();
        assert_eq!(partial.payment_status(), PaymentStatus::Partial);
        let paid = OrderTotals::compute(&lines, 0, 0, 1000).unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn invalid_line_inputs_are_rejected() {
        let base = LineInput {
            description: "Bolt".into(),
            product_code: Some("  ".into()),
            quantity: 1,
            unit_price_minor: 10,
            discount_bp: 0,
            tax_rate_bp: 0,
        };
        assert_eq!(base.clone().into_line(1).unwrap().product_code, None);
        assert!(LineInput { quantity: 0, ..base.clone() }.into_line(1).is_err());
        assert!(LineInput { unit_price_minor: -1, ..base.clone() }.into_line(1).is_err());
        assert!(LineInput { discount_bp: 10_001, ..base.clone() }.into_line(1).is_err());
        assert!(LineInput { description: " ".into(), ..base }.into_line(1).is_err());
    }

    fn arb_line() -> impl Strategy<Value = PurchaseOrderLine> {
        (1i64..1_000, 0i64..1_000_000, 0u32..=10_000, 0u32..=3_000)
            .prop_map(|(q, p, d, t)| line(q, p, d, t))
    }

    proptest! {
        #[test]
        fn total_identity_holds(
            lines in proptest::collection::vec(arb_line(), 0..8),
            shipping in 0i64..100_000,
        ) {
            let t = OrderTotals::compute(&lines, 0, shipping, 0).unwrap();
            prop_assert_eq!(t.total, t.subtotal - t.discount_total + t.tax_total + t.shipping);
            let line_sum: i64 = lines.iter().map(|l| l.amounts().unwrap().total).sum();
            prop_assert_eq!(t.total, line_sum + shipping);
            prop_assert!(t.discount_total <= t.subtotal);
        }
    }
}
