use checkout_core::{Address, Capture, Refund};
use checkout_pricing::{compute_grand_total, PricingError};
use checkout_shared::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status in the checkout lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    ShippingSet,
    Captured,
    PartiallyRefunded,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::ShippingSet => "SHIPPING_SET",
            OrderStatus::Captured => "CAPTURED",
            OrderStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Failed => "FAILED",
        }
    }

    /// Shipping may be (re)priced and the order captured.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::ShippingSet)
    }

    /// Funds have been taken and some are still refundable.
    pub fn is_refundable(&self) -> bool {
        matches!(self, OrderStatus::Captured | OrderStatus::PartiallyRefunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record of a provider order. The grand total is always derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub item_total: Money,
    pub shipping_amount: Option<Money>,
    pub shipping_address: Option<Address>,
    pub capture: Option<Capture>,
    pub refunds: Vec<Refund>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: String, item_total: Money) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: OrderStatus::Created,
            item_total,
            shipping_amount: None,
            shipping_address: None,
            capture: None,
            refunds: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Item total plus shipping; unpriced shipping counts as zero.
    pub fn grand_total(&self) -> Result<Money, PricingError> {
        match &self.shipping_amount {
            Some(shipping) => compute_grand_total(&self.item_total, shipping),
            None => Ok(self.item_total.clone()),
        }
    }

    /// Sum of recorded refunds, in the capture's currency.
    pub fn refunded_total(&self) -> Option<Money> {
        let capture = self.capture.as_ref()?;
        self.refunds
            .iter()
            .filter_map(|refund| refund.amount.as_ref())
            .try_fold(Money::zero(capture.amount.currency().clone()), |total, amount| {
                total.checked_add(amount).ok()
            })
    }

    /// What can still be refunded; `None` until the order is captured.
    pub fn remaining_balance(&self) -> Option<Money> {
        if !matches!(self.status, OrderStatus::Captured | OrderStatus::PartiallyRefunded | OrderStatus::Refunded) {
            return None;
        }
        let capture = self.capture.as_ref()?;
        capture.amount.checked_sub(&self.refunded_total()?).ok()
    }

    pub fn snapshot(&self) -> Result<OrderSnapshot, PricingError> {
        Ok(OrderSnapshot {
            id: self.id.clone(),
            status: self.status,
            item_total: self.item_total.clone(),
            shipping_amount: self.shipping_amount.clone(),
            grand_total: self.grand_total()?,
            capture_id: self.capture.as_ref().map(|c| c.id.clone()),
            captured_amount: self.capture.as_ref().map(|c| c.amount.clone()),
            refunded_total: self.refunded_total(),
            remaining_balance: self.remaining_balance(),
            refunds: self.refunds.clone(),
            updated_at: self.updated_at,
        })
    }
}

/// Serializable view of an order, including the derived totals.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub status: OrderStatus,
    pub item_total: Money,
    pub shipping_amount: Option<Money>,
    pub grand_total: Money,
    pub capture_id: Option<String>,
    pub captured_amount: Option<Money>,
    pub refunded_total: Option<Money>,
    pub remaining_balance: Option<Money>,
    pub refunds: Vec<Refund>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{CaptureStatus, RefundStatus};
    use checkout_shared::CurrencyCode;
    use rust_decimal::Decimal;

    fn usd(value: &str) -> Money {
        Money::parse(value, CurrencyCode::usd()).unwrap()
    }

    #[test]
    fn test_grand_total_is_derived() {
        let mut order = Order::new("ORDER-1".to_string(), usd("100.00"));
        assert_eq!(order.grand_total().unwrap().value(), "100.00");

        order.shipping_amount = Some(usd("5.00"));
        assert_eq!(order.grand_total().unwrap().value(), "105.00");

        order.shipping_amount = Some(usd("15.00"));
        assert_eq!(order.grand_total().unwrap().value(), "115.00");
    }

    #[test]
    fn test_grand_total_overflow_is_reported() {
        let mut order = Order::new("ORDER-1".to_string(), Money::new(Decimal::MAX, CurrencyCode::usd()));
        order.shipping_amount = Some(Money::new(Decimal::MAX, CurrencyCode::usd()));
        assert!(order.grand_total().is_err());
        assert!(order.snapshot().is_err());
    }

    #[test]
    fn test_remaining_balance_tracks_refunds() {
        let mut order = Order::new("ORDER-1".to_string(), usd("100.00"));
        assert!(order.remaining_balance().is_none());

        order.capture = Some(Capture {
            id: "CAP-1".to_string(),
            order_id: order.id.clone(),
            amount: usd("115.00"),
            status: CaptureStatus::Completed,
        });
        order.update_status(OrderStatus::Captured);
        assert_eq!(order.remaining_balance().unwrap().value(), "115.00");

        order.refunds.push(Refund {
            id: "REF-1".to_string(),
            capture_id: "CAP-1".to_string(),
            amount: Some(usd("15.50")),
            status: RefundStatus::Completed,
        });
        assert_eq!(order.refunded_total().unwrap().value(), "15.50");
        assert_eq!(order.remaining_balance().unwrap().value(), "99.50");
    }
}
