use crate::models::{Order, OrderSnapshot, OrderStatus};
use checkout_core::{Address, AmountBreakdown, CaptureStatus, CartItem, GatewayError, PaymentGateway, Refund, RemoteOrder};
use checkout_pricing::{compute_grand_total, PricingEngine, PricingError};
use checkout_shared::money::{MAX_AMOUNT, MONEY_SCALE};
use checkout_shared::Money;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid cart: {0}")]
    InvalidCart(String),

    #[error("Capture for order {order_id} was not completed (status {status})")]
    CaptureNotCompleted {
        order_id: String,
        capture_id: Option<String>,
        status: String,
    },

    #[error("Refund {refund_id} against capture {capture_id} was not completed (status {status})")]
    RefundNotCompleted {
        capture_id: String,
        refund_id: String,
        status: String,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidCart(msg) => CheckoutError::InvalidCart(msg),
            other => CheckoutError::InvalidAmount(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: OrderSnapshot,
    pub remote: RemoteOrder,
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub order: OrderSnapshot,
    /// Provider's capture response, relayed to the client
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub order: OrderSnapshot,
    pub refund: Refund,
    pub raw: Value,
}

/// Drives orders through CREATED -> SHIPPING_SET -> CAPTURED -> (PARTIALLY_)REFUNDED.
///
/// Each order sits behind its own mutex, held from the local state check
/// through the provider call to the commit. A transition therefore either
/// commits fully or leaves the order untouched, and two refunds against the
/// same capture can never both pass the balance check.
pub struct CheckoutCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingEngine,
    orders: RwLock<HashMap<String, Arc<Mutex<Order>>>>,
    // capture id -> order id
    captures: RwLock<HashMap<String, String>>,
}

impl CheckoutCoordinator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, pricing: PricingEngine) -> Self {
        Self {
            gateway,
            pricing,
            orders: RwLock::new(HashMap::new()),
            captures: RwLock::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Open a provider order for the cart. Nothing is stored unless the provider accepts it.
    #[instrument(skip(self, cart), fields(items = cart.len()))]
    pub async fn create(&self, cart: &[CartItem]) -> Result<CreatedOrder, CheckoutError> {
        let item_total = self.pricing.item_total(cart)?;

        let remote = self.gateway.create_order(&item_total).await.map_err(|e| {
            error!("Failed to create provider order: {}", e);
            e
        })?;

        let order = Order::new(remote.id.clone(), item_total);
        let snapshot = order.snapshot()?;
        self.orders.write().await.insert(order.id.clone(), Arc::new(Mutex::new(order)));

        info!("Order {} created for {}", remote.id, snapshot.item_total);
        Ok(CreatedOrder { order: snapshot, remote })
    }

    /// Price shipping for `address` and push the new breakdown to the provider.
    #[instrument(skip(self, address))]
    pub async fn set_shipping(&self, order_id: &str, address: Address) -> Result<OrderSnapshot, CheckoutError> {
        let handle = self.order_handle(order_id).await?;
        let mut order = handle.lock().await;
        ensure_open(&order, OrderStatus::ShippingSet)?;

        let shipping = self.pricing.shipping_for(&address);
        info!("Shipping for order {} priced at {}", order_id, shipping);
        self.apply_shipping(&mut order, shipping, Some(address)).await
    }

    /// Set an explicit shipping amount chosen by the client.
    #[instrument(skip(self))]
    pub async fn set_shipping_amount(&self, order_id: &str, amount: Decimal) -> Result<OrderSnapshot, CheckoutError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CheckoutError::InvalidAmount(format!("shipping amount {} is negative", amount)));
        }
        ensure_precision(amount)?;

        let handle = self.order_handle(order_id).await?;
        let mut order = handle.lock().await;
        ensure_open(&order, OrderStatus::ShippingSet)?;

        let shipping = Money::new(amount, order.item_total.currency().clone());
        self.apply_shipping(&mut order, shipping, None).await
    }

    async fn apply_shipping(
        &self,
        order: &mut Order,
        shipping: Money,
        address: Option<Address>,
    ) -> Result<OrderSnapshot, CheckoutError> {
        let total = compute_grand_total(&order.item_total, &shipping)?;
        let breakdown = AmountBreakdown {
            item_total: order.item_total.clone(),
            shipping: shipping.clone(),
            total,
        };

        self.gateway.patch_order(&order.id, &breakdown).await.map_err(|e| {
            error!("Failed to patch order {}: {}", order.id, e);
            e
        })?;

        order.shipping_amount = Some(shipping);
        if address.is_some() {
            order.shipping_address = address;
        }
        order.update_status(OrderStatus::ShippingSet);

        info!("Order {} total is now {}", order.id, breakdown.total);
        order.snapshot().map_err(CheckoutError::from)
    }

    /// Capture the order. Only CREATED or SHIPPING_SET orders reach the provider,
    /// so a second capture is refused locally.
    #[instrument(skip(self))]
    pub async fn capture(&self, order_id: &str) -> Result<CaptureOutcome, CheckoutError> {
        let handle = self.order_handle(order_id).await?;
        let mut order = handle.lock().await;
        ensure_open(&order, OrderStatus::Captured)?;

        let result = self.gateway.capture_order(&order.id).await.map_err(|e| {
            error!("Failed to capture order {}: {}", order_id, e);
            e
        })?;

        match result.capture {
            Some(capture) if capture.status == CaptureStatus::Completed => {
                let capture_id = capture.id.clone();
                info!("Order {} captured: {} for {}", order_id, capture_id, capture.amount);

                order.capture = Some(capture);
                order.update_status(OrderStatus::Captured);
                self.captures.write().await.insert(capture_id, order.id.clone());

                Ok(CaptureOutcome {
                    order: order.snapshot()?,
                    raw: result.raw,
                })
            }
            capture => {
                let capture_id = capture.as_ref().map(|c| c.id.clone());
                let status = match &capture {
                    Some(c) => serde_json::to_value(c.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| result.order_status.clone()),
                    None => result.order_status.clone(),
                };
                warn!("Capture for order {} not completed: {} ({:?})", order_id, status, capture_id);

                order.capture = capture;
                order.update_status(OrderStatus::Failed);

                Err(CheckoutError::CaptureNotCompleted {
                    order_id: order_id.to_string(),
                    capture_id,
                    status,
                })
            }
        }
    }

    /// Refund a capture. `None` refunds the full remaining balance.
    #[instrument(skip(self))]
    pub async fn refund(&self, capture_id: &str, amount: Option<Decimal>) -> Result<RefundOutcome, CheckoutError> {
        let order_id = self
            .captures
            .read()
            .await
            .get(capture_id)
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(format!("capture {}", capture_id)))?;

        let handle = self.order_handle(&order_id).await?;
        let mut order = handle.lock().await;

        if !order.status.is_refundable() {
            warn!("Refund rejected for order {} in status {}", order_id, order.status);
            return Err(CheckoutError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            });
        }

        let remaining = order.remaining_balance().ok_or(CheckoutError::InvalidTransition {
            from: order.status,
            to: OrderStatus::Refunded,
        })?;

        let requested = match amount {
            Some(amount) => {
                if amount <= Decimal::ZERO {
                    return Err(CheckoutError::InvalidAmount(format!("refund amount {} must be positive", amount)));
                }
                ensure_precision(amount)?;
                let requested = Money::new(amount, remaining.currency().clone());
                if requested.amount() > remaining.amount() {
                    warn!("Refund of {} exceeds remaining {} on capture {}", requested, remaining, capture_id);
                    return Err(CheckoutError::InvalidAmount(format!(
                        "refund {} exceeds remaining balance {}",
                        requested, remaining
                    )));
                }
                Some(requested)
            }
            None => None,
        };

        // The provider only understands "no amount" as the whole capture, so
        // once anything was refunded the remainder is sent explicitly.
        let effective = requested.clone().unwrap_or_else(|| remaining.clone());
        let to_send = match requested {
            Some(amount) => Some(amount),
            None if order.refunds.is_empty() => None,
            None => Some(remaining.clone()),
        };

        let result = self.gateway.refund_capture(capture_id, to_send.as_ref()).await.map_err(|e| {
            error!("Failed to refund capture {}: {}", capture_id, e);
            e
        })?;

        if !result.refund.status.is_accepted() {
            let status = serde_json::to_value(result.refund.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            warn!("Refund {} on capture {} not completed: {}", result.refund.id, capture_id, status);
            return Err(CheckoutError::RefundNotCompleted {
                capture_id: capture_id.to_string(),
                refund_id: result.refund.id,
                status,
            });
        }

        let mut refund = result.refund;
        refund.amount = Some(effective);
        order.refunds.push(refund.clone());

        let fully_refunded = order.remaining_balance().map(|m| m.is_zero()).unwrap_or(false);
        order.update_status(if fully_refunded {
            OrderStatus::Refunded
        } else {
            OrderStatus::PartiallyRefunded
        });

        info!("Refund {} recorded on capture {}; order {} is {}", refund.id, capture_id, order_id, order.status);
        Ok(RefundOutcome {
            order: order.snapshot()?,
            refund,
            raw: result.raw,
        })
    }

    /// Local view of an order.
    pub async fn get(&self, order_id: &str) -> Result<OrderSnapshot, CheckoutError> {
        let handle = self.order_handle(order_id).await?;
        let order = handle.lock().await;
        order.snapshot().map_err(CheckoutError::from)
    }

    /// The provider's view of an order, whether or not it is tracked locally.
    #[instrument(skip(self))]
    pub async fn remote_order(&self, order_id: &str) -> Result<RemoteOrder, CheckoutError> {
        Ok(self.gateway.get_order(order_id).await?)
    }

    /// Accept either a capture id or the id of a captured order and return the capture id.
    pub async fn resolve_capture(&self, id: &str) -> Result<String, CheckoutError> {
        if self.captures.read().await.contains_key(id) {
            return Ok(id.to_string());
        }

        let handle = self.order_handle(id).await.map_err(|_| CheckoutError::NotFound(format!("capture {}", id)))?;
        let order = handle.lock().await;
        order
            .capture
            .as_ref()
            .filter(|_| order.status.is_refundable() || order.status == OrderStatus::Refunded)
            .map(|c| c.id.clone())
            .ok_or_else(|| CheckoutError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            })
    }

    async fn order_handle(&self, order_id: &str) -> Result<Arc<Mutex<Order>>, CheckoutError> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(order_id.to_string()))
    }
}

fn ensure_open(order: &Order, to: OrderStatus) -> Result<(), CheckoutError> {
    if !order.status.is_open() {
        warn!("Rejected transition of order {} from {} to {}", order.id, order.status, to);
        return Err(CheckoutError::InvalidTransition { from: order.status, to });
    }
    Ok(())
}

fn ensure_precision(amount: Decimal) -> Result<(), CheckoutError> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(CheckoutError::InvalidAmount(format!("{} has more than two decimal places", amount)));
    }
    if amount.abs() > MAX_AMOUNT {
        return Err(CheckoutError::InvalidAmount(format!("{} is out of range", amount)));
    }
    Ok(())
}
