use async_trait::async_trait;
use checkout_core::{
    AmountBreakdown, Capture, CaptureResult, CaptureStatus, GatewayError, GatewayResult, PaymentGateway, Refund,
    RefundResult, RefundStatus, RemoteOrder,
};
use checkout_shared::Money;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Gateway operations, used to inspect and steer the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateOrder,
    PatchOrder,
    CaptureOrder,
    RefundCapture,
    GetOrder,
}

impl GatewayOp {
    const ALL: [GatewayOp; 5] = [
        GatewayOp::CreateOrder,
        GatewayOp::PatchOrder,
        GatewayOp::CaptureOrder,
        GatewayOp::RefundCapture,
        GatewayOp::GetOrder,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
struct MockOrder {
    amount: Money,
    status: &'static str,
    capture_id: Option<String>,
}

#[derive(Debug, Clone)]
struct MockCapture {
    order_id: String,
    amount: Money,
    refunded: Money,
}

#[derive(Default)]
struct MockState {
    orders: HashMap<String, MockOrder>,
    captures: HashMap<String, MockCapture>,
    failures: HashMap<GatewayOp, GatewayError>,
    capture_status: Option<CaptureStatus>,
    refund_status: Option<RefundStatus>,
}

/// In-memory stand-in for the payment provider. Answers with provider-shaped
/// JSON, enforces refund limits on its side as well, and counts every call.
pub struct MockPaymentGateway {
    state: Mutex<MockState>,
    calls: [AtomicUsize; 5],
    latency: Option<Duration>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            calls: Default::default(),
            latency: None,
        }
    }

    /// Delay every call, so overlapping requests actually interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent call of `op` fail with `error`.
    pub fn fail(&self, op: GatewayOp, error: GatewayError) {
        self.lock().failures.insert(op, error);
    }

    pub fn recover(&self, op: GatewayOp) {
        self.lock().failures.remove(&op);
    }

    /// Status reported for captures from now on (defaults to COMPLETED).
    pub fn set_capture_status(&self, status: CaptureStatus) {
        self.lock().capture_status = Some(status);
    }

    /// Status reported for refunds from now on (defaults to COMPLETED).
    pub fn set_refund_status(&self, status: RefundStatus) {
        self.lock().refund_status = Some(status);
    }

    pub fn calls(&self, op: GatewayOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        GatewayOp::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, op: GatewayOp) -> GatewayResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple()).to_uppercase()
}

fn not_found(resource: &str, id: &str) -> GatewayError {
    GatewayError::Provider {
        status: 404,
        message: format!("RESOURCE_NOT_FOUND: {} {} does not exist", resource, id),
        debug_id: Some(mock_id("DBG")),
    }
}

fn order_json(id: &str, order: &MockOrder) -> serde_json::Value {
    json!({
        "id": id,
        "status": order.status,
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": "default",
            "amount": order.amount,
        }],
    })
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(&self, amount: &Money) -> GatewayResult<RemoteOrder> {
        self.enter(GatewayOp::CreateOrder).await?;

        let id = mock_id("MOCK");
        let order = MockOrder {
            amount: amount.clone(),
            status: "CREATED",
            capture_id: None,
        };
        let raw = order_json(&id, &order);
        self.lock().orders.insert(id.clone(), order);

        Ok(RemoteOrder {
            id,
            status: "CREATED".to_string(),
            raw,
        })
    }

    async fn patch_order(&self, order_id: &str, breakdown: &AmountBreakdown) -> GatewayResult<()> {
        self.enter(GatewayOp::PatchOrder).await?;

        let mut state = self.lock();
        let order = state.orders.get_mut(order_id).ok_or_else(|| not_found("order", order_id))?;
        if order.status != "CREATED" {
            return Err(GatewayError::Provider {
                status: 422,
                message: "UNPROCESSABLE_ENTITY: order can no longer be patched".to_string(),
                debug_id: Some(mock_id("DBG")),
            });
        }
        order.amount = breakdown.total.clone();
        Ok(())
    }

    async fn capture_order(&self, order_id: &str) -> GatewayResult<CaptureResult> {
        self.enter(GatewayOp::CaptureOrder).await?;

        let mut state = self.lock();
        let status = state.capture_status.unwrap_or(CaptureStatus::Completed);
        let order = state.orders.get_mut(order_id).ok_or_else(|| not_found("order", order_id))?;

        let capture = Capture {
            id: mock_id("CAP"),
            order_id: order_id.to_string(),
            amount: order.amount.clone(),
            status,
        };
        order.status = if status == CaptureStatus::Completed { "COMPLETED" } else { "PAYER_ACTION_REQUIRED" };
        order.capture_id = Some(capture.id.clone());
        let order_status = order.status;

        let raw = json!({
            "id": order_id,
            "status": order_status,
            "purchase_units": [{
                "reference_id": "default",
                "payments": {
                    "captures": [{
                        "id": capture.id,
                        "status": capture.status,
                        "amount": capture.amount,
                    }]
                }
            }],
        });

        if status == CaptureStatus::Completed {
            state.captures.insert(
                capture.id.clone(),
                MockCapture {
                    order_id: order_id.to_string(),
                    refunded: Money::zero(capture.amount.currency().clone()),
                    amount: capture.amount.clone(),
                },
            );
        }

        Ok(CaptureResult {
            order_id: order_id.to_string(),
            order_status: order_status.to_string(),
            capture: Some(capture),
            raw,
        })
    }

    async fn refund_capture(&self, capture_id: &str, amount: Option<&Money>) -> GatewayResult<RefundResult> {
        self.enter(GatewayOp::RefundCapture).await?;

        let mut state = self.lock();
        let status = state.refund_status.unwrap_or(RefundStatus::Completed);
        let capture = state.captures.get_mut(capture_id).ok_or_else(|| not_found("capture", capture_id))?;

        let remaining = capture
            .amount
            .checked_sub(&capture.refunded)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        let amount = amount.cloned().unwrap_or_else(|| remaining.clone());
        if amount.amount() > remaining.amount() {
            return Err(GatewayError::Provider {
                status: 422,
                message: "REFUND_AMOUNT_EXCEEDED: refund exceeds the remaining captured amount".to_string(),
                debug_id: Some(mock_id("DBG")),
            });
        }
        if status.is_accepted() {
            capture.refunded = capture
                .refunded
                .checked_add(&amount)
                .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        }

        let refund = Refund {
            id: mock_id("REF"),
            capture_id: capture_id.to_string(),
            amount: Some(amount),
            status,
        };
        let raw = json!({
            "id": refund.id,
            "status": refund.status,
            "amount": refund.amount,
            "capture_order_id": capture.order_id,
        });

        Ok(RefundResult { refund, raw })
    }

    async fn get_order(&self, order_id: &str) -> GatewayResult<RemoteOrder> {
        self.enter(GatewayOp::GetOrder).await?;

        let state = self.lock();
        let order = state.orders.get(order_id).ok_or_else(|| not_found("order", order_id))?;
        let mut raw = order_json(order_id, order);
        if let Some(capture_id) = &order.capture_id {
            raw["purchase_units"][0]["payments"] = json!({"captures": [{"id": capture_id}]});
        }

        Ok(RemoteOrder {
            id: order_id.to_string(),
            status: order.status.to_string(),
            raw,
        })
    }
}
