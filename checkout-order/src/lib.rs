pub mod models;
pub mod coordinator;
pub mod mock;

pub use models::{Order, OrderSnapshot, OrderStatus};
pub use coordinator::{CaptureOutcome, CheckoutCoordinator, CheckoutError, CreatedOrder, RefundOutcome};
pub use mock::{GatewayOp, MockPaymentGateway};
