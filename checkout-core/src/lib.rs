pub mod checkout;
pub mod payment;

pub use checkout::{Address, CartItem};
pub use payment::{
    AmountBreakdown, Capture, CaptureResult, CaptureStatus, GatewayError, GatewayResult,
    PaymentGateway, Refund, RefundResult, RefundStatus, RemoteOrder,
};
