use checkout_order::CheckoutCoordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<CheckoutCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<CheckoutCoordinator>) -> Self {
        Self { coordinator }
    }
}
