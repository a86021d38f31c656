pub mod pricing;

pub use pricing::{
    compute_grand_total, compute_shipping, PricingConfig, PricingEngine, PricingError,
    ShippingRule, ShippingRules,
};
