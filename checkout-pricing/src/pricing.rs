use checkout_core::{Address, CartItem};
use checkout_shared::{CurrencyCode, Money, MoneyError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("Invalid pricing configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid cart: {0}")]
    InvalidCart(String),
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A postal-code prefix and the flat shipping cost it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRule {
    pub prefix: String,
    pub cost: Decimal,
}

impl ShippingRule {
    pub fn new(prefix: &str, cost: Decimal) -> Self {
        Self {
            prefix: normalize_postal_code(prefix),
            cost,
        }
    }
}

/// Ordered rule table, evaluated first-match-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingRules {
    pub currency: CurrencyCode,
    pub rules: Vec<ShippingRule>,
    pub default_cost: Decimal,
}

/// Trimmed and upper-cased, so "sw1a 1aa " and "SW1A 1AA" price the same.
pub fn normalize_postal_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Shipping cost for an address. Never fails: unmatched or empty postal
/// codes fall through to the default cost.
pub fn compute_shipping(address: &Address, rules: &ShippingRules) -> Money {
    let postal_code = normalize_postal_code(&address.postal_code);

    let cost = rules
        .rules
        .iter()
        .find(|rule| postal_code.starts_with(&rule.prefix))
        .map(|rule| rule.cost)
        .unwrap_or(rules.default_cost);

    Money::new(cost, rules.currency.clone())
}

/// Item total plus shipping, in fixed-point.
pub fn compute_grand_total(item_total: &Money, shipping: &Money) -> Result<Money, PricingError> {
    Ok(item_total.checked_add(shipping)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub currency: CurrencyCode,

    /// Used when the cart is empty or no catalog is configured
    pub item_total: Decimal,

    /// Cost applied when no rule matches
    pub default_shipping: Decimal,

    #[serde(default)]
    pub shipping_rules: Vec<ShippingRule>,

    /// Product id -> unit price
    #[serde(default)]
    pub catalog: BTreeMap<String, Decimal>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::usd(),
            item_total: Decimal::new(10000, 2),
            default_shipping: Decimal::new(1500, 2),
            shipping_rules: vec![
                ShippingRule::new("75", Decimal::new(500, 2)),
                ShippingRule::new("10", Decimal::new(750, 2)),
                ShippingRule::new("94", Decimal::new(900, 2)),
            ],
            catalog: {
                let mut m = BTreeMap::new();
                m.insert("product-1".to_string(), Decimal::new(10000, 2));
                m
            },
        }
    }
}

/// Prices carts and shipping for a single currency.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    default_item_total: Money,
    shipping: ShippingRules,
    catalog: BTreeMap<String, Money>,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Result<Self, PricingError> {
        let currency = config.currency;

        let default_item_total = validated(&currency, "item_total", config.item_total)?;
        let default_shipping = validated(&currency, "default_shipping", config.default_shipping)?;

        let mut rules = Vec::with_capacity(config.shipping_rules.len());
        for rule in config.shipping_rules {
            let cost = validated(&currency, &format!("shipping rule '{}'", rule.prefix), rule.cost)?;
            rules.push(ShippingRule::new(&rule.prefix, cost.amount()));
        }

        let mut catalog = BTreeMap::new();
        for (product_id, price) in config.catalog {
            let price = validated(&currency, &format!("catalog entry '{}'", product_id), price)?;
            catalog.insert(product_id, price);
        }

        Ok(Self {
            default_item_total,
            shipping: ShippingRules {
                currency,
                rules,
                default_cost: default_shipping.amount(),
            },
            catalog,
        })
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.shipping.currency
    }

    pub fn shipping_rules(&self) -> &ShippingRules {
        &self.shipping
    }

    pub fn shipping_for(&self, address: &Address) -> Money {
        compute_shipping(address, &self.shipping)
    }

    /// Item total for a cart. An empty cart, or an engine without a catalog,
    /// prices at the configured default item total.
    pub fn item_total(&self, cart: &[CartItem]) -> Result<Money, PricingError> {
        if cart.is_empty() || self.catalog.is_empty() {
            return Ok(self.default_item_total.clone());
        }

        let mut total = Money::zero(self.currency().clone());
        for item in cart {
            if item.quantity == 0 {
                return Err(PricingError::InvalidCart(format!("quantity for '{}' must be at least 1", item.id)));
            }
            let price = self
                .catalog
                .get(&item.id)
                .ok_or_else(|| PricingError::InvalidCart(format!("unknown product '{}'", item.id)))?;
            total = total.checked_add(&price.checked_mul(item.quantity)?)?;
        }
        Ok(total)
    }
}

fn validated(currency: &CurrencyCode, field: &str, amount: Decimal) -> Result<Money, PricingError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(PricingError::InvalidConfig(format!("{} must not be negative", field)));
    }
    if amount.normalize().scale() > checkout_shared::money::MONEY_SCALE {
        return Err(PricingError::InvalidConfig(format!("{} has more than two decimal places", field)));
    }
    if amount > checkout_shared::money::MAX_AMOUNT {
        return Err(PricingError::InvalidConfig(format!("{} is out of range", field)));
    }
    Ok(Money::new(amount, currency.clone()))
}
