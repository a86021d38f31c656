use checkout_shared::Masked;
use serde::{Deserialize, Serialize};

/// Shipping address as typed by the shopper. Only the postal code feeds
/// pricing; nothing here is checked for deliverability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, alias = "line1")]
    pub address_line1: Masked<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default, alias = "region")]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country_code: String,
}

impl Address {
    pub fn with_postal_code(postal_code: impl Into<String>) -> Self {
        Self {
            postal_code: postal_code.into(),
            ..Default::default()
        }
    }
}

/// One line of the client's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_accepts_client_field_names() {
        let address: Address = serde_json::from_value(serde_json::json!({
            "addressLine1": "1 Rue de Rivoli",
            "city": "Paris",
            "region": "IDF",
            "postalCode": "75001",
            "countryCode": "FR"
        }))
        .unwrap();

        assert_eq!(address.postal_code, "75001");
        assert_eq!(address.state, "IDF");
        assert!(!format!("{:?}", address).contains("Rivoli"));
    }

    #[test]
    fn test_cart_quantity_defaults_to_one() {
        let item: CartItem = serde_json::from_value(serde_json::json!({"id": "product-1"})).unwrap();
        assert_eq!(item.quantity, 1);
    }
}
