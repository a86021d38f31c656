pub mod money;
pub mod pii;

pub use money::{CurrencyCode, Money, MoneyError};
pub use pii::Masked;
