//! Click payment-link generation.
//!
//! The pay URL is assembled by plain string concatenation, not a URL builder:
//! the gateway rejects a percent-encoded `return_url`, so the parameters are
//! spliced in exactly as configured.

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::config::ClickConfig;

pub const CLICK_PAY_BASE_URL: &str = "https://my.click.uz/services/pay";

#[derive(Debug, Clone)]
pub struct PaymentLink {
    pub url: String,
    pub transaction_param: String,
}

/// Allocate a fresh merchant transaction param: a v4 UUID with the dashes
/// stripped, 128 bits of randomness.
pub fn generate_transaction_param() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Build the pay URL for an already-allocated transaction param.
pub fn build_payment_link(
    config: &ClickConfig,
    amount: &BigDecimal,
    transaction_param: &str,
) -> PaymentLink {
    let url = format!(
        "{}?service_id={}&merchant_id={}&amount={}&transaction_param={}&return_url={}",
        CLICK_PAY_BASE_URL,
        config.service_id,
        config.merchant_id,
        amount,
        transaction_param,
        config.return_url,
    );

    PaymentLink {
        url,
        transaction_param: transaction_param.to_string(),
    }
}
