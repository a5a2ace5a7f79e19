use std::time::Duration;

use rust_decimal::Decimal;

use crate::memo::MemoFormat;
use crate::penalty::PenaltyPolicy;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub penalty: PenaltyPolicy,
    /// Largest accepted gap between the claimed and the due amount.
    pub amount_tolerance: Decimal,
    /// Delay after every outbound notification in a batch.
    pub notification_pacing: Duration,
    pub memo: MemoFormat,
    /// Base for payment return and callback URLs.
    pub public_base_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            penalty: PenaltyPolicy::default(),
            amount_tolerance: Decimal::new(1_000, 0),
            notification_pacing: Duration::from_millis(1_000),
            memo: MemoFormat::default(),
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn callback_url(&self) -> String {
        format!("{}/api/momo/webhook", self.base_url())
    }

    pub fn return_url(&self, order_id: &str) -> String {
        format!("{}/payment/success?orderId={order_id}", self.base_url())
    }

    fn base_url(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }
}
