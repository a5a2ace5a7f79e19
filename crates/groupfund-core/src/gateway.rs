use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::FundResult;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Outbound text messaging to a member's contact handle.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// `false` when credentials are missing and sends would always fail.
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, handle: &str, text: &str) -> FundResult<()>;

    /// Sends one message per handle, sleeping `pacing` after every attempt.
    async fn broadcast(&self, handles: &[String], text: &str, pacing: Duration) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for handle in handles {
            match self.send(handle, text).await {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    warn!("broadcast to {handle} failed: {err}");
                    report.failed += 1;
                }
            }
            tokio::time::sleep(pacing).await;
        }
        report
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: Decimal,
    pub order_id: String,
    pub description: String,
    pub return_url: String,
    pub callback_url: String,
    pub extra_data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub pay_url: Option<String>,
    pub qr_code_url: Option<String>,
    pub deeplink: Option<String>,
    pub result_code: i64,
    pub message: String,
}

/// Payment result callback as delivered by the wallet provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub partner_code: String,
    pub access_key: String,
    pub request_id: String,
    pub amount: i64,
    pub order_id: String,
    pub order_info: String,
    pub order_type: String,
    #[serde(deserialize_with = "string_or_number")]
    pub trans_id: String,
    pub result_code: i64,
    pub message: String,
    pub pay_type: String,
    pub response_time: i64,
    pub extra_data: String,
    pub signature: String,
}

impl WebhookPayload {
    /// Alphabetically ordered `key=value` pairs covered by the signature.
    pub fn canonical_string(&self) -> String {
        format!(
            "accessKey={}&amount={}&extraData={}&message={}&orderId={}&orderInfo={}&orderType={}&partnerCode={}&payType={}&requestId={}&responseTime={}&resultCode={}&transId={}",
            self.access_key,
            self.amount,
            self.extra_data,
            self.message,
            self.order_id,
            self.order_info,
            self.order_type,
            self.partner_code,
            self.pay_type,
            self.request_id,
            self.response_time,
            self.result_code,
            self.trans_id,
        )
    }
}

#[async_trait]
pub trait PaymentIntentProvider: Send + Sync {
    async fn create_intent(&self, request: PaymentIntentRequest) -> FundResult<PaymentIntent>;
    fn verify_signature(&self, payload: &WebhookPayload) -> bool;
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(value) => value,
        Raw::Number(value) => value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::FundError;

    struct FlakyGateway {
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationGateway for FlakyGateway {
        async fn send(&self, handle: &str, _text: &str) -> FundResult<()> {
            self.attempts.lock().unwrap().push(handle.to_string());
            if handle.starts_with("bad") {
                return Err(FundError::upstream("rejected"));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_counts_and_paces_every_attempt() {
        let gateway = FlakyGateway {
            attempts: Mutex::new(Vec::new()),
        };
        let handles = vec!["a".to_string(), "bad-b".to_string(), "c".to_string()];

        let started = tokio::time::Instant::now();
        let report = gateway
            .broadcast(&handles, "hello", Duration::from_secs(1))
            .await;

        assert_eq!(report, BroadcastReport { sent: 2, failed: 1 });
        assert_eq!(gateway.attempts.lock().unwrap().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn webhook_payload_accepts_numeric_trans_id() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "partnerCode": "MOMO",
            "accessKey": "F8BBA842ECF85",
            "requestId": "1700000000000",
            "amount": 50000,
            "orderId": "CONTRIB_x_1",
            "orderInfo": "week 5",
            "orderType": "momo_wallet",
            "transId": 4088878653u64,
            "resultCode": 0,
            "message": "Successful.",
            "payType": "qr",
            "responseTime": 1700000000123u64,
            "extraData": "",
            "signature": "abc"
        }))
        .unwrap();

        assert_eq!(payload.trans_id, "4088878653");
        assert_eq!(
            payload.canonical_string(),
            "accessKey=F8BBA842ECF85&amount=50000&extraData=&message=Successful.&orderId=CONTRIB_x_1&orderInfo=week 5&orderType=momo_wallet&partnerCode=MOMO&payType=qr&requestId=1700000000000&responseTime=1700000000123&resultCode=0&transId=4088878653"
        );
    }
}
