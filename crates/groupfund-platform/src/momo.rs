use async_trait::async_trait;
use chrono::Utc;
use groupfund_core::{
    FundError, FundResult, PaymentIntent, PaymentIntentProvider, PaymentIntentRequest,
    WebhookPayload,
};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::MomoConfig;
use crate::signing;

const REQUEST_TYPE: &str = "captureWallet";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentBody<'a> {
    partner_code: &'a str,
    access_key: &'a str,
    request_id: String,
    amount: i64,
    order_id: &'a str,
    order_info: &'a str,
    redirect_url: &'a str,
    ipn_url: &'a str,
    extra_data: &'a str,
    request_type: &'a str,
    signature: String,
    lang: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentResponse {
    result_code: i64,
    #[serde(default)]
    message: String,
    pay_url: Option<String>,
    deeplink: Option<String>,
    qr_code_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    partner_code: &'a str,
    access_key: &'a str,
    request_id: &'a str,
    order_id: &'a str,
    signature: String,
    lang: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub order_id: String,
    pub request_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub trans_id: Option<serde_json::Value>,
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        self.result_code == 0
    }
}

/// Momo wallet gateway: signed `create` and `query` calls plus webhook
/// signature checks.
#[derive(Clone)]
pub struct MomoClient {
    config: MomoConfig,
    http: reqwest::Client,
}

impl MomoClient {
    pub fn new(config: MomoConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.partner_code.is_empty()
            && !self.config.access_key.is_empty()
            && !self.config.secret_key.is_empty()
    }

    fn sign(&self, raw: &str) -> String {
        signing::sign(&self.config.secret_key, raw.as_bytes())
    }

    pub fn create_signature_string(
        &self,
        request: &PaymentIntentRequest,
        amount: i64,
        request_id: &str,
    ) -> String {
        format!(
            "accessKey={}&amount={amount}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={request_id}&requestType={REQUEST_TYPE}",
            self.config.access_key,
            request.extra_data,
            request.callback_url,
            request.order_id,
            request.description,
            self.config.partner_code,
            request.return_url,
        )
    }

    /// Checks `x-momo-signature` on a raw memo-transfer notification body.
    pub fn verify_body_signature(&self, body: &[u8], signature: &str) -> bool {
        if self.config.webhook_secret.is_empty() {
            warn!("MOMO_WEBHOOK_SECRET is not set; rejecting transfer notification");
            return false;
        }
        signing::verify(&self.config.webhook_secret, body, signature)
    }

    pub fn query_signature_string(&self, order_id: &str, request_id: &str) -> String {
        format!(
            "accessKey={}&orderId={order_id}&partnerCode={}&requestId={request_id}",
            self.config.access_key, self.config.partner_code,
        )
    }

    pub async fn query_status(&self, order_id: &str, request_id: &str) -> FundResult<PaymentStatus> {
        if !self.is_configured() {
            return Err(FundError::upstream("momo credentials are not configured"));
        }

        let raw = self.query_signature_string(order_id, request_id);
        let body = QueryBody {
            partner_code: &self.config.partner_code,
            access_key: &self.config.access_key,
            request_id,
            order_id,
            signature: self.sign(&raw),
            lang: "vi",
        };

        let response = self
            .http
            .post(format!("{}/query", self.config.environment.endpoint()))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!("momo query for {order_id} failed: {err}");
                FundError::upstream(format!("payment status query failed: {err}"))
            })?;

        response
            .json::<PaymentStatus>()
            .await
            .map_err(|err| FundError::upstream(format!("unreadable payment status: {err}")))
    }
}

#[async_trait]
impl PaymentIntentProvider for MomoClient {
    async fn create_intent(&self, request: PaymentIntentRequest) -> FundResult<PaymentIntent> {
        if !self.is_configured() {
            return Err(FundError::upstream("payment provider is not configured"));
        }
        let amount = request
            .amount
            .round()
            .to_i64()
            .ok_or_else(|| FundError::validation(format!("amount {} is out of range", request.amount)))?;

        let request_id = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&self.create_signature_string(&request, amount, &request_id));
        let body = CreatePaymentBody {
            partner_code: &self.config.partner_code,
            access_key: &self.config.access_key,
            request_id,
            amount,
            order_id: &request.order_id,
            order_info: &request.description,
            redirect_url: &request.return_url,
            ipn_url: &request.callback_url,
            extra_data: &request.extra_data,
            request_type: REQUEST_TYPE,
            signature,
            lang: "vi",
        };

        let response = self
            .http
            .post(format!("{}/create", self.config.environment.endpoint()))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!("momo create for {} failed: {err}", request.order_id);
                FundError::upstream(format!("payment creation failed: {err}"))
            })?;
        let created: CreatePaymentResponse = response
            .json()
            .await
            .map_err(|err| FundError::upstream(format!("unreadable payment response: {err}")))?;

        Ok(PaymentIntent {
            pay_url: created.pay_url,
            qr_code_url: created.qr_code_url,
            deeplink: created.deeplink,
            result_code: created.result_code,
            message: created.message,
        })
    }

    fn verify_signature(&self, payload: &WebhookPayload) -> bool {
        if self.config.secret_key.is_empty() {
            return false;
        }
        signing::verify(
            &self.config.secret_key,
            payload.canonical_string().as_bytes(),
            &payload.signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::config::MomoEnvironment;

    fn client() -> MomoClient {
        MomoClient::new(MomoConfig {
            partner_code: "MOMOBKUN20180529".into(),
            access_key: "klm05TvNBzhg7h7j".into(),
            secret_key: "at67qH6mk8w5Y1nAyMoYKMWACiEi2bsa".into(),
            environment: MomoEnvironment::Sandbox,
            webhook_secret: "hook-secret".into(),
        })
    }

    fn payload() -> WebhookPayload {
        WebhookPayload {
            partner_code: "MOMOBKUN20180529".into(),
            access_key: "klm05TvNBzhg7h7j".into(),
            request_id: "1705708800000".into(),
            amount: 50_000,
            order_id: "CONTRIB_1_1705708800000".into(),
            order_info: "Dong quy tuan 5".into(),
            order_type: "momo_wallet".into(),
            trans_id: "4088878653".into(),
            result_code: 0,
            message: "Successful.".into(),
            pay_type: "qr".into(),
            response_time: 1_705_708_800_123,
            extra_data: String::new(),
            signature: String::new(),
        }
    }

    #[test]
    fn webhook_signature_round_trips_through_canonical_string() {
        let client = client();
        let mut payload = payload();
        payload.signature = signing::sign(
            "at67qH6mk8w5Y1nAyMoYKMWACiEi2bsa",
            payload.canonical_string().as_bytes(),
        );
        assert!(client.verify_signature(&payload));

        payload.amount = 5_000;
        assert!(!client.verify_signature(&payload));
    }

    #[test]
    fn create_signature_covers_fields_in_order() {
        let request = PaymentIntentRequest {
            amount: Decimal::new(50_000, 0),
            order_id: "CONTRIB_1".into(),
            description: "Dong quy".into(),
            return_url: "http://localhost:3000/payment/success?orderId=CONTRIB_1".into(),
            callback_url: "http://localhost:3000/api/momo/webhook".into(),
            extra_data: "{}".into(),
        };
        assert_eq!(
            client().create_signature_string(&request, 50_000, "42"),
            "accessKey=klm05TvNBzhg7h7j&amount=50000&extraData={}&ipnUrl=http://localhost:3000/api/momo/webhook&orderId=CONTRIB_1&orderInfo=Dong quy&partnerCode=MOMOBKUN20180529&redirectUrl=http://localhost:3000/payment/success?orderId=CONTRIB_1&requestId=42&requestType=captureWallet"
        );
    }

    #[test]
    fn query_signature_uses_the_short_field_set() {
        assert_eq!(
            client().query_signature_string("CONTRIB_1", "CONTRIB_1"),
            "accessKey=klm05TvNBzhg7h7j&orderId=CONTRIB_1&partnerCode=MOMOBKUN20180529&requestId=CONTRIB_1"
        );
    }

    #[tokio::test]
    async fn query_without_credentials_is_upstream_failure() {
        let unconfigured = MomoClient::new(MomoConfig {
            secret_key: String::new(),
            ..client().config
        });
        let err = unconfigured.query_status("CONTRIB_1", "CONTRIB_1").await.unwrap_err();
        assert!(matches!(err, FundError::Upstream(_)));
    }

    #[test]
    fn body_signature_needs_the_webhook_secret() {
        let body = br#"{"transactionId":"1"}"#;
        let signature = signing::sign("hook-secret", body);
        assert!(client().verify_body_signature(body, &signature));

        let unkeyed = MomoClient::new(MomoConfig {
            webhook_secret: String::new(),
            ..client().config
        });
        assert!(!unkeyed.verify_body_signature(body, &signature));
    }
}
