use chrono::{DateTime, NaiveDate, Utc};
use groupfund_core::{FundError, FundResult};
use groupfund_ledger::{
    GenerateObligations, IntentReceipt, IntentRequest, ManualConfirmation, TransferNotice,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTransactionRequest {
    pub user_id: Uuid,
    pub week: i32,
    pub amount: Decimal,
    pub transaction_id: String,
    #[serde(default)]
    pub transaction_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
}

impl From<AddTransactionRequest> for ManualConfirmation {
    fn from(request: AddTransactionRequest) -> Self {
        Self {
            member_id: request.user_id,
            week: request.week,
            amount: request.amount,
            transaction_id: request.transaction_id,
            transaction_time: request.transaction_time,
            note: request.note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub contribution_id: Uuid,
    pub user_id: Uuid,
    /// Informational; the contribution's own amount is always charged.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub order_info: Option<String>,
}

impl From<CreatePaymentRequest> for IntentRequest {
    fn from(request: CreatePaymentRequest) -> Self {
        Self {
            contribution_id: request.contribution_id,
            user_id: request.user_id,
            order_info: request.order_info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub success: bool,
    pub order_id: String,
    pub payment_url: Option<String>,
    pub qr_code_url: Option<String>,
    pub deeplink: Option<String>,
}

impl From<IntentReceipt> for CreatePaymentResponse {
    fn from(receipt: IntentReceipt) -> Self {
        Self {
            success: true,
            order_id: receipt.order_id,
            payment_url: receipt.payment_url,
            qr_code_url: receipt.qr_code_url,
            deeplink: receipt.deeplink,
        }
    }
}

/// Wallet transfer notification for the memo-parsed entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferNotification {
    pub transaction_id: Value,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    /// Epoch millis or RFC 3339.
    #[serde(default)]
    pub timestamp: Option<Value>,
    pub phone_number: String,
    #[serde(default)]
    pub partner_code: Option<String>,
}

impl TransferNotification {
    pub fn into_notice(self) -> FundResult<TransferNotice> {
        let transaction_id = match self.transaction_id {
            Value::String(id) => id,
            Value::Number(id) => id.to_string(),
            other => {
                return Err(FundError::validation(format!(
                    "transactionId must be a string or number, got {other}"
                )));
            }
        };
        let timestamp = match self.timestamp {
            None | Some(Value::Null) => None,
            Some(Value::Number(millis)) => millis
                .as_i64()
                .and_then(DateTime::from_timestamp_millis),
            Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
            Some(_) => None,
        };

        Ok(TransferNotice {
            transaction_id,
            description: self.description.unwrap_or_default(),
            phone_number: self.phone_number,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub week: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

impl From<GenerateRequest> for GenerateObligations {
    fn from(request: GenerateRequest) -> Self {
        Self {
            week: request.week,
            amount: request.amount,
            due_date: request.due_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekRequest {
    pub week: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub week: Option<i32>,
    #[serde(default)]
    pub custom_message: Option<String>,
}

/// Either free text to a raw handle or member, or a templated notice
/// (`reminder`/`overdue`) for the member's week.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub week: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionQuery {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub week: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContributionRequest {
    pub user_id: Uuid,
    pub week: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaSubscription {
    #[serde(rename = "hub.mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: Option<String>,
}

/// Envelope for every mutating endpoint: `{success, message, ...fields}`.
#[derive(Debug, Clone, Serialize)]
pub struct Ack<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub details: T,
}

impl<T: Serialize> Ack<T> {
    pub fn new(message: impl Into<String>, details: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn transfer_accepts_numeric_ids_and_millis() {
        let notification: TransferNotification = serde_json::from_value(json!({
            "transactionId": 9876543210u64,
            "amount": 50000,
            "description": "QUY_NHOM_TUAN_5_50000",
            "timestamp": 1705708800000u64,
            "phoneNumber": "0901234567",
            "partnerCode": "MOMO"
        }))
        .unwrap();

        let notice = notification.into_notice().unwrap();
        assert_eq!(notice.transaction_id, "9876543210");
        assert_eq!(
            notice.timestamp.unwrap().to_rfc3339(),
            "2024-01-20T00:00:00+00:00"
        );
    }

    #[test]
    fn transfer_timestamp_may_be_text_or_missing() {
        let notice = TransferNotification {
            transaction_id: json!("T1"),
            amount: None,
            description: None,
            timestamp: Some(json!("2024-01-20T07:30:00+07:00")),
            phone_number: "0901".into(),
            partner_code: None,
        }
        .into_notice()
        .unwrap();
        assert_eq!(notice.timestamp.unwrap().to_rfc3339(), "2024-01-20T00:30:00+00:00");
        assert_eq!(notice.description, "");

        let err = TransferNotification {
            transaction_id: json!(["T1"]),
            amount: None,
            description: None,
            timestamp: None,
            phone_number: "0901".into(),
            partner_code: None,
        }
        .into_notice()
        .unwrap_err();
        assert!(matches!(err, FundError::Validation { .. }));
    }

    #[test]
    fn ack_flattens_details() {
        let body = serde_json::to_value(Ack::new("done", json!({ "created": 3 }))).unwrap();
        assert_eq!(body, json!({ "success": true, "message": "done", "created": 3 }));
    }
}
