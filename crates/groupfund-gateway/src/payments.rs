use anyhow::anyhow;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use groupfund_core::{FundError, WebhookPayload};
use groupfund_ledger::{RepairReport, SettlementOutcome};
use groupfund_platform::{
    Ack, AddTransactionRequest, CreatePaymentRequest, CreatePaymentResponse, TransferNotification,
};
use tracing::{info, warn};

use crate::{ApiError, AppState, fund_error, invalid_request, require_admin, require_cron};

const SIGNATURE_HEADER: &str = "x-momo-signature";

fn settlement_ack(outcome: SettlementOutcome) -> Json<Ack<SettlementOutcome>> {
    let declined = matches!(outcome, SettlementOutcome::Declined { .. });
    let mut ack = Ack::new(outcome.message(), outcome);
    ack.success = !declined;
    Json(ack)
}

pub(crate) async fn create_payment(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    let receipt = state
        .ledger
        .create_intent(payload.into())
        .await
        .map_err(fund_error)?;
    info!("payment intent {} opened", receipt.order_id);
    Ok(Json(receipt.into()))
}

/// Provider IPN callback; authenticated by the payload signature.
pub(crate) async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<Ack<SettlementOutcome>>, ApiError> {
    info!(
        "payment webhook for order {} (result {})",
        payload.order_id, payload.result_code
    );
    let outcome = state
        .ledger
        .confirm_webhook(&payload)
        .await
        .map_err(fund_error)?;
    Ok(settlement_ack(outcome))
}

/// Wallet transfer notification carrying a free-text memo. The raw body
/// is signed, so it is read as bytes before decoding.
pub(crate) async fn webhook_auto(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack<SettlementOutcome>>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !state.momo.verify_body_signature(&body, signature) {
        warn!("transfer notification rejected: bad signature");
        return Err(fund_error(FundError::unauthorized(
            "invalid transfer notification signature",
        )));
    }

    let notification: TransferNotification = serde_json::from_slice(&body)
        .map_err(|err| invalid_request(anyhow!("invalid transfer notification: {err}")))?;
    let notice = notification.into_notice().map_err(fund_error)?;
    let outcome = state
        .ledger
        .confirm_transfer(notice)
        .await
        .map_err(fund_error)?;
    Ok(settlement_ack(outcome))
}

pub(crate) async fn add_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AddTransactionRequest>,
) -> Result<Json<Ack<SettlementOutcome>>, ApiError> {
    require_admin(&state, &headers)?;
    let outcome = state
        .ledger
        .confirm_manual(payload.into())
        .await
        .map_err(fund_error)?;
    Ok(settlement_ack(outcome))
}

pub(crate) async fn check_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Ack<RepairReport>>, ApiError> {
    require_cron(&state, &headers)?;
    let report = state.ledger.repair_settled().await.map_err(fund_error)?;
    Ok(Json(Ack::new(
        format!("updated {}/{} contributions", report.updated, report.checked),
        report,
    )))
}
