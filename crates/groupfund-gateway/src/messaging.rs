use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use groupfund_core::{BroadcastReport, FundError};
use groupfund_ledger::{BroadcastKind, MemberNotice};
use groupfund_platform::{
    Ack, BroadcastRequest, MetaSubscription, SendMessageRequest, verify_meta_subscription,
};
use serde_json::{Value, json};
use tracing::info;

use crate::{ApiError, AppState, fund_error, require_admin};

pub(crate) async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Ack<Value>>, ApiError> {
    require_admin(&state, &headers)?;
    let ledger = &state.ledger;

    if let (Some(kind), Some(member_id)) = (payload.message_type.as_deref(), payload.user_id) {
        let notice = MemberNotice::parse(kind).map_err(fund_error)?;
        let week = payload
            .week
            .ok_or_else(|| fund_error(FundError::validation("week is required")))?;
        ledger
            .send_member_notice(member_id, week, notice)
            .await
            .map_err(fund_error)?;
        return Ok(Json(Ack::new("message sent", json!({ "userId": member_id }))));
    }

    let recipient = match (payload.user_id, payload.recipient) {
        (Some(member_id), _) => {
            ledger
                .store()
                .get_member(member_id)
                .await
                .map_err(fund_error)?
                .phone
        }
        (None, Some(recipient)) => recipient,
        (None, None) => {
            return Err(fund_error(FundError::validation(
                "userId or recipient is required",
            )));
        }
    };
    let text = payload.message.unwrap_or_default();
    ledger
        .send_message(&recipient, &text)
        .await
        .map_err(fund_error)?;

    Ok(Json(Ack::new("message sent", json!({ "recipient": recipient }))))
}

pub(crate) async fn broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Json<Ack<BroadcastReport>>, ApiError> {
    require_admin(&state, &headers)?;
    let kind = BroadcastKind::from_request(
        payload.message_type.as_deref(),
        payload.week,
        payload.custom_message,
    )
    .map_err(fund_error)?;

    let report = state
        .ledger
        .broadcast(kind, Utc::now())
        .await
        .map_err(fund_error)?;
    Ok(Json(Ack::new(
        format!(
            "sent to {}/{} members",
            report.sent,
            report.sent + report.failed
        ),
        report,
    )))
}

/// Messenger subscription handshake: echoes `hub.challenge`.
pub(crate) async fn verify_meta(
    State(state): State<AppState>,
    Query(query): Query<MetaSubscription>,
) -> Result<String, ApiError> {
    let (Some(mode), Some(token), Some(challenge)) =
        (query.mode, query.verify_token, query.challenge)
    else {
        return Err((StatusCode::FORBIDDEN, "forbidden".to_string()));
    };

    verify_meta_subscription(&state.meta, &mode, &token, &challenge)
        .map(str::to_string)
        .ok_or_else(|| (StatusCode::FORBIDDEN, "forbidden".to_string()))
}

pub(crate) async fn meta_event(Json(event): Json<Value>) -> Json<Value> {
    if event.get("object").and_then(Value::as_str) == Some("page") {
        let entries = event
            .get("entry")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        info!("meta webhook delivered {entries} page entries");
    }
    Json(json!({ "success": true }))
}
