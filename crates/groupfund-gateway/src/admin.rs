use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use groupfund_core::{
    CreateMember, Member, MemberStatus, NewObligation, Obligation, ObligationFilter,
    ObligationStatus, PaymentTransaction, Schedule, ScheduleInput, UpdateMember,
};
use groupfund_ledger::FundSummary;
use groupfund_platform::{
    Ack, ContributionQuery, CreateContributionRequest, LoginRequest, LoginResponse, MemberQuery,
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState, fund_error, require_admin};

pub(crate) async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state
        .auth
        .login(payload.code.trim(), Utc::now())
        .map_err(fund_error)?;
    info!("admin session issued until {}", session.expires_at);

    Ok(Json(LoginResponse {
        success: true,
        token: session.token,
        expires_at: session.expires_at,
    }))
}

pub(crate) async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MemberQuery>,
) -> Result<Json<Vec<Member>>, ApiError> {
    require_admin(&state, &headers)?;
    let status = query
        .status
        .as_deref()
        .map(MemberStatus::parse)
        .transpose()
        .map_err(fund_error)?;

    let members = state
        .ledger
        .store()
        .list_members(status)
        .await
        .map_err(fund_error)?;
    Ok(Json(members))
}

pub(crate) async fn create_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateMember>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    require_admin(&state, &headers)?;
    let member = state
        .ledger
        .store()
        .create_member(payload)
        .await
        .map_err(fund_error)?;
    info!("member {} created", member.id);
    Ok((StatusCode::CREATED, Json(member)))
}

/// A body without fields (`{}`) toggles the member between active and inactive.
pub(crate) async fn update_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMember>,
) -> Result<Json<Member>, ApiError> {
    require_admin(&state, &headers)?;
    let store = state.ledger.store();

    let update = if payload.name.is_none() && payload.phone.is_none() && payload.status.is_none()
    {
        let current = store.get_member(id).await.map_err(fund_error)?;
        UpdateMember {
            status: Some(current.status.toggled()),
            ..UpdateMember::default()
        }
    } else {
        payload
    };

    let member = store.update_member(id, update).await.map_err(fund_error)?;
    Ok(Json(member))
}

pub(crate) async fn delete_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Ack<Value>>, ApiError> {
    require_admin(&state, &headers)?;
    state
        .ledger
        .store()
        .delete_member(id)
        .await
        .map_err(fund_error)?;
    info!("member {id} deleted with its contributions");
    Ok(Json(Ack::new("member deleted", json!({ "id": id }))))
}

pub(crate) async fn list_contributions(
    State(state): State<AppState>,
    Query(query): Query<ContributionQuery>,
) -> Result<Json<Vec<Obligation>>, ApiError> {
    let mut filter = ObligationFilter {
        member_id: query.user_id,
        week: query.week,
        ..ObligationFilter::default()
    };
    if let Some(status) = query.status.as_deref() {
        filter = filter.with_statuses(&[ObligationStatus::parse(status).map_err(fund_error)?]);
    }

    let obligations = state
        .ledger
        .store()
        .list_obligations(&filter)
        .await
        .map_err(fund_error)?;
    Ok(Json(obligations))
}

pub(crate) async fn create_contribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateContributionRequest>,
) -> Result<(StatusCode, Json<Obligation>), ApiError> {
    require_admin(&state, &headers)?;
    let obligation = state
        .ledger
        .store()
        .insert_obligation(NewObligation {
            member_id: payload.user_id,
            week: payload.week,
            amount: payload.amount,
            due_date: payload.due_date,
        })
        .await
        .map_err(fund_error)?;
    Ok((StatusCode::CREATED, Json(obligation)))
}

pub(crate) async fn delete_contribution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Ack<Value>>, ApiError> {
    require_admin(&state, &headers)?;
    state
        .ledger
        .store()
        .delete_obligation(id)
        .await
        .map_err(fund_error)?;
    Ok(Json(Ack::new("contribution deleted", json!({ "id": id }))))
}

pub(crate) async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentTransaction>>, ApiError> {
    require_admin(&state, &headers)?;
    let transactions = state
        .ledger
        .store()
        .list_transactions(id)
        .await
        .map_err(fund_error)?;
    Ok(Json(transactions))
}

pub(crate) async fn list_schedules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Schedule>>, ApiError> {
    require_admin(&state, &headers)?;
    let schedules = state
        .ledger
        .store()
        .list_schedules()
        .await
        .map_err(fund_error)?;
    Ok(Json(schedules))
}

pub(crate) async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScheduleInput>,
) -> Result<(StatusCode, Json<Schedule>), ApiError> {
    require_admin(&state, &headers)?;
    let schedule = state
        .ledger
        .store()
        .create_schedule(payload)
        .await
        .map_err(fund_error)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub(crate) async fn update_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScheduleInput>,
) -> Result<Json<Schedule>, ApiError> {
    require_admin(&state, &headers)?;
    let schedule = state
        .ledger
        .store()
        .update_schedule(id, payload)
        .await
        .map_err(fund_error)?;
    Ok(Json(schedule))
}

pub(crate) async fn delete_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Ack<Value>>, ApiError> {
    require_admin(&state, &headers)?;
    state
        .ledger
        .store()
        .delete_schedule(id)
        .await
        .map_err(fund_error)?;
    Ok(Json(Ack::new("schedule deleted", json!({ "id": id }))))
}

pub(crate) async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FundSummary>, ApiError> {
    require_admin(&state, &headers)?;
    let summary = state.ledger.summary().await.map_err(fund_error)?;
    Ok(Json(summary))
}

pub(crate) async fn export_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;
    let csv = state.ledger.export_csv().await.map_err(fund_error)?;
    let filename = format!(
        "attachment; filename=\"quy-nhom-{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    ))
}
