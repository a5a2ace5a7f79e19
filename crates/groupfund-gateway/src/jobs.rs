use axum::{Json, extract::State, http::HeaderMap};
use chrono::Utc;
use groupfund_ledger::{GenerationReport, ReminderReport, SweepReport};
use groupfund_platform::{Ack, GenerateRequest, WeekRequest};
use tracing::info;

use crate::{ApiError, AppState, fund_error, require_cron};

pub(crate) async fn create_weekly_contributions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<Ack<GenerationReport>>, ApiError> {
    require_cron(&state, &headers)?;
    let report = state
        .ledger
        .generate_obligations(payload.into())
        .await
        .map_err(fund_error)?;

    let message = if report.created == 0 {
        format!("contributions for week {} already exist", report.week)
    } else {
        format!(
            "created {} contributions for week {}",
            report.created, report.week
        )
    };
    Ok(Json(Ack::new(message, report)))
}

pub(crate) async fn check_overdue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Ack<SweepReport>>, ApiError> {
    require_cron(&state, &headers)?;
    let report = state
        .ledger
        .run_penalty_sweep(Utc::now())
        .await
        .map_err(fund_error)?;
    info!(
        "overdue sweep: {} processed, {} unchanged, {} failed",
        report.processed, report.unchanged, report.failed
    );

    Ok(Json(Ack::new(
        format!(
            "processed {} overdue contributions, sent {} notifications",
            report.processed, report.notifications_sent
        ),
        report,
    )))
}

pub(crate) async fn weekly_reminder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WeekRequest>,
) -> Result<Json<Ack<ReminderReport>>, ApiError> {
    require_cron(&state, &headers)?;
    let report = state
        .ledger
        .send_reminders(payload.week)
        .await
        .map_err(fund_error)?;

    Ok(Json(Ack::new(
        format!(
            "sent reminders to {}/{} members for week {}",
            report.notifications_sent, report.processed, report.week
        ),
        report,
    )))
}
