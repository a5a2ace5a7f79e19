mod admin;
mod jobs;
mod messaging;
mod payments;

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{delete, get, patch, post, put},
};
use chrono::Utc;
use groupfund_core::FundError;
use groupfund_ledger::Ledger;
use groupfund_platform::{AdminAuth, MetaConfig, MomoClient, bearer_token};
use tracing::{error, warn};

pub type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub auth: AdminAuth,
    /// Verifies memo-transfer notification bodies.
    pub momo: MomoClient,
    pub meta: MetaConfig,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(admin::login))
        .route(
            "/api/members",
            get(admin::list_members).post(admin::create_member),
        )
        .route(
            "/api/members/{id}",
            patch(admin::update_member).delete(admin::delete_member),
        )
        .route(
            "/api/contributions",
            get(admin::list_contributions).post(admin::create_contribution),
        )
        .route("/api/contributions/{id}", delete(admin::delete_contribution))
        .route(
            "/api/contributions/{id}/transactions",
            get(admin::list_transactions),
        )
        .route(
            "/api/schedules",
            get(admin::list_schedules).post(admin::create_schedule),
        )
        .route(
            "/api/schedules/{id}",
            put(admin::update_schedule).delete(admin::delete_schedule),
        )
        .route("/api/stats", get(admin::stats))
        .route("/api/export/csv", get(admin::export_csv))
        .route("/api/momo/create-payment", post(payments::create_payment))
        .route("/api/momo/webhook", post(payments::webhook))
        .route("/api/momo/webhook-auto", post(payments::webhook_auto))
        .route("/api/momo/add-transaction", post(payments::add_transaction))
        .route(
            "/api/momo/check-transactions",
            post(payments::check_transactions),
        )
        .route(
            "/api/cron/create-weekly-contributions",
            post(jobs::create_weekly_contributions),
        )
        .route("/api/cron/check-overdue", post(jobs::check_overdue))
        .route("/api/cron/weekly-reminder", post(jobs::weekly_reminder))
        .route("/api/notify/send", post(messaging::send))
        .route("/api/notify/broadcast", post(messaging::broadcast))
        .route(
            "/api/meta/webhook",
            get(messaging::verify_meta).post(messaging::meta_event),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = bearer_token(authorization(headers)).map_err(fund_error)?;
    state
        .auth
        .verify_session(token, Utc::now())
        .map_err(fund_error)
}

fn require_cron(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let secret = bearer_token(authorization(headers)).map_err(fund_error)?;
    state.auth.verify_cron(secret).map_err(fund_error)
}

fn fund_error(err: FundError) -> ApiError {
    let status = match &err {
        FundError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        FundError::NotFound { .. } => StatusCode::NOT_FOUND,
        FundError::AlreadySettled { .. } | FundError::DuplicateTransaction { .. } => {
            StatusCode::CONFLICT
        }
        FundError::AmountMismatch { .. } | FundError::Validation { .. } => {
            StatusCode::BAD_REQUEST
        }
        FundError::Upstream(_) => StatusCode::BAD_GATEWAY,
    };

    if status.is_server_error() {
        error!("request failed: {err}");
    } else {
        warn!("request rejected: {err}");
    }
    (status, err.to_string())
}

fn invalid_request(err: anyhow::Error) -> ApiError {
    (StatusCode::BAD_REQUEST, err.to_string())
}
