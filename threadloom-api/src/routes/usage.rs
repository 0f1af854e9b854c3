//! Usage and entitlement status for the calling identity.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use threadloom_core::Identity;
use threadloom_governance::UsageReport;

use crate::identity::CallerIdentity;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub identity: Identity,
    pub daily_remaining: u64,
    pub monthly_remaining: u64,
    pub premium: bool,
    #[serde(flatten)]
    pub report: UsageReport,
}

/// GET /api/v1/usage - counts and premium status, without charging.
pub async fn get_usage(
    State(state): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
) -> Json<UsageResponse> {
    let report = state.facade.usage(&identity).await;

    Json(UsageResponse {
        identity,
        daily_remaining: report.usage.remaining_daily(),
        monthly_remaining: report.usage.remaining_monthly(),
        premium: report.entitlement.active,
        report,
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/usage", get(get_usage))
}
