use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;

use crate::auth::RequireDriver;
use crate::engine::revenue::{revenue_summary, RevenueSummary};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/revenue", get(driver_revenue))
}

async fn driver_revenue(
    State(state): State<Arc<AppState>>,
    RequireDriver(driver): RequireDriver,
) -> Result<Json<RevenueSummary>, AppError> {
    let summary = revenue_summary(&state, driver.user_id, Utc::now())?;
    Ok(Json(summary))
}
