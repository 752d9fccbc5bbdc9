use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::RequireDriver;
use crate::engine::qr::parse_scan_payload;
use crate::engine::trip::{self, TripProgress, TripSnapshot, TripStatusView};
use crate::error::{AppError, TripError};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trip/start", post(start_trip))
        .route("/trip/status", get(trip_status))
        .route("/trip/scan", post(scan_ticket))
        .route("/trip/complete", post(complete_trip))
        .route("/trip/history", get(trip_history))
}

#[derive(Serialize)]
pub struct StartTripResponse {
    pub trip_id: Uuid,
    pub trip_number: u32,
    pub car_capacity: u32,
    pub required_passengers: u32,
}

#[derive(Deserialize)]
pub struct ScanRequest {
    pub ticket_number: Option<String>,
    pub qr_payload: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub date: Option<NaiveDate>,
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    RequireDriver(driver): RequireDriver,
) -> Result<Json<StartTripResponse>, AppError> {
    let trip = trip::start_trip(&state, driver.user_id, Utc::now()).await?;

    Ok(Json(StartTripResponse {
        trip_id: trip.id,
        trip_number: trip.trip_number,
        car_capacity: trip.car_capacity,
        required_passengers: trip.required_passengers,
    }))
}

async fn trip_status(
    State(state): State<Arc<AppState>>,
    RequireDriver(driver): RequireDriver,
) -> Json<TripStatusView> {
    Json(trip::trip_status(&state, driver.user_id, Utc::now()))
}

async fn scan_ticket(
    State(state): State<Arc<AppState>>,
    RequireDriver(driver): RequireDriver,
    Json(payload): Json<ScanRequest>,
) -> Result<Json<TripProgress>, AppError> {
    let ticket_number = match (payload.ticket_number, payload.qr_payload) {
        (Some(number), _) if !number.trim().is_empty() => number.trim().to_string(),
        (_, Some(qr)) => parse_scan_payload(&qr)?,
        _ => return Err(TripError::InvalidScanPayload.into()),
    };

    let progress = trip::scan_ticket(&state, driver.user_id, &ticket_number, Utc::now()).await?;
    Ok(Json(progress))
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    RequireDriver(driver): RequireDriver,
) -> Result<Json<TripProgress>, AppError> {
    let progress = trip::complete_trip(&state, driver.user_id, Utc::now()).await?;
    Ok(Json(progress))
}

async fn trip_history(
    State(state): State<Arc<AppState>>,
    RequireDriver(driver): RequireDriver,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<TripSnapshot>> {
    let date = query
        .date
        .unwrap_or_else(|| state.service_date(Utc::now()));
    Json(trip::trip_history(&state, driver.user_id, date))
}
