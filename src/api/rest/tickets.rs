use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::RequireStaff;
use crate::engine::occupancy::day_window;
use crate::error::AppError;
use crate::models::ticket::{PaymentMethod, Ticket};
use crate::state::AppState;
use crate::store::TicketQuery;

/// Highest accepted fare, in minor currency units.
pub const MAX_TICKET_PRICE: u64 = 10_000_000;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets", post(sell_ticket).get(search_tickets))
        .route("/tickets/:number", get(get_ticket))
        .route("/tickets/:number/assign", post(assign_ticket))
}

#[derive(Deserialize)]
pub struct SellTicketRequest {
    pub price: u64,
    pub payment_method: PaymentMethod,
    pub passenger_count: Option<u32>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub number: Option<String>,
    pub date: Option<NaiveDate>,
    pub driver_id: Option<Uuid>,
    pub scanned: Option<bool>,
}

#[derive(Deserialize)]
pub struct AssignTicketRequest {
    pub driver_id: Uuid,
}

async fn sell_ticket(
    State(state): State<Arc<AppState>>,
    RequireStaff(seller): RequireStaff,
    Json(payload): Json<SellTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    if payload.price == 0 || payload.price > MAX_TICKET_PRICE {
        return Err(AppError::BadRequest(format!(
            "price must be between 1 and {MAX_TICKET_PRICE}"
        )));
    }

    if payload.passenger_count == Some(0) {
        return Err(AppError::BadRequest(
            "passenger_count must be >= 1".to_string(),
        ));
    }

    let now = Utc::now();
    let serial = state.tickets.next_serial()?;
    let ticket_number = format!(
        "T{}-{serial:05}",
        state.service_date(now).format("%Y%m%d")
    );

    let ticket = state.tickets.insert(Ticket::new(
        ticket_number,
        payload.price,
        payload.payment_method,
        payload.passenger_count,
        seller.user_id,
        now,
    ))?;

    info!(
        ticket_number = %ticket.ticket_number,
        price = ticket.price,
        sold_by = %seller.user_id,
        "ticket sold"
    );

    Ok(Json(ticket))
}

async fn search_tickets(
    State(state): State<Arc<AppState>>,
    RequireStaff(_staff): RequireStaff,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let (sold_from, sold_until) = match params.date {
        Some(date) => {
            let (from, until) = day_window(date, &state.service_offset);
            (Some(from), Some(until))
        }
        None => (None, None),
    };

    let query = TicketQuery {
        ticket_number: params.number,
        assigned_driver_id: params.driver_id,
        is_scanned: params.scanned,
        sold_from,
        sold_until,
    };

    Ok(Json(state.tickets.search(&query)?))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    RequireStaff(_staff): RequireStaff,
    Path(number): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state
        .tickets
        .find_by_number(&number)?
        .ok_or_else(|| AppError::NotFound(format!("ticket {number} not found")))?;

    Ok(Json(ticket))
}

async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    RequireStaff(dispatcher): RequireStaff,
    Path(number): Path<String>,
    Json(payload): Json<AssignTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    if !state.drivers.contains_key(&payload.driver_id) {
        return Err(AppError::NotFound(format!(
            "driver {} not found",
            payload.driver_id
        )));
    }

    let ticket = state
        .tickets
        .assign(&number, payload.driver_id, Utc::now())?;

    info!(
        ticket_number = %ticket.ticket_number,
        driver_id = %payload.driver_id,
        assigned_by = %dispatcher.user_id,
        "ticket assigned"
    );

    Ok(Json(ticket))
}
