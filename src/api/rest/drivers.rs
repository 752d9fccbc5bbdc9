use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{RequireAdmin, RequireDriver, RequireStaff};
use crate::error::AppError;
use crate::models::driver::{Driver, DutyStatus, Vehicle};
use crate::state::AppState;

const MAX_VEHICLE_CAPACITY: u32 = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", post(create_vehicle).get(list_vehicles))
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/vehicle", patch(update_driver_vehicle))
        .route("/drivers/me/check-in", post(check_in))
        .route("/drivers/me/check-out", post(check_out))
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub plate: String,
    pub capacity: u32,
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    /// The driver's id at the session provider.
    pub id: Uuid,
    pub name: String,
    pub vehicle_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateVehicleRequest {
    pub vehicle_id: Option<Uuid>,
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(payload): Json<CreateVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    if payload.plate.trim().is_empty() {
        return Err(AppError::BadRequest("plate cannot be empty".to_string()));
    }

    if payload.capacity == 0 || payload.capacity > MAX_VEHICLE_CAPACITY {
        return Err(AppError::BadRequest(format!(
            "capacity must be between 1 and {MAX_VEHICLE_CAPACITY}"
        )));
    }

    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        plate: payload.plate.trim().to_string(),
        capacity: payload.capacity,
        created_at: Utc::now(),
    };

    state.vehicles.insert(vehicle.id, vehicle.clone());
    Ok(Json(vehicle))
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    RequireStaff(_staff): RequireStaff,
) -> Json<Vec<Vehicle>> {
    let vehicles = state
        .vehicles
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(vehicles)
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if let Some(vehicle_id) = payload.vehicle_id {
        ensure_vehicle_exists(&state, vehicle_id)?;
    }

    if state.drivers.contains_key(&payload.id) {
        return Err(AppError::Conflict(format!(
            "driver {} already registered",
            payload.id
        )));
    }

    let driver = Driver {
        id: payload.id,
        name: payload.name.trim().to_string(),
        vehicle_id: payload.vehicle_id,
        duty_status: DutyStatus::OffDuty,
        checked_in_at: None,
        checked_out_at: None,
        updated_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    RequireStaff(_staff): RequireStaff,
) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn update_driver_vehicle(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVehicleRequest>,
) -> Result<Json<Driver>, AppError> {
    if let Some(vehicle_id) = payload.vehicle_id {
        ensure_vehicle_exists(&state, vehicle_id)?;
    }

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    driver.vehicle_id = payload.vehicle_id;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn check_in(
    State(state): State<Arc<AppState>>,
    RequireDriver(principal): RequireDriver,
) -> Result<Json<Driver>, AppError> {
    set_duty(&state, principal.user_id, DutyStatus::OnDuty)
}

async fn check_out(
    State(state): State<Arc<AppState>>,
    RequireDriver(principal): RequireDriver,
) -> Result<Json<Driver>, AppError> {
    set_duty(&state, principal.user_id, DutyStatus::OffDuty)
}

fn set_duty(state: &AppState, driver_id: Uuid, status: DutyStatus) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not registered")))?;

    if driver.duty_status == status {
        return Err(AppError::Conflict(match status {
            DutyStatus::OnDuty => "already checked in".to_string(),
            DutyStatus::OffDuty => "already checked out".to_string(),
        }));
    }

    let now = Utc::now();
    match status {
        DutyStatus::OnDuty => driver.checked_in_at = Some(now),
        DutyStatus::OffDuty => driver.checked_out_at = Some(now),
    }
    driver.duty_status = status;
    driver.updated_at = now;

    info!(driver_id = %driver_id, status = ?status, "driver duty status changed");
    Ok(Json(driver.clone()))
}

fn ensure_vehicle_exists(state: &AppState, vehicle_id: Uuid) -> Result<(), AppError> {
    if state.vehicles.contains_key(&vehicle_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("vehicle {vehicle_id} not found")))
    }
}
