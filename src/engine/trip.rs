use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::occupancy::{occupancy_percent, required_passengers};
use crate::engine::release::{release_after_completion, ReleaseReport};
use crate::engine::revenue::{qualification_for, Qualification};
use crate::error::{AppError, StoreError, TripError};
use crate::models::trip::{CompletionReason, Trip, TripEvent, TripStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct TripSnapshot {
    pub trip_id: Uuid,
    pub trip_number: u32,
    pub date: NaiveDate,
    pub status: TripStatus,
    pub car_capacity: u32,
    pub required_passengers: u32,
    pub current_passengers: u32,
    pub remaining_passengers: u32,
    pub occupancy_percent: u32,
    pub reached_80_percent: bool,
    pub completion_reason: Option<CompletionReason>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Trip> for TripSnapshot {
    fn from(trip: &Trip) -> Self {
        Self {
            trip_id: trip.id,
            trip_number: trip.trip_number,
            date: trip.date,
            status: trip.status,
            car_capacity: trip.car_capacity,
            required_passengers: trip.required_passengers,
            current_passengers: trip.current_passengers,
            remaining_passengers: trip
                .required_passengers
                .saturating_sub(trip.current_passengers),
            occupancy_percent: occupancy_percent(trip.current_passengers, trip.car_capacity),
            reached_80_percent: trip.reached_80_percent,
            completion_reason: trip.completion_reason,
            started_at: trip.started_at,
            completed_at: trip.completed_at,
        }
    }
}

/// Result of a scan or a manual close.
#[derive(Debug, Clone, Serialize)]
pub struct TripProgress {
    pub trip: TripSnapshot,
    pub ticket_number: Option<String>,
    pub passenger_order: Option<u32>,
    pub current_passengers: u32,
    pub required_passengers: u32,
    pub trip_completed: bool,
    pub is_80_percent_reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_reset: Option<ReleaseReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualification: Option<Qualification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripStatusView {
    pub current_trip: Option<TripSnapshot>,
    pub has_active_trip: bool,
    pub trips_today: usize,
    pub qualification: Qualification,
}

pub async fn start_trip(
    state: &AppState,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Trip, AppError> {
    let _guard = state.trips.lock_driver(driver_id).await;

    let vehicle_id = state
        .drivers
        .get(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not registered")))?
        .vehicle_id
        .ok_or(TripError::NoVehicleAssigned)?;
    let car_capacity = state
        .vehicles
        .get(&vehicle_id)
        .map(|vehicle| vehicle.capacity)
        .ok_or(TripError::NoVehicleAssigned)?;

    if state.trips.active_trip(driver_id).is_some() {
        debug!(driver_id = %driver_id, "start rejected: trip already active");
        return Err(TripError::TripAlreadyActive.into());
    }

    let date = state.service_date(now);
    let trip = Trip {
        id: Uuid::new_v4(),
        driver_id,
        vehicle_id,
        trip_number: state.trips.count_on(driver_id, date) as u32 + 1,
        date,
        car_capacity,
        required_passengers: required_passengers(car_capacity),
        current_passengers: 0,
        scans: Vec::new(),
        status: TripStatus::InProgress,
        completion_reason: None,
        reached_80_percent: false,
        started_at: now,
        completed_at: None,
    };

    let trip = state.trips.insert_active(trip)?;

    state.metrics.trips_started_total.inc();
    state.metrics.active_trips.inc();
    let _ = state.trip_events_tx.send(TripEvent::Started {
        trip_id: trip.id,
        driver_id,
        trip_number: trip.trip_number,
        required_passengers: trip.required_passengers,
    });

    info!(
        driver_id = %driver_id,
        trip_id = %trip.id,
        trip_number = trip.trip_number,
        car_capacity,
        required_passengers = trip.required_passengers,
        "trip started"
    );

    Ok(trip)
}

pub async fn scan_ticket(
    state: &AppState,
    driver_id: Uuid,
    ticket_number: &str,
    now: DateTime<Utc>,
) -> Result<TripProgress, AppError> {
    let start = Instant::now();
    let result = scan_ticket_inner(state, driver_id, ticket_number, now).await;

    let outcome = match &result {
        Ok(progress) if progress.trip_completed => "completed_trip",
        Ok(_) => "accepted",
        Err(AppError::Precondition(err)) => err.code(),
        Err(_) => "error",
    };
    state
        .metrics
        .ticket_scans_total
        .with_label_values(&[outcome])
        .inc();
    state
        .metrics
        .scan_latency_seconds
        .observe(start.elapsed().as_secs_f64());

    result
}

async fn scan_ticket_inner(
    state: &AppState,
    driver_id: Uuid,
    ticket_number: &str,
    now: DateTime<Utc>,
) -> Result<TripProgress, AppError> {
    let _guard = state.trips.lock_driver(driver_id).await;

    let trip = state
        .trips
        .active_trip(driver_id)
        .ok_or(TripError::NoActiveTrip)?;

    let ticket = state
        .tickets
        .find_by_number(ticket_number)?
        .ok_or_else(|| TripError::TicketNotFound(ticket_number.to_string()))?;

    if ticket.is_scanned || !state.trips.claim_ticket(ticket.id, trip.id) {
        debug!(driver_id = %driver_id, ticket_number, "scan rejected: already scanned");
        return Err(TripError::TicketAlreadyScanned(ticket_number.to_string()).into());
    }

    if let Err(err) = state.tickets.mark_scanned(ticket.id, driver_id, now) {
        state.trips.unclaim_ticket(ticket.id, trip.id);
        return Err(match err {
            StoreError::Conflict(_) => scan_conflict(state, ticket.id, ticket_number)?.into(),
            other => other.into(),
        });
    }

    let updated = state
        .trips
        .record_scan(trip.id, ticket.id, &ticket.ticket_number, now)?;
    let passenger_order = updated.current_passengers;

    let _ = state.trip_events_tx.send(TripEvent::Scanned {
        trip_id: updated.id,
        driver_id,
        ticket_number: ticket.ticket_number.clone(),
        current_passengers: updated.current_passengers,
    });

    info!(
        driver_id = %driver_id,
        trip_id = %updated.id,
        ticket_number = %ticket.ticket_number,
        current_passengers = updated.current_passengers,
        required_passengers = updated.required_passengers,
        "ticket scanned"
    );

    let mut progress = if updated.is_active() {
        progress_of(&updated, None, None)
    } else {
        finish_completion(state, &updated)
    };
    progress.ticket_number = Some(ticket.ticket_number);
    progress.passenger_order = Some(passenger_order);

    Ok(progress)
}

/// Names the reason the store refused to mark a ticket scanned.
fn scan_conflict(
    state: &AppState,
    ticket_id: Uuid,
    ticket_number: &str,
) -> Result<TripError, AppError> {
    let scanned = state
        .tickets
        .get(ticket_id)?
        .is_some_and(|ticket| ticket.is_scanned);

    Ok(if scanned {
        TripError::TicketAlreadyScanned(ticket_number.to_string())
    } else {
        debug!(ticket_number, "scan rejected: assigned to another driver");
        TripError::TicketAssignedToOtherDriver(ticket_number.to_string())
    })
}

pub async fn complete_trip(
    state: &AppState,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TripProgress, AppError> {
    let _guard = state.trips.lock_driver(driver_id).await;

    let trip = state
        .trips
        .active_trip(driver_id)
        .ok_or(TripError::NoActiveTrip)?;
    let completed = state.trips.complete(trip.id, now)?;

    if !completed.reached_80_percent {
        warn!(
            driver_id = %driver_id,
            trip_id = %completed.id,
            current_passengers = completed.current_passengers,
            required_passengers = completed.required_passengers,
            "trip closed below threshold"
        );
    }

    Ok(finish_completion(state, &completed))
}

pub fn trip_status(state: &AppState, driver_id: Uuid, now: DateTime<Utc>) -> TripStatusView {
    let date = state.service_date(now);
    let today = state.trips.trips_on(driver_id, date);
    let active = state.trips.active_trip(driver_id);

    let current_trip = active
        .as_ref()
        .or_else(|| today.last())
        .map(TripSnapshot::from);

    TripStatusView {
        current_trip,
        has_active_trip: active.is_some(),
        trips_today: today.len(),
        qualification: qualification_for(state, driver_id, date),
    }
}

pub fn trip_history(state: &AppState, driver_id: Uuid, date: NaiveDate) -> Vec<TripSnapshot> {
    state
        .trips
        .trips_on(driver_id, date)
        .iter()
        .map(TripSnapshot::from)
        .collect()
}

/// Post-commit steps shared by auto and manual completion.
fn finish_completion(state: &AppState, trip: &Trip) -> TripProgress {
    let reason = trip
        .completion_reason
        .unwrap_or(CompletionReason::Manual);
    let reason_label = match reason {
        CompletionReason::ThresholdReached => "auto",
        CompletionReason::Manual => "manual",
    };

    state
        .metrics
        .trips_completed_total
        .with_label_values(&[reason_label])
        .inc();
    state.metrics.active_trips.dec();
    let _ = state.trip_events_tx.send(TripEvent::Completed {
        trip_id: trip.id,
        driver_id: trip.driver_id,
        reason,
        reached_80_percent: trip.reached_80_percent,
    });

    info!(
        driver_id = %trip.driver_id,
        trip_id = %trip.id,
        reason = reason_label,
        reached_80_percent = trip.reached_80_percent,
        "trip completed"
    );

    let release = release_after_completion(state, trip);
    let qualification = qualification_for(state, trip.driver_id, trip.date);

    progress_of(trip, Some(release), Some(qualification))
}

fn progress_of(
    trip: &Trip,
    assignment_reset: Option<ReleaseReport>,
    qualification: Option<Qualification>,
) -> TripProgress {
    TripProgress {
        trip: TripSnapshot::from(trip),
        ticket_number: None,
        passenger_order: None,
        current_passengers: trip.current_passengers,
        required_passengers: trip.required_passengers,
        trip_completed: trip.status == TripStatus::Completed,
        is_80_percent_reached: trip.reached_80_percent,
        assignment_reset,
        qualification,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{complete_trip, scan_ticket, start_trip, trip_status};
    use crate::config::Config;
    use crate::error::{AppError, TripError};
    use crate::models::driver::{Driver, DutyStatus, Vehicle};
    use crate::models::ticket::{PaymentMethod, Ticket};
    use crate::state::AppState;

    fn noon() -> DateTime<Utc> {
        // 12:00 in UTC+7
        Utc.with_ymd_and_hms(2026, 10, 18, 5, 0, 0).unwrap()
    }

    fn state_with_driver(capacity: u32) -> (Arc<AppState>, Uuid) {
        let (state, _rx) = AppState::new(Config::default()).unwrap();
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            plate: "1กข-1234".to_string(),
            capacity,
            created_at: noon(),
        };
        let driver = Driver {
            id: Uuid::new_v4(),
            name: "Somchai".to_string(),
            vehicle_id: Some(vehicle.id),
            duty_status: DutyStatus::OnDuty,
            checked_in_at: None,
            checked_out_at: None,
            updated_at: noon(),
        };
        let driver_id = driver.id;
        state.vehicles.insert(vehicle.id, vehicle);
        state.drivers.insert(driver.id, driver);
        (Arc::new(state), driver_id)
    }

    fn sell(state: &AppState, number: &str, at: DateTime<Utc>) -> Ticket {
        let ticket = Ticket::new(
            number.to_string(),
            50,
            PaymentMethod::Qr,
            None,
            Uuid::new_v4(),
            at,
        );
        state.tickets.insert(ticket).unwrap()
    }

    fn precondition(err: AppError) -> TripError {
        match err {
            AppError::Precondition(inner) => inner,
            other => panic!("expected precondition failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn eighth_scan_on_ten_seat_car_completes_trip() {
        let (state, driver) = state_with_driver(10);
        let trip = start_trip(&state, driver, noon()).await.unwrap();
        assert_eq!(trip.trip_number, 1);
        assert_eq!(trip.required_passengers, 8);

        for n in 1..=8 {
            sell(&state, &format!("T-{n}"), noon());
        }
        sell(&state, "T-9", noon());

        for n in 1..=7 {
            let progress = scan_ticket(&state, driver, &format!("T-{n}"), noon())
                .await
                .unwrap();
            assert!(!progress.trip_completed);
            assert_eq!(progress.current_passengers, n);
        }

        let last = scan_ticket(&state, driver, "T-8", noon()).await.unwrap();
        assert!(last.trip_completed);
        assert!(last.is_80_percent_reached);
        assert_eq!(last.current_passengers, 8);
        assert_eq!(last.passenger_order, Some(8));
        assert!(last.assignment_reset.is_some());

        let err = scan_ticket(&state, driver, "T-9", noon()).await.unwrap_err();
        assert_eq!(precondition(err), TripError::NoActiveTrip);
    }

    #[tokio::test]
    async fn start_without_vehicle_fails() {
        let (state, driver) = state_with_driver(10);
        if let Some(mut record) = state.drivers.get_mut(&driver) {
            record.vehicle_id = None;
        }

        let err = start_trip(&state, driver, noon()).await.unwrap_err();
        assert_eq!(precondition(err), TripError::NoVehicleAssigned);
    }

    #[tokio::test]
    async fn second_start_fails_and_keeps_existing_trip() {
        let (state, driver) = state_with_driver(10);
        let first = start_trip(&state, driver, noon()).await.unwrap();
        sell(&state, "T-1", noon());
        scan_ticket(&state, driver, "T-1", noon()).await.unwrap();

        let err = start_trip(&state, driver, noon()).await.unwrap_err();
        assert_eq!(precondition(err), TripError::TripAlreadyActive);

        let active = state.trips.active_trip(driver).unwrap();
        assert_eq!(active.id, first.id);
        assert_eq!(active.current_passengers, 1);
        assert_eq!(state.trips.len(), 1);
    }

    #[tokio::test]
    async fn ticket_cannot_be_scanned_into_two_trips() {
        let (state, driver) = state_with_driver(10);
        let other_vehicle = Vehicle {
            id: Uuid::new_v4(),
            plate: "2ขค-5678".to_string(),
            capacity: 10,
            created_at: noon(),
        };
        let mut other = state.drivers.get(&driver).unwrap().clone();
        other.id = Uuid::new_v4();
        other.vehicle_id = Some(other_vehicle.id);
        state.vehicles.insert(other_vehicle.id, other_vehicle);
        state.drivers.insert(other.id, other.clone());

        start_trip(&state, driver, noon()).await.unwrap();
        start_trip(&state, other.id, noon()).await.unwrap();
        sell(&state, "T-1", noon());

        scan_ticket(&state, driver, "T-1", noon()).await.unwrap();

        let again = scan_ticket(&state, driver, "T-1", noon()).await.unwrap_err();
        assert!(matches!(precondition(again), TripError::TicketAlreadyScanned(_)));
        let elsewhere = scan_ticket(&state, other.id, "T-1", noon()).await.unwrap_err();
        assert!(matches!(precondition(elsewhere), TripError::TicketAlreadyScanned(_)));

        let mine = state.trips.active_trip(driver).unwrap();
        assert_eq!(mine.current_passengers, 1);
        assert_eq!(mine.scans.len(), 1);
        let theirs = state.trips.active_trip(other.id).unwrap();
        assert_eq!(theirs.current_passengers, 0);
    }

    #[tokio::test]
    async fn ticket_held_by_another_driver_cannot_be_scanned() {
        let (state, driver) = state_with_driver(10);
        start_trip(&state, driver, noon()).await.unwrap();
        sell(&state, "T-1", noon());
        sell(&state, "T-2", noon());

        let holder = Uuid::new_v4();
        state.tickets.assign("T-1", holder, noon()).unwrap();
        state.tickets.assign("T-2", driver, noon()).unwrap();

        let err = scan_ticket(&state, driver, "T-1", noon()).await.unwrap_err();
        assert_eq!(
            precondition(err),
            TripError::TicketAssignedToOtherDriver("T-1".to_string())
        );
        let held = state.tickets.find_by_number("T-1").unwrap().unwrap();
        assert!(!held.is_scanned);
        assert_eq!(state.trips.trip_for_ticket(held.id), None);

        let own = scan_ticket(&state, driver, "T-2", noon()).await.unwrap();
        assert_eq!(own.current_passengers, 1);
    }

    #[tokio::test]
    async fn unknown_ticket_is_rejected() {
        let (state, driver) = state_with_driver(10);
        start_trip(&state, driver, noon()).await.unwrap();

        let err = scan_ticket(&state, driver, "NOPE", noon()).await.unwrap_err();
        assert_eq!(
            precondition(err),
            TripError::TicketNotFound("NOPE".to_string())
        );
    }

    #[tokio::test]
    async fn concurrent_scans_of_one_ticket_count_once() {
        let (state, driver) = state_with_driver(20);
        start_trip(&state, driver, noon()).await.unwrap();
        sell(&state, "T-RACE", noon());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { scan_ticket(&state, driver, "T-RACE", noon()).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        let trip = state.trips.active_trip(driver).unwrap();
        assert_eq!(trip.current_passengers, 1);
        assert_eq!(trip.scans.len(), 1);
    }

    #[tokio::test]
    async fn manual_close_below_threshold_does_not_qualify() {
        let (state, driver) = state_with_driver(10);
        start_trip(&state, driver, noon()).await.unwrap();
        for n in 1..=3 {
            sell(&state, &format!("T-{n}"), noon());
            scan_ticket(&state, driver, &format!("T-{n}"), noon())
                .await
                .unwrap();
        }

        let progress = complete_trip(&state, driver, noon()).await.unwrap();
        assert!(progress.trip_completed);
        assert!(!progress.is_80_percent_reached);
        assert_eq!(progress.current_passengers, 3);
        assert_eq!(progress.qualification.unwrap().qualifying_trips, 0);

        let err = complete_trip(&state, driver, noon()).await.unwrap_err();
        assert_eq!(precondition(err), TripError::NoActiveTrip);
    }

    #[tokio::test]
    async fn trip_numbers_count_every_trip_of_the_day() {
        let (state, driver) = state_with_driver(10);

        start_trip(&state, driver, noon()).await.unwrap();
        complete_trip(&state, driver, noon()).await.unwrap();
        let second = start_trip(&state, driver, noon()).await.unwrap();
        assert_eq!(second.trip_number, 2);
        complete_trip(&state, driver, noon()).await.unwrap();

        let tomorrow = start_trip(&state, driver, noon() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(tomorrow.trip_number, 1);
    }

    #[tokio::test]
    async fn qualifying_count_resets_on_next_day() {
        let (state, driver) = state_with_driver(1);

        for n in 1..=2 {
            start_trip(&state, driver, noon()).await.unwrap();
            sell(&state, &format!("T-{n}"), noon());
            let progress = scan_ticket(&state, driver, &format!("T-{n}"), noon())
                .await
                .unwrap();
            assert!(progress.trip_completed);
        }

        let today = trip_status(&state, driver, noon());
        assert_eq!(today.qualification.qualifying_trips, 2);
        assert!(today.qualification.qualifies_for_revenue);
        assert_eq!(today.trips_today, 2);

        let tomorrow = trip_status(&state, driver, noon() + Duration::days(1));
        assert_eq!(tomorrow.qualification.qualifying_trips, 0);
        assert!(!tomorrow.qualification.qualifies_for_revenue);
        assert!(tomorrow.current_trip.is_none());
    }

    #[tokio::test]
    async fn completion_releases_only_unscanned_assignments() {
        let (state, driver) = state_with_driver(10);
        start_trip(&state, driver, noon()).await.unwrap();

        for number in ["A-1", "A-2", "A-3"] {
            sell(&state, number, noon());
            state.tickets.assign(number, driver, noon()).unwrap();
        }
        scan_ticket(&state, driver, "A-1", noon()).await.unwrap();

        let progress = complete_trip(&state, driver, noon()).await.unwrap();
        let reset = progress.assignment_reset.unwrap();
        assert_eq!(reset.released, 2);
        assert!(!reset.deferred);

        let scanned = state.tickets.find_by_number("A-1").unwrap().unwrap();
        assert_eq!(scanned.assigned_driver_id, Some(driver));
        assert!(scanned.is_scanned);
        for number in ["A-2", "A-3"] {
            let freed = state.tickets.find_by_number(number).unwrap().unwrap();
            assert_eq!(freed.assigned_driver_id, None);
            assert!(!freed.is_assigned);
        }
    }
}
