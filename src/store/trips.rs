use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::TripError;
use crate::models::trip::{CompletionReason, ScanRecord, Trip, TripStatus};

/// Trip documents plus the two structural constraints the state machine
/// leans on: one `in_progress` trip per driver, and one trip per scanned
/// ticket.
#[derive(Default)]
pub struct TripLedger {
    trips: DashMap<Uuid, Trip>,
    active_by_driver: DashMap<Uuid, Uuid>,
    scanned_tickets: DashMap<Uuid, Uuid>,
    driver_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TripLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialises start/scan/complete for one driver.
    pub async fn lock_driver(&self, driver_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .driver_locks
            .entry(driver_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_by_driver.len()
    }

    pub fn get(&self, trip_id: Uuid) -> Option<Trip> {
        self.trips.get(&trip_id).map(|entry| entry.value().clone())
    }

    pub fn active_trip(&self, driver_id: Uuid) -> Option<Trip> {
        let trip_id = self
            .active_by_driver
            .get(&driver_id)
            .map(|entry| *entry.value())?;
        self.get(trip_id)
    }

    /// All of a driver's trips on `date`, ordered by trip number.
    pub fn trips_on(&self, driver_id: Uuid, date: NaiveDate) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self
            .trips
            .iter()
            .filter(|entry| entry.driver_id == driver_id && entry.date == date)
            .map(|entry| entry.value().clone())
            .collect();
        trips.sort_by_key(|trip| trip.trip_number);
        trips
    }

    /// Counts trips of any status; this drives trip numbering.
    pub fn count_on(&self, driver_id: Uuid, date: NaiveDate) -> usize {
        self.trips
            .iter()
            .filter(|entry| entry.driver_id == driver_id && entry.date == date)
            .count()
    }

    pub fn count_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Trip) -> bool,
    {
        self.trips
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    pub fn insert_active(&self, trip: Trip) -> Result<Trip, TripError> {
        match self.active_by_driver.entry(trip.driver_id) {
            Entry::Occupied(_) => Err(TripError::TripAlreadyActive),
            Entry::Vacant(slot) => {
                slot.insert(trip.id);
                self.trips.insert(trip.id, trip.clone());
                Ok(trip)
            }
        }
    }

    /// Claims `ticket_id` for `trip_id`. Returns `false` when any trip has
    /// already claimed it.
    pub fn claim_ticket(&self, ticket_id: Uuid, trip_id: Uuid) -> bool {
        match self.scanned_tickets.entry(ticket_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(trip_id);
                true
            }
        }
    }

    pub fn unclaim_ticket(&self, ticket_id: Uuid, trip_id: Uuid) {
        self.scanned_tickets
            .remove_if(&ticket_id, |_, owner| *owner == trip_id);
    }

    pub fn trip_for_ticket(&self, ticket_id: Uuid) -> Option<Uuid> {
        self.scanned_tickets.get(&ticket_id).map(|entry| *entry.value())
    }

    /// Appends a passenger to an active trip and auto-completes it once the
    /// threshold is met.
    pub fn record_scan(
        &self,
        trip_id: Uuid,
        ticket_id: Uuid,
        ticket_number: &str,
        at: DateTime<Utc>,
    ) -> Result<Trip, TripError> {
        let updated = {
            let mut trip = self.trips.get_mut(&trip_id).ok_or(TripError::NoActiveTrip)?;
            if !trip.is_active() {
                return Err(TripError::NoActiveTrip);
            }

            let passenger_order = trip.current_passengers + 1;
            trip.scans.push(ScanRecord {
                ticket_id,
                ticket_number: ticket_number.to_string(),
                scanned_at: at,
                passenger_order,
            });
            trip.current_passengers = passenger_order;

            if trip.current_passengers >= trip.required_passengers {
                close(&mut trip, at, CompletionReason::ThresholdReached);
            }

            trip.clone()
        };

        if !updated.is_active() {
            self.active_by_driver
                .remove_if(&updated.driver_id, |_, active| *active == trip_id);
        }

        Ok(updated)
    }

    pub fn complete(&self, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip, TripError> {
        let completed = {
            let mut trip = self.trips.get_mut(&trip_id).ok_or(TripError::NoActiveTrip)?;
            if !trip.is_active() {
                return Err(TripError::NoActiveTrip);
            }
            close(&mut trip, at, CompletionReason::Manual);
            trip.clone()
        };

        self.active_by_driver
            .remove_if(&completed.driver_id, |_, active| *active == trip_id);

        Ok(completed)
    }
}

fn close(trip: &mut Trip, at: DateTime<Utc>, reason: CompletionReason) {
    trip.reached_80_percent = trip.current_passengers >= trip.required_passengers;
    trip.status = TripStatus::Completed;
    trip.completion_reason = Some(reason);
    trip.completed_at = Some(at);
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::TripLedger;
    use crate::error::TripError;
    use crate::models::trip::{Trip, TripStatus};

    fn trip(driver_id: Uuid, trip_number: u32, required: u32) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            driver_id,
            vehicle_id: Uuid::new_v4(),
            trip_number,
            date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            car_capacity: 10,
            required_passengers: required,
            current_passengers: 0,
            scans: Vec::new(),
            status: TripStatus::InProgress,
            completion_reason: None,
            reached_80_percent: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn second_active_trip_is_rejected_and_first_left_untouched() {
        let ledger = TripLedger::new();
        let driver = Uuid::new_v4();
        let first = ledger.insert_active(trip(driver, 1, 8)).unwrap();

        assert_eq!(
            ledger.insert_active(trip(driver, 2, 8)).unwrap_err(),
            TripError::TripAlreadyActive
        );

        let stored = ledger.active_trip(driver).unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn ticket_claim_is_exclusive_across_trips() {
        let ledger = TripLedger::new();
        let ticket = Uuid::new_v4();
        let trip_a = Uuid::new_v4();
        let trip_b = Uuid::new_v4();

        assert!(ledger.claim_ticket(ticket, trip_a));
        assert!(!ledger.claim_ticket(ticket, trip_b));

        ledger.unclaim_ticket(ticket, trip_b);
        assert_eq!(ledger.trip_for_ticket(ticket), Some(trip_a));

        ledger.unclaim_ticket(ticket, trip_a);
        assert!(ledger.claim_ticket(ticket, trip_b));
    }

    #[test]
    fn scan_reaching_threshold_closes_trip_and_frees_driver() {
        let ledger = TripLedger::new();
        let driver = Uuid::new_v4();
        let active = ledger.insert_active(trip(driver, 1, 2)).unwrap();

        let after_one = ledger
            .record_scan(active.id, Uuid::new_v4(), "A", Utc::now())
            .unwrap();
        assert!(after_one.is_active());
        assert_eq!(after_one.scans.len() as u32, after_one.current_passengers);

        let after_two = ledger
            .record_scan(active.id, Uuid::new_v4(), "B", Utc::now())
            .unwrap();
        assert_eq!(after_two.status, TripStatus::Completed);
        assert!(after_two.reached_80_percent);
        assert_eq!(after_two.scans[1].passenger_order, 2);
        assert!(ledger.active_trip(driver).is_none());

        assert_eq!(
            ledger
                .record_scan(active.id, Uuid::new_v4(), "C", Utc::now())
                .unwrap_err(),
            TripError::NoActiveTrip
        );
    }

    #[test]
    fn manual_completion_below_threshold_does_not_qualify() {
        let ledger = TripLedger::new();
        let driver = Uuid::new_v4();
        let active = ledger.insert_active(trip(driver, 1, 8)).unwrap();
        ledger
            .record_scan(active.id, Uuid::new_v4(), "A", Utc::now())
            .unwrap();

        let closed = ledger.complete(active.id, Utc::now()).unwrap();
        assert_eq!(closed.status, TripStatus::Completed);
        assert!(!closed.reached_80_percent);
        assert!(!closed.is_qualifying());
        assert!(ledger.complete(active.id, Utc::now()).is_err());
    }
}
