use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::TripLedger;

const BPS_DENOMINATOR: u128 = 10_000;

/// Completed trips that reached the threshold for one driver on one day.
/// Every caller that reports qualification goes through here.
pub fn qualifying_trip_count(trips: &TripLedger, driver_id: Uuid, date: NaiveDate) -> usize {
    trips.count_matching(|trip| {
        trip.driver_id == driver_id && trip.date == date && trip.is_qualifying()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Qualification {
    pub date: NaiveDate,
    pub qualifying_trips: usize,
    pub required_trips: usize,
    pub qualifies_for_revenue: bool,
    pub status: String,
}

impl Qualification {
    pub fn evaluate(date: NaiveDate, qualifying_trips: usize, required_trips: usize) -> Self {
        let qualifies_for_revenue = qualifying_trips >= required_trips;
        let status = match required_trips.saturating_sub(qualifying_trips) {
            0 => "qualified for elevated revenue share".to_string(),
            1 => "1 more trip needed".to_string(),
            missing => format!("{missing} more trips needed"),
        };

        Self {
            date,
            qualifying_trips,
            required_trips,
            qualifies_for_revenue,
            status,
        }
    }
}

pub fn qualification_for(state: &AppState, driver_id: Uuid, date: NaiveDate) -> Qualification {
    Qualification::evaluate(
        date,
        qualifying_trip_count(&state.trips, driver_id, date),
        state.config.qualifying_trips_required,
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueSplit {
    pub gross: u64,
    pub station_share: u64,
    pub driver_share: u64,
    pub company_share: u64,
    pub driver_share_bps: u64,
}

impl RevenueSplit {
    pub fn compute(gross: u64, station_bps: u64, driver_bps: u64) -> Self {
        let station_share = bps_share(gross, station_bps);
        let driver_share = bps_share(gross, driver_bps);
        let company_share = gross
            .saturating_sub(station_share)
            .saturating_sub(driver_share);

        Self {
            gross,
            station_share,
            driver_share,
            company_share,
            driver_share_bps: driver_bps,
        }
    }
}

/// `gross * bps / 10_000`, widened so the product cannot overflow.
fn bps_share(gross: u64, bps: u64) -> u64 {
    let share = gross as u128 * bps.min(BPS_DENOMINATOR as u64) as u128 / BPS_DENOMINATOR;
    share as u64
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueSummary {
    pub driver_id: Uuid,
    pub trips_today: usize,
    pub passengers_today: u32,
    pub qualification: Qualification,
    pub split: RevenueSplit,
}

/// Today's qualification and the share split of tickets the driver scanned.
pub fn revenue_summary(
    state: &AppState,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<RevenueSummary, AppError> {
    let date = state.service_date(now);
    let trips = state.trips.trips_on(driver_id, date);
    let qualification = qualification_for(state, driver_id, date);

    let mut gross: u64 = 0;
    let mut passengers_today = 0;
    for scan in trips.iter().flat_map(|trip| trip.scans.iter()) {
        passengers_today += 1;
        if let Some(ticket) = state.tickets.get(scan.ticket_id)? {
            gross = gross.checked_add(ticket.price).ok_or_else(|| {
                AppError::Internal(format!("daily gross for driver {driver_id} overflows"))
            })?;
        }
    }

    let driver_bps = if qualification.qualifies_for_revenue {
        state.config.driver_share_elevated_bps
    } else {
        state.config.driver_share_base_bps
    };

    Ok(RevenueSummary {
        driver_id,
        trips_today: trips.len(),
        passengers_today,
        split: RevenueSplit::compute(gross, state.config.station_share_bps, driver_bps),
        qualification,
    })
}
