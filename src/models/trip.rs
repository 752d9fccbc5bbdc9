use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    ThresholdReached,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub scanned_at: DateTime<Utc>,
    pub passenger_order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub trip_number: u32,
    pub date: NaiveDate,
    pub car_capacity: u32,
    pub required_passengers: u32,
    pub current_passengers: u32,
    pub scans: Vec<ScanRecord>,
    pub status: TripStatus,
    pub completion_reason: Option<CompletionReason>,
    pub reached_80_percent: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn is_active(&self) -> bool {
        self.status == TripStatus::InProgress
    }

    pub fn is_qualifying(&self) -> bool {
        self.status == TripStatus::Completed && self.reached_80_percent
    }
}

/// Events fanned out to websocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripEvent {
    Started {
        trip_id: Uuid,
        driver_id: Uuid,
        trip_number: u32,
        required_passengers: u32,
    },
    Scanned {
        trip_id: Uuid,
        driver_id: Uuid,
        ticket_number: String,
        current_passengers: u32,
    },
    Completed {
        trip_id: Uuid,
        driver_id: Uuid,
        reason: CompletionReason,
        reached_80_percent: bool,
    },
}
