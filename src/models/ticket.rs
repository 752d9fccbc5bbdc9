use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Qr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub price: u64,
    pub payment_method: PaymentMethod,
    /// Set for group tickets; a scan still counts as one passenger record.
    pub passenger_count: Option<u32>,
    pub sold_at: DateTime<Utc>,
    pub sold_by: Uuid,
    pub is_assigned: bool,
    pub assigned_driver_id: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub is_scanned: bool,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<Uuid>,
}

impl Ticket {
    pub fn new(
        ticket_number: String,
        price: u64,
        payment_method: PaymentMethod,
        passenger_count: Option<u32>,
        sold_by: Uuid,
        sold_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_number,
            price,
            payment_method,
            passenger_count,
            sold_at,
            sold_by,
            is_assigned: false,
            assigned_driver_id: None,
            assigned_at: None,
            is_scanned: false,
            scanned_at: None,
            scanned_by: None,
        }
    }

    pub fn clear_assignment(&mut self) {
        self.is_assigned = false;
        self.assigned_driver_id = None;
        self.assigned_at = None;
    }
}
