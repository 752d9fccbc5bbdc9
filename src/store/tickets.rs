use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ticket::Ticket;

/// Equality and range filters over sold tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub ticket_number: Option<String>,
    pub assigned_driver_id: Option<Uuid>,
    pub is_scanned: Option<bool>,
    pub sold_from: Option<DateTime<Utc>>,
    pub sold_until: Option<DateTime<Utc>>,
}

impl TicketQuery {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(number) = &self.ticket_number {
            if &ticket.ticket_number != number {
                return false;
            }
        }
        if let Some(driver_id) = self.assigned_driver_id {
            if ticket.assigned_driver_id != Some(driver_id) {
                return false;
            }
        }
        if let Some(scanned) = self.is_scanned {
            if ticket.is_scanned != scanned {
                return false;
            }
        }
        if let Some(from) = self.sold_from {
            if ticket.sold_at < from {
                return false;
            }
        }
        if let Some(until) = self.sold_until {
            if ticket.sold_at >= until {
                return false;
            }
        }
        true
    }
}

/// Ticket documents. Every write is a single conditional update on one
/// document, so callers never need a transaction.
pub trait TicketStore: Send + Sync {
    fn next_serial(&self) -> Result<u64, StoreError>;

    fn insert(&self, ticket: Ticket) -> Result<Ticket, StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError>;

    fn search(&self, query: &TicketQuery) -> Result<Vec<Ticket>, StoreError>;

    /// Assigns an unscanned ticket to `driver_id`. Fails with `Conflict` when
    /// the ticket is scanned or already held by another driver.
    fn assign(
        &self,
        ticket_number: &str,
        driver_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, StoreError>;

    /// Flips `is_scanned` only if it is still false and the ticket is either
    /// unassigned or assigned to `scanned_by`.
    fn mark_scanned(
        &self,
        id: Uuid,
        scanned_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, StoreError>;

    /// Clears the assignment of every unscanned ticket held by `driver_id`
    /// and sold within `[from, until)`. Returns how many were released.
    fn release_unscanned(
        &self,
        driver_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    fn len(&self) -> usize;
}

#[derive(Default)]
pub struct MemoryTicketStore {
    tickets: DashMap<Uuid, Ticket>,
    by_number: DashMap<String, Uuid>,
    serial: AtomicU64,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TicketStore for MemoryTicketStore {
    fn next_serial(&self) -> Result<u64, StoreError> {
        Ok(self.serial.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, ticket: Ticket) -> Result<Ticket, StoreError> {
        match self.by_number.entry(ticket.ticket_number.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "ticket number {} already exists",
                ticket.ticket_number
            ))),
            Entry::Vacant(slot) => {
                slot.insert(ticket.id);
                self.tickets.insert(ticket.id, ticket.clone());
                Ok(ticket)
            }
        }
    }

    fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.get(&id).map(|entry| entry.value().clone()))
    }

    fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError> {
        let Some(id) = self.by_number.get(ticket_number).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get(id)
    }

    fn search(&self, query: &TicketQuery) -> Result<Vec<Ticket>, StoreError> {
        let mut found: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.sold_at.cmp(&b.sold_at));
        Ok(found)
    }

    fn assign(
        &self,
        ticket_number: &str,
        driver_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        let id = self
            .by_number
            .get(ticket_number)
            .map(|entry| *entry.value())
            .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_number}")))?;

        let mut ticket = self
            .tickets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_number}")))?;

        if ticket.is_scanned {
            return Err(StoreError::Conflict(format!(
                "ticket {ticket_number} is already scanned"
            )));
        }

        match ticket.assigned_driver_id {
            Some(current) if current == driver_id => {}
            Some(current) => {
                return Err(StoreError::Conflict(format!(
                    "ticket {ticket_number} is assigned to driver {current}"
                )));
            }
            None => {
                ticket.is_assigned = true;
                ticket.assigned_driver_id = Some(driver_id);
                ticket.assigned_at = Some(at);
            }
        }

        Ok(ticket.clone())
    }

    fn mark_scanned(
        &self,
        id: Uuid,
        scanned_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        let mut ticket = self
            .tickets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))?;

        if ticket.is_scanned {
            return Err(StoreError::Conflict(format!(
                "ticket {} is already scanned",
                ticket.ticket_number
            )));
        }

        if let Some(holder) = ticket.assigned_driver_id.filter(|holder| *holder != scanned_by) {
            return Err(StoreError::Conflict(format!(
                "ticket {} is assigned to driver {holder}",
                ticket.ticket_number
            )));
        }

        ticket.is_scanned = true;
        ticket.scanned_at = Some(at);
        ticket.scanned_by = Some(scanned_by);
        Ok(ticket.clone())
    }

    fn release_unscanned(
        &self,
        driver_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut released = 0;
        for mut entry in self.tickets.iter_mut() {
            let ticket = entry.value_mut();
            let in_window = ticket.sold_at >= from && ticket.sold_at < until;
            if in_window && !ticket.is_scanned && ticket.assigned_driver_id == Some(driver_id) {
                ticket.clear_assignment();
                released += 1;
            }
        }
        Ok(released)
    }

    fn len(&self) -> usize {
        self.tickets.len()
    }
}
