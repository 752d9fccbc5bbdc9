use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::occupancy::service_date;
use crate::engine::release::ReleaseJob;
use crate::error::AppError;
use crate::models::driver::{Driver, Vehicle};
use crate::models::trip::TripEvent;
use crate::observability::metrics::Metrics;
use crate::store::{MemoryTicketStore, TicketStore, TripLedger};

pub struct AppState {
    pub config: Config,
    pub service_offset: FixedOffset,
    pub drivers: DashMap<Uuid, Driver>,
    pub vehicles: DashMap<Uuid, Vehicle>,
    pub tickets: Arc<dyn TicketStore>,
    pub trips: TripLedger,
    pub release_tx: mpsc::Sender<ReleaseJob>,
    pub trip_events_tx: broadcast::Sender<TripEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Result<(Self, mpsc::Receiver<ReleaseJob>), AppError> {
        Self::with_ticket_store(config, Arc::new(MemoryTicketStore::new()))
    }

    pub fn with_ticket_store(
        config: Config,
        tickets: Arc<dyn TicketStore>,
    ) -> Result<(Self, mpsc::Receiver<ReleaseJob>), AppError> {
        let service_offset = config.service_offset()?;
        let (release_tx, release_rx) = mpsc::channel(config.release_queue_size);
        let (trip_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Ok((
            Self {
                config,
                service_offset,
                drivers: DashMap::new(),
                vehicles: DashMap::new(),
                tickets,
                trips: TripLedger::new(),
                release_tx,
                trip_events_tx,
                metrics: Metrics::new(),
            },
            release_rx,
        ))
    }

    pub fn service_date(&self, at: DateTime<Utc>) -> NaiveDate {
        service_date(at, &self.service_offset)
    }
}
