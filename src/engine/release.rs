use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::occupancy::day_window;
use crate::error::StoreError;
use crate::models::trip::Trip;
use crate::state::AppState;

/// A deferred release of one driver's unscanned assignments for one day.
#[derive(Debug, Clone)]
pub struct ReleaseJob {
    pub driver_id: Uuid,
    pub date: NaiveDate,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub released: usize,
    /// True when the inline attempt failed and the job went to the outbox.
    pub deferred: bool,
}

pub fn release_unscanned_assignments(
    state: &AppState,
    driver_id: Uuid,
    date: NaiveDate,
) -> Result<usize, StoreError> {
    let (from, until) = day_window(date, &state.service_offset);
    state.tickets.release_unscanned(driver_id, from, until)
}

/// Runs once the completed trip is already stored. A failure here never
/// fails the caller; the job is handed to the outbox worker instead.
pub fn release_after_completion(state: &AppState, trip: &Trip) -> ReleaseReport {
    match release_unscanned_assignments(state, trip.driver_id, trip.date) {
        Ok(released) => {
            state
                .metrics
                .assignment_releases_total
                .with_label_values(&["success"])
                .inc();
            info!(
                driver_id = %trip.driver_id,
                trip_id = %trip.id,
                released,
                "released unscanned ticket assignments"
            );
            ReleaseReport {
                released,
                deferred: false,
            }
        }
        Err(err) => {
            state
                .metrics
                .assignment_releases_total
                .with_label_values(&["error"])
                .inc();
            warn!(
                driver_id = %trip.driver_id,
                trip_id = %trip.id,
                error = %err,
                "assignment release failed; deferring"
            );
            let deferred = enqueue_release(
                state,
                ReleaseJob {
                    driver_id: trip.driver_id,
                    date: trip.date,
                    attempt: 1,
                },
            );
            ReleaseReport {
                released: 0,
                deferred,
            }
        }
    }
}

pub fn enqueue_release(state: &AppState, job: ReleaseJob) -> bool {
    match state.release_tx.try_send(job) {
        Ok(()) => {
            state.metrics.release_queue_depth.inc();
            true
        }
        Err(err) => {
            error!(error = %err, "release outbox rejected job; assignments stay held");
            false
        }
    }
}

pub async fn run_release_worker(state: Arc<AppState>, mut release_rx: mpsc::Receiver<ReleaseJob>) {
    info!("assignment release worker started");
    let retry_delay = Duration::from_millis(state.config.release_retry_delay_ms);

    while let Some(job) = release_rx.recv().await {
        state.metrics.release_queue_depth.dec();
        sleep(retry_delay).await;

        match release_unscanned_assignments(&state, job.driver_id, job.date) {
            Ok(released) => {
                state
                    .metrics
                    .assignment_releases_total
                    .with_label_values(&["retried"])
                    .inc();
                info!(
                    driver_id = %job.driver_id,
                    date = %job.date,
                    attempt = job.attempt,
                    released,
                    "deferred assignment release succeeded"
                );
            }
            Err(err) if job.attempt < state.config.release_max_attempts => {
                warn!(
                    driver_id = %job.driver_id,
                    attempt = job.attempt,
                    error = %err,
                    "deferred assignment release failed; re-queueing"
                );
                enqueue_release(
                    &state,
                    ReleaseJob {
                        attempt: job.attempt + 1,
                        ..job
                    },
                );
            }
            Err(err) => {
                state
                    .metrics
                    .assignment_releases_total
                    .with_label_values(&["abandoned"])
                    .inc();
                error!(
                    driver_id = %job.driver_id,
                    date = %job.date,
                    attempts = job.attempt,
                    error = %err,
                    "giving up on assignment release"
                );
            }
        }
    }

    warn!("assignment release worker stopped: outbox channel closed");
}
