use std::env;

use chrono::FixedOffset;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub release_queue_size: usize,
    pub release_retry_delay_ms: u64,
    pub release_max_attempts: u32,
    /// Offset used to cut calendar days for trips and ticket sales.
    pub service_utc_offset_minutes: i32,
    pub qualifying_trips_required: usize,
    pub station_share_bps: u64,
    pub driver_share_base_bps: u64,
    pub driver_share_elevated_bps: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            release_queue_size: 1024,
            release_retry_delay_ms: 250,
            release_max_attempts: 5,
            service_utc_offset_minutes: 420,
            qualifying_trips_required: 2,
            station_share_bps: 1_000,
            driver_share_base_bps: 6_000,
            driver_share_elevated_bps: 7_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            release_queue_size: parse_or_default(
                "RELEASE_QUEUE_SIZE",
                defaults.release_queue_size,
            )?,
            release_retry_delay_ms: parse_or_default(
                "RELEASE_RETRY_DELAY_MS",
                defaults.release_retry_delay_ms,
            )?,
            release_max_attempts: parse_or_default(
                "RELEASE_MAX_ATTEMPTS",
                defaults.release_max_attempts,
            )?,
            service_utc_offset_minutes: parse_or_default(
                "SERVICE_UTC_OFFSET_MINUTES",
                defaults.service_utc_offset_minutes,
            )?,
            qualifying_trips_required: parse_or_default(
                "QUALIFYING_TRIPS_REQUIRED",
                defaults.qualifying_trips_required,
            )?,
            station_share_bps: parse_or_default("STATION_SHARE_BPS", defaults.station_share_bps)?,
            driver_share_base_bps: parse_or_default(
                "DRIVER_SHARE_BASE_BPS",
                defaults.driver_share_base_bps,
            )?,
            driver_share_elevated_bps: parse_or_default(
                "DRIVER_SHARE_ELEVATED_BPS",
                defaults.driver_share_elevated_bps,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn service_offset(&self) -> Result<FixedOffset, AppError> {
        FixedOffset::east_opt(self.service_utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid SERVICE_UTC_OFFSET_MINUTES: {}",
                self.service_utc_offset_minutes
            ))
        })
    }

    fn validate(&self) -> Result<(), AppError> {
        self.service_offset()?;

        let widest_split = self.station_share_bps
            + self.driver_share_base_bps.max(self.driver_share_elevated_bps);
        if widest_split > 10_000 {
            return Err(AppError::Internal(format!(
                "station and driver shares exceed 100%: {widest_split} bps"
            )));
        }

        if self.release_max_attempts == 0 {
            return Err(AppError::Internal(
                "invalid RELEASE_MAX_ATTEMPTS: must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
