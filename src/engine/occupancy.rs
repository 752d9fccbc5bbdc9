use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

const THRESHOLD_NUMERATOR: u32 = 4;
const THRESHOLD_DENOMINATOR: u32 = 5;

/// `floor(capacity * 0.8)` in integer arithmetic.
pub fn required_passengers(capacity: u32) -> u32 {
    capacity * THRESHOLD_NUMERATOR / THRESHOLD_DENOMINATOR
}

/// Rounded occupancy for display.
pub fn occupancy_percent(current_passengers: u32, capacity: u32) -> u32 {
    if capacity == 0 {
        return 0;
    }

    (current_passengers as f64 / capacity as f64 * 100.0).round() as u32
}

/// Calendar day of `at` in the service's local offset.
pub fn service_date(at: DateTime<Utc>, offset: &FixedOffset) -> NaiveDate {
    at.with_timezone(offset).date_naive()
}

/// `[start_of_day, start_of_next_day)` for `date`, expressed in UTC.
pub fn day_window(date: NaiveDate, offset: &FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = date.and_time(NaiveTime::MIN);
    let start = (local_midnight - Duration::seconds(offset.local_minus_utc() as i64)).and_utc();
    (start, start + Duration::days(1))
}
