//! Host clock readings: formatted timestamps and epoch seconds.

use chrono::{Duration, Local, NaiveDateTime, TimeZone, Utc};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Local wall-clock time as `YYYY-MM-DD hh:mm:ss.ssssss`.
pub fn local_time() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// UTC time in the same shape.
pub fn utc_time() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Seconds since the epoch for the local wall clock.
pub fn local_epoch() -> i64 {
    local_calendar_epoch(Local::now().naive_local())
}

/// Seconds since the epoch derived from the UTC wall clock.
///
/// The UTC wall-clock fields go through the same local-calendar
/// conversion as [`local_epoch`], so on hosts east or west of UTC the
/// result is offset from the true UTC epoch by the local UTC offset.
/// Deployments compare these readings against the agent's historical
/// values, which carry the same offset.
pub fn utc_epoch() -> i64 {
    local_calendar_epoch(Utc::now().naive_utc())
}

/// Epoch seconds for a wall-clock reading interpreted in the local
/// calendar. Ambiguous readings (daylight-saving overlaps) resolve to
/// the earlier instant; nonexistent ones (spring-forward gaps) shift
/// forward an hour.
fn local_calendar_epoch(wall: NaiveDateTime) -> i64 {
    match Local.from_local_datetime(&wall).earliest() {
        Some(instant) => instant.timestamp(),
        None => Local
            .from_local_datetime(&(wall + Duration::hours(1)))
            .earliest()
            .map_or(0, |instant| instant.timestamp()),
    }
}
