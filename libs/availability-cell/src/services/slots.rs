// libs/availability-cell/src/services/slots.rs
//
// Pure slot arithmetic. Everything here is a deterministic function of its
// inputs so both the center path (derived windows) and the doctor path
// (range auto-split) share one implementation.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{SlotWindow, AvailabilityError};

/// Split `[start, end)` into consecutive `interval`-minute windows.
/// Emits `[cur, cur + interval)` while `cur + interval <= end`; a trailing
/// remainder shorter than the interval is dropped, so the last window's end
/// never exceeds `end`.
pub fn expand_time_range(
    start: NaiveTime,
    end: NaiveTime,
    interval_minutes: i32,
) -> Result<Vec<(NaiveTime, NaiveTime)>, AvailabilityError> {
    if interval_minutes <= 0 {
        return Err(AvailabilityError::ValidationError(
            "Slot interval must be positive".to_string(),
        ));
    }
    if start >= end {
        return Err(AvailabilityError::ValidationError(
            "Start time must be before end time".to_string(),
        ));
    }

    let interval = Duration::minutes(interval_minutes as i64);
    let mut windows = Vec::new();
    let mut current = start;

    loop {
        let (next, wrapped) = current.overflowing_add_signed(interval);
        if wrapped != 0 || next > end {
            break;
        }
        windows.push((current, next));
        current = next;
        if current == end {
            break;
        }
    }

    Ok(windows)
}

/// Generate a diagnostic center's windows for one date from its declared
/// operating hours. Deterministic: same config and date, same output.
pub fn generate_center_slots(
    date: NaiveDate,
    work_start: NaiveTime,
    work_end: NaiveTime,
    interval_minutes: i32,
    capacity: i32,
) -> Result<Vec<SlotWindow>, AvailabilityError> {
    if capacity < 1 {
        return Err(AvailabilityError::ValidationError(
            "Slot capacity must be at least 1".to_string(),
        ));
    }

    let windows = expand_time_range(work_start, work_end, interval_minutes)?;

    Ok(windows
        .into_iter()
        .map(|(start_time, end_time)| SlotWindow {
            date,
            start_time,
            end_time,
            capacity,
        })
        .collect())
}

/// Whether a slot's start already lies in the past in the resource's local
/// time zone. Unknown zone names fall back to UTC rather than failing the
/// whole listing.
pub fn is_past_slot(date: NaiveDate, start_time: NaiveTime, timezone: &str, now: DateTime<Utc>) -> bool {
    let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
    let local_start = date.and_time(start_time);

    match tz.from_local_datetime(&local_start).earliest() {
        Some(start) => start.with_timezone(&Utc) <= now,
        // Nonexistent local time (DST gap): treat as past, never bookable.
        None => true,
    }
}
