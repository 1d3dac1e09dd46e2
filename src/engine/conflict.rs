use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_range(range: &TimeRange) -> Result<(), EngineError> {
    if range.start >= range.end {
        return Err(EngineError::Validation("start must be before end"));
    }
    if range.end > MINUTES_PER_DAY {
        return Err(EngineError::Validation("end past midnight"));
    }
    Ok(())
}

pub(crate) fn validate_day(day: u8) -> Result<(), EngineError> {
    if day > 6 {
        return Err(EngineError::Validation("day_of_week must be 0-6"));
    }
    Ok(())
}

/// First available schedule on `day` that fully contains `slot`. Schedules
/// are kept (day, start)-sorted, so "first" is deterministic.
pub(crate) fn covering_window<'a>(
    ps: &'a PitchState,
    day: u8,
    slot: &TimeRange,
) -> Option<&'a Schedule> {
    ps.open_windows_on(day).find(|s| s.window.contains(slot))
}

/// Id of any pending/confirmed booking on `date` overlapping `slot`.
/// Rejected and cancelled bookings do not hold their slot.
pub(crate) fn booking_conflict(ps: &PitchState, date: NaiveDate, slot: &TimeRange) -> Option<Ulid> {
    ps.bookings_on(date)
        .iter()
        .find(|b| b.is_active() && b.slot.overlaps(slot))
        .map(|b| b.id)
}

/// Id of any available schedule on (pitch, day) overlapping `window`.
pub(crate) fn schedule_overlap(ps: &PitchState, day: u8, window: &TimeRange) -> Option<Ulid> {
    ps.open_windows_on(day)
        .find(|s| s.window.overlaps(window))
        .map(|s| s.id)
}
