//! Interval overlap evaluation. Pure functions — no store access, no clock
//! reads, safe to call from anywhere.

use chrono::Datelike;

use crate::limits::*;
use crate::model::{Interval, Reservation, ReservationId, Schedule};

use super::EngineError;

/// Reject intervals the engine will not accept: reversed bounds, timestamps
/// outside the supported range, absurd durations.
pub(crate) fn validate_interval(interval: &Interval) -> Result<(), EngineError> {
    if interval.start > interval.end {
        return Err(EngineError::InvalidInterval("start after end"));
    }
    if interval.start.year() < MIN_VALID_YEAR || interval.end.year() >= MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if interval.duration() > max_reservation_duration() {
        return Err(EngineError::LimitExceeded("reservation too long"));
    }
    Ok(())
}

/// First reservation blocking `candidate` on this schedule, skipping
/// `exclude` so a reservation never conflicts with itself during
/// modification. Cancelled and rejected reservations never block.
pub fn find_conflict<'a>(
    schedule: &'a Schedule,
    candidate: &Interval,
    exclude: Option<ReservationId>,
) -> Option<&'a Reservation> {
    schedule
        .overlapping(candidate)
        .find(|r| exclude != Some(r.id) && r.status.blocks_availability())
}

pub(crate) fn check_no_conflict(
    schedule: &Schedule,
    candidate: &Interval,
    exclude: Option<ReservationId>,
) -> Result<(), EngineError> {
    match find_conflict(schedule, candidate, exclude) {
        Some(blocking) => Err(EngineError::Conflict(blocking.id)),
        None => Ok(()),
    }
}
