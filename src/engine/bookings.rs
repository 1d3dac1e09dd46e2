use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{booking_conflict, covering_window, validate_range};
use super::{Engine, EngineError};

/// The booking state machine. Anything not listed here is invalid.
///
/// ```text
/// pending   -> confirmed   (owner)
/// pending   -> rejected    (owner)
/// pending   -> cancelled   (booker)
/// confirmed -> cancelled   (booker or owner)
/// rejected, cancelled      (terminal)
/// ```
fn transition_allowed(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Rejected) | (Pending, Cancelled) | (Confirmed, Cancelled)
    )
}

impl Engine {
    /// Reserve a slot. The covering-window lookup, the conflict check, the
    /// WAL commit, and the insert all happen under one pitch write lock —
    /// two racers for the same slot serialize, and the loser fails with
    /// `SlotConflict` instead of double-booking.
    pub async fn create_booking(
        &self,
        id: Ulid,
        pitch_id: Ulid,
        booker_id: Ulid,
        date: NaiveDate,
        slot: TimeRange,
    ) -> Result<Booking, EngineError> {
        validate_range(&slot)?;
        let _gate = self.compaction_gate.read().await;
        let ps = self
            .get_pitch(&pitch_id)
            .ok_or(EngineError::NotFound(pitch_id))?;
        let mut guard = ps.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_PITCH {
            return Err(EngineError::LimitExceeded("too many bookings on pitch"));
        }

        let day = day_of_week(date);
        if covering_window(&guard, day, &slot).is_none() {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::NoAvailability);
        }
        if let Some(existing) = booking_conflict(&guard, date, &slot) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotConflict(existing));
        }

        let booking = Booking {
            id,
            pitch_id,
            booker_id,
            date,
            slot,
            status: BookingStatus::Pending,
            created_at: self.clock.now(),
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(booking)
    }

    /// Transition a booking per the state machine. The owner confirms or
    /// rejects; the booker cancels; a confirmed booking may be cancelled by
    /// either side. Invalid transitions leave state unchanged.
    pub async fn set_booking_status(
        &self,
        booking_id: Ulid,
        new_status: BookingStatus,
        actor_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (pitch_id, mut guard) = self.resolve_entity_write(&booking_id).await?;
        let owner_id = guard.owner_id;
        let booking = guard
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let from = booking.status;
        let booker_id = booking.booker_id;

        if !transition_allowed(from, new_status) {
            return Err(EngineError::InvalidTransition {
                from,
                to: new_status,
            });
        }
        let authorized = match new_status {
            BookingStatus::Confirmed | BookingStatus::Rejected => actor_id == owner_id,
            BookingStatus::Cancelled => match from {
                BookingStatus::Pending => actor_id == booker_id,
                _ => actor_id == booker_id || actor_id == owner_id,
            },
            BookingStatus::Pending => false,
        };
        if !authorized {
            return Err(EngineError::Forbidden("actor may not perform this transition"));
        }

        let event = Event::BookingStatusChanged {
            id: booking_id,
            pitch_id,
            status: new_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKING_TRANSITIONS_TOTAL).increment(1);
        let updated = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok(updated)
    }
}
