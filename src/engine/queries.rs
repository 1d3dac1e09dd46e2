use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::free_ranges;
use super::Engine;

impl Engine {
    /// Every booking on a pitch, ordered by date then start time.
    pub async fn bookings_for_pitch(&self, pitch_id: Ulid) -> Vec<Booking> {
        let ps = match self.get_pitch(&pitch_id) {
            Some(ps) => ps,
            None => return Vec::new(),
        };
        let guard = ps.read().await;
        guard.bookings.clone()
    }

    /// Every booking made by one account across all pitches, ordered by date
    /// then start time.
    pub async fn bookings_for_booker(&self, booker_id: Ulid) -> Vec<Booking> {
        let pitches: Vec<_> = self.pitches.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for ps in pitches {
            let guard = ps.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.booker_id == booker_id)
                    .cloned(),
            );
        }
        out.sort_by_key(|b| (b.date, b.slot.start));
        out
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Option<Booking> {
        let pitch_id = self.owner_of(&booking_id)?;
        let ps = self.get_pitch(&pitch_id)?;
        let guard = ps.read().await;
        guard.booking(&booking_id).cloned()
    }

    /// All lobbies, ordered by date then start time.
    pub async fn list_lobbies(&self) -> Vec<Lobby> {
        let lobbies: Vec<_> = self.lobbies.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(lobbies.len());
        for lobby in lobbies {
            out.push(lobby.read().await.clone());
        }
        out.sort_by_key(|l| (l.date, l.slot.start));
        out
    }

    pub async fn get_lobby(&self, lobby_id: Ulid) -> Option<Lobby> {
        let lobby = self.get_lobby_state(&lobby_id)?;
        let guard = lobby.read().await;
        Some(guard.clone())
    }

    /// What can still be booked on `date`: the day's available windows minus
    /// slots held by pending/confirmed bookings.
    pub async fn free_windows(&self, pitch_id: Ulid, date: NaiveDate) -> Vec<TimeRange> {
        let ps = match self.get_pitch(&pitch_id) {
            Some(ps) => ps,
            None => return Vec::new(),
        };
        let guard = ps.read().await;
        free_ranges(&guard, date)
    }
}
