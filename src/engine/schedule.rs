use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{schedule_overlap, validate_day, validate_range};
use super::{Engine, EngineError};

impl Engine {
    /// Publish a recurring weekly availability window. Only the pitch owner
    /// may do this; the new window must not overlap any available window on
    /// the same (pitch, day).
    pub async fn create_schedule(
        &self,
        id: Ulid,
        pitch_id: Ulid,
        actor_id: Ulid,
        day_of_week: u8,
        window: TimeRange,
        is_peak: bool,
        price: u32,
    ) -> Result<Schedule, EngineError> {
        validate_day(day_of_week)?;
        validate_range(&window)?;

        let _gate = self.compaction_gate.read().await;
        let ps = self
            .get_pitch(&pitch_id)
            .ok_or(EngineError::NotFound(pitch_id))?;
        let mut guard = ps.write().await;
        if guard.owner_id != actor_id {
            return Err(EngineError::Forbidden("only the pitch owner may publish schedules"));
        }
        if guard.schedules.len() >= MAX_SCHEDULES_PER_PITCH {
            return Err(EngineError::LimitExceeded("too many schedules on pitch"));
        }
        if let Some(existing) = schedule_overlap(&guard, day_of_week, &window) {
            return Err(EngineError::ScheduleOverlap(existing));
        }

        let schedule = Schedule {
            id,
            pitch_id,
            day_of_week,
            window,
            is_peak,
            price,
            is_available: true,
            created_at: self.clock.now(),
        };
        let event = Event::ScheduleCreated {
            schedule: schedule.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(schedule)
    }

    /// All schedules for a pitch, ordered by day_of_week then start time.
    pub async fn list_schedules(&self, pitch_id: Ulid) -> Vec<Schedule> {
        let ps = match self.get_pitch(&pitch_id) {
            Some(ps) => ps,
            None => return Vec::new(),
        };
        let guard = ps.read().await;
        guard.schedules.clone()
    }

    /// Retire a window: it stops accepting new bookings but existing bookings
    /// against it remain valid historical records.
    pub async fn retire_schedule(&self, schedule_id: Ulid, actor_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (pitch_id, mut guard) = self.resolve_entity_write(&schedule_id).await?;
        if guard.owner_id != actor_id {
            return Err(EngineError::Forbidden("only the pitch owner may retire schedules"));
        }
        if guard.schedule_mut(&schedule_id).is_none() {
            return Err(EngineError::NotFound(schedule_id));
        }

        let event = Event::ScheduleRetired {
            id: schedule_id,
            pitch_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Player availability windows ──────────────────────────
    //
    // Same shape as pitch schedules, same per-(owner, day) non-overlap
    // invariant, but no prices and no bookings against them.

    pub async fn set_player_window(
        &self,
        id: Ulid,
        player_id: Ulid,
        day_of_week: u8,
        window: TimeRange,
    ) -> Result<PlayerWindow, EngineError> {
        validate_day(day_of_week)?;
        validate_range(&window)?;

        let _gate = self.compaction_gate.read().await;
        let windows = self
            .player_windows
            .entry(player_id)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .value()
            .clone();
        let mut guard = windows.write().await;
        if guard.len() >= MAX_WINDOWS_PER_PLAYER {
            return Err(EngineError::LimitExceeded("too many windows for player"));
        }
        if let Some(existing) = guard
            .iter()
            .find(|w| w.day_of_week == day_of_week && w.window.overlaps(&window))
        {
            return Err(EngineError::WindowOverlap(existing.id));
        }

        let player_window = PlayerWindow {
            id,
            player_id,
            day_of_week,
            window,
            created_at: self.clock.now(),
        };
        let event = Event::PlayerWindowSet {
            window: player_window.clone(),
        };
        self.wal_append(&event).await?;
        guard.push(player_window.clone());
        self.entity_owner.insert(id, player_id);
        self.feed.publish(&event);
        Ok(player_window)
    }

    /// A player's windows ordered by day_of_week then start time.
    pub async fn list_player_windows(&self, player_id: Ulid) -> Vec<PlayerWindow> {
        let windows = match self.player_windows.get(&player_id) {
            Some(entry) => entry.value().clone(),
            None => return Vec::new(),
        };
        let guard = windows.read().await;
        let mut out = guard.clone();
        out.sort_by_key(|w| (w.day_of_week, w.window.start));
        out
    }

    pub async fn remove_player_window(&self, window_id: Ulid, actor_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let player_id = self
            .owner_of(&window_id)
            .ok_or(EngineError::NotFound(window_id))?;
        if player_id != actor_id {
            return Err(EngineError::Forbidden("only the player may remove their window"));
        }
        let windows = self
            .player_windows
            .get(&player_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(window_id))?;
        let mut guard = windows.write().await;
        if !guard.iter().any(|w| w.id == window_id) {
            return Err(EngineError::NotFound(window_id));
        }

        let event = Event::PlayerWindowRemoved {
            id: window_id,
            player_id,
        };
        self.wal_append(&event).await?;
        guard.retain(|w| w.id != window_id);
        self.entity_owner.remove(&window_id);
        self.feed.publish(&event);
        Ok(())
    }
}
