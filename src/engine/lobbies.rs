use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_range;
use super::{Engine, EngineError, apply_to_lobby};

impl Engine {
    /// Open a group-formation session, optionally linked to a booking. The
    /// creator joins automatically only when `EngineConfig.auto_join_creator`
    /// is set — otherwise the lobby starts empty.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_lobby(
        &self,
        id: Ulid,
        creator_id: Ulid,
        pitch_id: Ulid,
        date: NaiveDate,
        slot: TimeRange,
        min_players: u32,
        max_players: u32,
        booking_id: Option<Ulid>,
    ) -> Result<Lobby, EngineError> {
        validate_range(&slot)?;
        let _gate = self.compaction_gate.read().await;
        if min_players > max_players {
            return Err(EngineError::Validation("min_players exceeds max_players"));
        }
        if max_players == 0 {
            return Err(EngineError::Validation("max_players must be positive"));
        }
        if max_players > MAX_LOBBY_CAPACITY {
            return Err(EngineError::LimitExceeded("lobby capacity too large"));
        }
        if self.lobbies.len() >= MAX_LOBBIES {
            return Err(EngineError::LimitExceeded("too many lobbies"));
        }
        if !self.pitches.contains_key(&pitch_id) {
            return Err(EngineError::NotFound(pitch_id));
        }
        // A linked booking is referenced, not owned — it just has to exist.
        if let Some(bid) = booking_id
            && self.owner_of(&bid).is_none()
        {
            return Err(EngineError::NotFound(bid));
        }

        let now = self.clock.now();
        let mut participants = Vec::new();
        if self.config.auto_join_creator {
            participants.push(Participant {
                player_id: creator_id,
                joined_at: now,
            });
        }
        let status = if participants.len() as u32 >= max_players {
            LobbyStatus::Filled
        } else {
            LobbyStatus::Open
        };
        let lobby = Lobby {
            id,
            creator_id,
            pitch_id,
            booking_id,
            date,
            slot,
            min_players,
            max_players,
            status,
            created_at: now,
            participants,
        };

        // Reserve the id before the WAL append; concurrent creates with the
        // same id must lose here rather than overwrite each other. The held
        // write lock makes racing joins wait for the commit.
        let arc = Arc::new(RwLock::new(lobby.clone()));
        let _guard = arc.clone().try_write_owned().expect("fresh lock");
        match self.lobbies.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(v) => {
                v.insert(arc);
            }
        }

        let event = Event::LobbyCreated {
            lobby: lobby.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.lobbies.remove(&id);
            return Err(e);
        }
        metrics::gauge!(crate::observability::LOBBIES_ACTIVE).increment(1.0);
        self.feed.publish(&event);
        Ok(lobby)
    }

    /// Add a player. Capacity check, duplicate check, insert, and the
    /// open→filled transition commit as one atomic unit under the lobby lock.
    pub async fn join_lobby(&self, lobby_id: Ulid, player_id: Ulid) -> Result<Lobby, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let lobby = self
            .get_lobby_state(&lobby_id)
            .ok_or(EngineError::NotFound(lobby_id))?;
        let mut guard = lobby.write().await;

        if guard.status == LobbyStatus::Cancelled {
            metrics::counter!(crate::observability::LOBBY_JOIN_REJECTIONS_TOTAL).increment(1);
            return Err(EngineError::LobbyClosed {
                id: lobby_id,
                status: guard.status,
            });
        }
        if guard.player_count() >= guard.max_players {
            metrics::counter!(crate::observability::LOBBY_JOIN_REJECTIONS_TOTAL).increment(1);
            return Err(EngineError::CapacityFull {
                max_players: guard.max_players,
            });
        }
        if guard.is_participant(&player_id) {
            metrics::counter!(crate::observability::LOBBY_JOIN_REJECTIONS_TOTAL).increment(1);
            return Err(EngineError::AlreadyJoined(player_id));
        }

        let status = if guard.player_count() + 1 == guard.max_players {
            LobbyStatus::Filled
        } else {
            guard.status
        };
        let event = Event::PlayerJoined {
            lobby_id,
            participant: Participant {
                player_id,
                joined_at: self.clock.now(),
            },
            status,
        };
        self.wal_append(&event).await?;
        apply_to_lobby(&mut guard, &event);
        metrics::counter!(crate::observability::LOBBY_JOINS_TOTAL).increment(1);
        self.feed.publish(&event);
        Ok(guard.clone())
    }

    /// Remove a player. A filled lobby that drops below capacity reverts to
    /// open; a cancelled lobby stays cancelled.
    pub async fn leave_lobby(&self, lobby_id: Ulid, player_id: Ulid) -> Result<Lobby, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let lobby = self
            .get_lobby_state(&lobby_id)
            .ok_or(EngineError::NotFound(lobby_id))?;
        let mut guard = lobby.write().await;

        if !guard.is_participant(&player_id) {
            return Err(EngineError::NotParticipant(player_id));
        }

        let status = if guard.status == LobbyStatus::Filled
            && guard.player_count() - 1 < guard.max_players
        {
            LobbyStatus::Open
        } else {
            guard.status
        };
        let event = Event::PlayerLeft {
            lobby_id,
            player_id,
            status,
        };
        self.wal_append(&event).await?;
        apply_to_lobby(&mut guard, &event);
        self.feed.publish(&event);
        Ok(guard.clone())
    }

    /// Cancel a lobby — terminal, regardless of participant count. Allowed
    /// for the creator or the pitch owner.
    pub async fn cancel_lobby(&self, lobby_id: Ulid, actor_id: Ulid) -> Result<Lobby, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let lobby = self
            .get_lobby_state(&lobby_id)
            .ok_or(EngineError::NotFound(lobby_id))?;

        let pitch_id = lobby.read().await.pitch_id;
        let pitch_owner = match self.get_pitch(&pitch_id) {
            Some(ps) => Some(ps.read().await.owner_id),
            None => None,
        };

        let mut guard = lobby.write().await;
        if guard.status == LobbyStatus::Cancelled {
            return Err(EngineError::LobbyClosed {
                id: lobby_id,
                status: guard.status,
            });
        }
        if actor_id != guard.creator_id && Some(actor_id) != pitch_owner {
            return Err(EngineError::Forbidden("only the creator or pitch owner may cancel"));
        }

        let event = Event::LobbyCancelled { id: lobby_id };
        self.wal_append(&event).await?;
        apply_to_lobby(&mut guard, &event);
        metrics::gauge!(crate::observability::LOBBIES_ACTIVE).decrement(1.0);
        self.feed.publish(&event);
        Ok(guard.clone())
    }
}
